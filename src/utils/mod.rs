pub mod error;
pub mod logging;
pub mod phone;
pub mod retry;

pub use error::{AppError, AppResult};
