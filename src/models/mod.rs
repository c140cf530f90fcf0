pub mod entidades;
pub mod meta_webhook;

pub use entidades::*;
pub use meta_webhook::*;
