pub mod admin;
pub mod evolution_poll;
pub mod health;
pub mod mensagens;
pub mod respostas;
pub mod webhook_meta;
