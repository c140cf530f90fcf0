//! Adaptadores dos provedores de mensageria
//!
//! Este crate fornece clientes tipados para os três canais de envio/recepção
//! suportados pelo CRM:
//!
//! - **Evolution API**: ponte WhatsApp via QR code (Baileys). Envio por
//!   endpoint específico de cada tipo (`sendText`, `sendMedia`,
//!   `sendWhatsAppAudio`), poll de mensagens recentes e download de mídia.
//! - **Meta Cloud API**: WhatsApp oficial. Mídia precisa ser enviada primeiro
//!   ao endpoint de upload para obter um media-id.
//! - **Instagram Direct**: Graph API com envelope de attachment reutilizável.
//!
//! Os adaptadores traduzem formato, nunca decidem política: qualquer resposta
//! não-2xx vira um erro estruturado e a decisão de retry fica com o chamador.
//!
//! # Exemplo
//!
//! ```rust,ignore
//! use provedores::EvolutionClient;
//!
//! #[tokio::main]
//! async fn main() -> provedores::Result<()> {
//!     let api_key = std::env::var("EVOLUTION_API_KEY")
//!         .expect("EVOLUTION_API_KEY não configurada");
//!
//!     let client = EvolutionClient::new("https://evolution.example.com", api_key)?;
//!     client.enviar_texto("minha-instancia", "5511999999999", "Olá!").await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod evolution;
pub mod instagram;
pub mod meta;
pub mod tipos;

mod resposta;

pub use error::{ProviderError, Result};
pub use evolution::EvolutionClient;
pub use instagram::InstagramClient;
pub use meta::MetaClient;
pub use tipos::{
    ChaveEvolution, MensagemEvolution, MidiaBase64, ResultadoEnvio, TipoEnvio, TipoProvedor,
};
