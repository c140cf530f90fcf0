pub mod agendador_respostas;
pub mod fragmentador;
pub mod ia_responder;
pub mod ingestao;
pub mod midia;
pub mod roteador_envio;

pub use agendador_respostas::AgendadorRespostas;
pub use ia_responder::IaResponder;
pub use ingestao::Ingestao;
pub use midia::MediaPipeline;
pub use roteador_envio::RoteadorEnvio;
