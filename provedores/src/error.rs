//! Tipos de erro dos adaptadores de provedor

use thiserror::Error;

/// Erros dos clientes de provedor
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Erro de requisição HTTP (rede, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Resposta não-2xx do provedor, com corpo JSON legível
    #[error("provider API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// Resposta com corpo que não é JSON (ex: HTML de um 502 upstream).
    /// Distinto de `Api` para que o chamador não trate como crash de parse.
    #[error("provider bad gateway (status {status}): {body}")]
    BadGateway { status: u16, body: String },

    /// Erro de parsing JSON em corpo 2xx
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Credencial ausente ou parâmetro inválido para o provedor
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Status HTTP associado, quando houver
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } | ProviderError::BadGateway { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Tipo Result padrão para o crate
pub type Result<T> = std::result::Result<T, ProviderError>;
