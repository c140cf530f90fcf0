//! Tratamento comum de respostas HTTP dos provedores

use crate::error::{ProviderError, Result};
use serde_json::Value;

const LIMITE_CORPO_ERRO: usize = 600;

/// Lê o corpo da resposta e converte para JSON.
///
/// Regras:
/// - 2xx com JSON → `Ok(Value)`
/// - não-2xx com JSON → `ProviderError::Api`
/// - corpo não-JSON (ex: HTML de 502 de um gateway upstream) →
///   `ProviderError::BadGateway`, nunca um erro de parse
pub(crate) async fn corpo_json(resposta: reqwest::Response) -> Result<Value> {
    let status = resposta.status().as_u16();
    let corpo = resposta.text().await?;

    match serde_json::from_str::<Value>(&corpo) {
        Ok(json) if (200..300).contains(&status) => Ok(json),
        Ok(_) => Err(ProviderError::Api {
            status,
            body: truncar(&corpo),
        }),
        Err(_) => Err(ProviderError::BadGateway {
            status,
            body: truncar(&corpo),
        }),
    }
}

fn truncar(corpo: &str) -> String {
    if corpo.chars().count() <= LIMITE_CORPO_ERRO {
        return corpo.to_string();
    }
    corpo.chars().take(LIMITE_CORPO_ERRO).collect()
}
