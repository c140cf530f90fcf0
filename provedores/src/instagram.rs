//! Cliente de Instagram Direct via Meta Graph API
//!
//! O formato é parecido com a Cloud API mas o envelope difere: destinatário
//! vai em `recipient.id` e mídia vai como attachment com URL reutilizável
//! (`is_reusable`), sem a etapa de upload por media-id.
//!
//! Quando a conexão não tem credencial de plataforma, o roteador de envio cai
//! para o adaptador Evolution — essa decisão fica fora deste cliente.

use crate::error::{ProviderError, Result};
use crate::resposta::corpo_json;
use crate::tipos::{ResultadoEnvio, TipoEnvio};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

const GRAPH_BASE_PADRAO: &str = "https://graph.facebook.com/v19.0";

#[derive(Clone, Debug)]
pub struct InstagramClient {
    http_client: HttpClient,
    graph_base: String,
}

impl InstagramClient {
    pub fn new(graph_base: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                ProviderError::Config(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            graph_base: graph_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn padrao() -> Result<Self> {
        Self::new(GRAPH_BASE_PADRAO)
    }

    /// Envia texto para um usuário do Instagram (IGSID)
    pub async fn enviar_texto(
        &self,
        token: &str,
        page_id: &str,
        recipient_id: &str,
        texto: &str,
    ) -> Result<ResultadoEnvio> {
        let corpo = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": texto },
        });
        self.enviar(token, page_id, &corpo).await
    }

    /// Envia mídia como attachment com URL reutilizável
    pub async fn enviar_anexo(
        &self,
        token: &str,
        page_id: &str,
        recipient_id: &str,
        tipo: TipoEnvio,
        media_url: &str,
    ) -> Result<ResultadoEnvio> {
        let tipo_anexo = match tipo {
            TipoEnvio::Imagem => "image",
            TipoEnvio::Audio => "audio",
            TipoEnvio::Documento => "file",
            TipoEnvio::Texto => {
                return Err(ProviderError::Config(
                    "envio de texto não usa attachment".to_string(),
                ))
            }
        };
        let corpo = json!({
            "recipient": { "id": recipient_id },
            "message": {
                "attachment": {
                    "type": tipo_anexo,
                    "payload": { "url": media_url, "is_reusable": true }
                }
            },
        });
        self.enviar(token, page_id, &corpo).await
    }

    async fn enviar(&self, token: &str, page_id: &str, corpo: &Value) -> Result<ResultadoEnvio> {
        let url = format!("{}/{}/messages", self.graph_base, page_id);
        tracing::debug!("POST {}", url);

        let resposta = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .json(corpo)
            .send()
            .await?;

        let json = corpo_json(resposta).await?;
        Ok(ResultadoEnvio {
            provider_message_id: json
                .get("message_id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn anexo_vai_com_url_reutilizavel() {
        let servidor = MockServer::start_async().await;
        let mock = servidor
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/page1/messages")
                    .json_body_partial(
                        r#"{
                            "recipient": { "id": "igsid-9" },
                            "message": {
                                "attachment": {
                                    "type": "image",
                                    "payload": { "url": "https://cdn.example.com/foto.jpg", "is_reusable": true }
                                }
                            }
                        }"#,
                    );
                then.status(200)
                    .json_body(serde_json::json!({ "recipient_id": "igsid-9", "message_id": "mid.77" }));
            })
            .await;

        let client = InstagramClient::new(servidor.base_url()).unwrap();
        let resultado = client
            .enviar_anexo(
                "token",
                "page1",
                "igsid-9",
                TipoEnvio::Imagem,
                "https://cdn.example.com/foto.jpg",
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(resultado.provider_message_id.as_deref(), Some("mid.77"));
    }
}
