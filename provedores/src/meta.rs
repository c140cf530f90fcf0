//! Cliente da Meta Cloud API (WhatsApp oficial)
//!
//! Diferenças de semântica em relação à Evolution:
//! - mídia precisa ser enviada primeiro ao endpoint `/media` da conexão para
//!   obter um media-id; URL externa crua não é aceita de forma confiável;
//! - o destinatário tem que ser só dígitos;
//! - legenda só existe em envio de imagem.

use crate::error::{ProviderError, Result};
use crate::resposta::corpo_json;
use crate::tipos::ResultadoEnvio;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

const GRAPH_BASE_PADRAO: &str = "https://graph.facebook.com/v19.0";

/// Cliente para a WhatsApp Cloud API.
///
/// Token e phone-number-id são por conexão de tenant, então entram por chamada.
#[derive(Clone, Debug)]
pub struct MetaClient {
    http_client: HttpClient,
    graph_base: String,
}

impl MetaClient {
    pub fn new(graph_base: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(60))
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

    /// Sobe a mídia para o endpoint da conexão e retorna o media-id.
    ///
    /// Containers de áudio que a Cloud API rejeita (ex: webm gravado pelo
    /// navegador) são re-rotulados para ogg antes do upload — o codec é
    /// compatível, só o container é desconhecido para o provedor.
    pub async fn subir_midia(
        &self,
        token: &str,
        phone_number_id: &str,
        bytes: Vec<u8>,
        mime: &str,
        nome_arquivo: &str,
    ) -> Result<String> {
        let mime = normalizar_mime_audio(mime);
        let nome = ajustar_extensao(nome_arquivo, &mime);

        let parte = Part::bytes(bytes)
            .file_name(nome)
            .mime_str(&mime)
            .map_err(|e| ProviderError::Config(format!("mime inválido '{}': {}", mime, e)))?;

        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime.clone())
            .part("file", parte);

        let url = format!("{}/{}/media", self.graph_base, phone_number_id);
        tracing::debug!("POST {} (upload de mídia, {})", url, mime);

        let resposta = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let json = corpo_json(resposta).await?;
        json.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::Api {
                status: 200,
                body: format!("upload sem media id: {}", json),
            })
    }

    /// Envia texto simples (sem legenda — legenda só existe em imagem)
    pub async fn enviar_texto(
        &self,
        token: &str,
        phone_number_id: &str,
        destinatario: &str,
        texto: &str,
    ) -> Result<ResultadoEnvio> {
        let destinatario = validar_destinatario(destinatario)?;
        let corpo = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": destinatario,
            "type": "text",
            "text": { "body": texto },
        });
        self.enviar(token, phone_number_id, &corpo).await
    }

    /// Envia imagem por media-id, com legenda opcional
    pub async fn enviar_imagem(
        &self,
        token: &str,
        phone_number_id: &str,
        destinatario: &str,
        media_id: &str,
        legenda: Option<&str>,
    ) -> Result<ResultadoEnvio> {
        let destinatario = validar_destinatario(destinatario)?;
        let mut imagem = json!({ "id": media_id });
        if let Some(legenda) = legenda {
            imagem["caption"] = json!(legenda);
        }
        let corpo = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": destinatario,
            "type": "image",
            "image": imagem,
        });
        self.enviar(token, phone_number_id, &corpo).await
    }

    /// Envia áudio por media-id
    pub async fn enviar_audio(
        &self,
        token: &str,
        phone_number_id: &str,
        destinatario: &str,
        media_id: &str,
    ) -> Result<ResultadoEnvio> {
        let destinatario = validar_destinatario(destinatario)?;
        let corpo = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": destinatario,
            "type": "audio",
            "audio": { "id": media_id },
        });
        self.enviar(token, phone_number_id, &corpo).await
    }

    /// Envia documento por media-id
    pub async fn enviar_documento(
        &self,
        token: &str,
        phone_number_id: &str,
        destinatario: &str,
        media_id: &str,
        nome_arquivo: Option<&str>,
    ) -> Result<ResultadoEnvio> {
        let destinatario = validar_destinatario(destinatario)?;
        let mut documento = json!({ "id": media_id });
        if let Some(nome) = nome_arquivo {
            documento["filename"] = json!(nome);
        }
        let corpo = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": destinatario,
            "type": "document",
            "document": documento,
        });
        self.enviar(token, phone_number_id, &corpo).await
    }

    /// Baixa uma mídia recebida: resolve a URL pelo media-id e busca os bytes
    pub async fn baixar_midia(&self, token: &str, media_id: &str) -> Result<(Vec<u8>, String)> {
        let url = format!("{}/{}", self.graph_base, media_id);
        tracing::debug!("GET {}", url);

        let resposta = self.http_client.get(&url).bearer_auth(token).send().await?;
        let json = corpo_json(resposta).await?;

        let url_midia = json
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Api {
                status: 200,
                body: format!("media id {} sem url", media_id),
            })?;
        let mime = json
            .get("mime_type")
            .and_then(|v| v.as_str())
            .unwrap_or("application/octet-stream")
            .to_string();

        let resposta = self
            .http_client
            .get(url_midia)
            .bearer_auth(token)
            .send()
            .await?;
        let status = resposta.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ProviderError::Api {
                status,
                body: "falha ao baixar mídia".to_string(),
            });
        }
        let bytes = resposta.bytes().await?.to_vec();
        Ok((bytes, mime))
    }

    async fn enviar(
        &self,
        token: &str,
        phone_number_id: &str,
        corpo: &Value,
    ) -> Result<ResultadoEnvio> {
        let url = format!("{}/{}/messages", self.graph_base, phone_number_id);
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
                .pointer("/messages/0/id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }
}

/// A Cloud API só aceita destinatário em dígitos
fn validar_destinatario(destinatario: &str) -> Result<String> {
    let sem_prefixo = destinatario.trim().trim_start_matches('+');
    if sem_prefixo.is_empty() || !sem_prefixo.chars().all(|c| c.is_ascii_digit()) {
        return Err(ProviderError::Config(format!(
            "destinatário inválido para Meta (esperado só dígitos): {}",
            destinatario
        )));
    }
    Ok(sem_prefixo.to_string())
}

/// Re-rotula containers de áudio desconhecidos do provedor para ogg
pub fn normalizar_mime_audio(mime: &str) -> String {
    let base = mime.split(';').next().unwrap_or(mime).trim();
    match base {
        "audio/webm" | "audio/x-m4a" | "audio/mp4a-latm" => "audio/ogg".to_string(),
        "audio/ogg" => "audio/ogg".to_string(),
        outro => outro.to_string(),
    }
}

fn ajustar_extensao(nome: &str, mime: &str) -> String {
    if mime == "audio/ogg" && !nome.ends_with(".ogg") {
        match nome.rsplit_once('.') {
            Some((base, _)) => format!("{}.ogg", base),
            None => format!("{}.ogg", nome),
        }
    } else {
        nome.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn webm_vira_ogg() {
        assert_eq!(normalizar_mime_audio("audio/webm"), "audio/ogg");
        assert_eq!(normalizar_mime_audio("audio/webm; codecs=opus"), "audio/ogg");
        assert_eq!(normalizar_mime_audio("audio/mpeg"), "audio/mpeg");
    }

    #[test]
    fn extensao_acompanha_o_mime() {
        assert_eq!(ajustar_extensao("gravacao.webm", "audio/ogg"), "gravacao.ogg");
        assert_eq!(ajustar_extensao("foto.jpg", "image/jpeg"), "foto.jpg");
    }

    #[test]
    fn destinatario_com_letras_e_rejeitado() {
        let erro = validar_destinatario("5511999999999@s.whatsapp.net").unwrap_err();
        assert!(matches!(erro, ProviderError::Config(_)));
        assert_eq!(validar_destinatario("5511999999999").unwrap(), "5511999999999");
        assert_eq!(validar_destinatario("+5511999999999").unwrap(), "5511999999999");
    }

    #[tokio::test]
    async fn upload_retorna_media_id() {
        let servidor = MockServer::start_async().await;
        let mock = servidor
            .mock_async(|when, then| {
                when.method(POST).path("/123456/media");
                then.status(200).json_body(serde_json::json!({ "id": "MEDIA42" }));
            })
            .await;

        let client = MetaClient::new(servidor.base_url()).unwrap();
        let media_id = client
            .subir_midia("token", "123456", vec![1, 2, 3], "audio/webm", "voz.webm")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(media_id, "MEDIA42");
    }

    #[tokio::test]
    async fn envio_de_texto_extrai_wamid() {
        let servidor = MockServer::start_async().await;
        servidor
            .mock_async(|when, then| {
                when.method(POST).path("/123456/messages");
                then.status(200).json_body(serde_json::json!({
                    "messages": [ { "id": "wamid.ABC" } ]
                }));
            })
            .await;

        let client = MetaClient::new(servidor.base_url()).unwrap();
        let resultado = client
            .enviar_texto("token", "123456", "5511999999999", "Olá!")
            .await
            .unwrap();

        assert_eq!(resultado.provider_message_id.as_deref(), Some("wamid.ABC"));
    }
}
