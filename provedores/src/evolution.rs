//! Cliente da Evolution API (ponte WhatsApp via QR code)
//!
//! A Evolution não tem push confiável: a ingestão usa `buscar_mensagens_recentes`
//! (poll) e o envio dispara em endpoints específicos por tipo de conteúdo.

use crate::error::{ProviderError, Result};
use crate::resposta::corpo_json;
use crate::tipos::{MensagemEvolution, MidiaBase64, ResultadoEnvio};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

/// Cliente para uma instalação da Evolution API.
///
/// A instância (sessão de QR code) é passada por chamada porque cada conexão
/// de tenant tem a sua.
#[derive(Clone, Debug)]
pub struct EvolutionClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl EvolutionClient {
    /// Cria um novo cliente Evolution
    ///
    /// # Timeouts
    ///
    /// - Total: 30s
    /// - Connect: 5s
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                ProviderError::Config(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Envia texto simples
    pub async fn enviar_texto(
        &self,
        instancia: &str,
        destinatario: &str,
        texto: &str,
    ) -> Result<ResultadoEnvio> {
        let corpo = json!({
            "number": normalizar_destinatario(destinatario),
            "text": texto,
        });
        let json = self
            .post(&format!("/message/sendText/{}", instancia), &corpo)
            .await?;
        Ok(resultado_envio(&json))
    }

    /// Envia imagem ou documento por URL
    ///
    /// A Evolution aceita a URL externa diretamente; não há etapa de upload.
    pub async fn enviar_midia(
        &self,
        instancia: &str,
        destinatario: &str,
        mediatype: &str,
        media_url: &str,
        legenda: Option<&str>,
        nome_arquivo: Option<&str>,
    ) -> Result<ResultadoEnvio> {
        let mut corpo = json!({
            "number": normalizar_destinatario(destinatario),
            "mediatype": mediatype,
            "media": media_url,
        });
        if let Some(legenda) = legenda {
            corpo["caption"] = json!(legenda);
        }
        if let Some(nome) = nome_arquivo {
            corpo["fileName"] = json!(nome);
        }
        let json = self
            .post(&format!("/message/sendMedia/{}", instancia), &corpo)
            .await?;
        Ok(resultado_envio(&json))
    }

    /// Envia áudio como mensagem de voz (PTT)
    pub async fn enviar_audio(
        &self,
        instancia: &str,
        destinatario: &str,
        media_url: &str,
    ) -> Result<ResultadoEnvio> {
        let corpo = json!({
            "number": normalizar_destinatario(destinatario),
            "audio": media_url,
        });
        let json = self
            .post(&format!("/message/sendWhatsAppAudio/{}", instancia), &corpo)
            .await?;
        Ok(resultado_envio(&json))
    }

    /// Sinaliza presença "digitando..." para o contato
    pub async fn marcar_digitando(
        &self,
        instancia: &str,
        destinatario: &str,
        duracao_ms: u64,
    ) -> Result<()> {
        let corpo = json!({
            "number": normalizar_destinatario(destinatario),
            "presence": "composing",
            "delay": duracao_ms,
        });
        self.post(&format!("/chat/sendPresence/{}", instancia), &corpo)
            .await?;
        Ok(())
    }

    /// Busca as mensagens mais recentes da instância (poll de ingestão).
    ///
    /// O formato de resposta varia entre versões da Evolution: pode ser um
    /// array direto ou um objeto `{ messages: { records: [...] } }`.
    pub async fn buscar_mensagens_recentes(
        &self,
        instancia: &str,
        limite: usize,
    ) -> Result<Vec<MensagemEvolution>> {
        let corpo = json!({
            "where": {},
            "limit": limite,
        });
        let json = self
            .post(&format!("/chat/findMessages/{}", instancia), &corpo)
            .await?;

        let registros = if let Some(arr) = json.as_array() {
            arr.clone()
        } else if let Some(arr) = json.pointer("/messages/records").and_then(|v| v.as_array()) {
            arr.clone()
        } else if let Some(arr) = json.get("messages").and_then(|v| v.as_array()) {
            arr.clone()
        } else {
            Vec::new()
        };

        let mut mensagens = Vec::with_capacity(registros.len());
        for registro in registros {
            match serde_json::from_value::<MensagemEvolution>(registro) {
                Ok(m) => mensagens.push(m),
                Err(e) => {
                    tracing::warn!("Registro de mensagem Evolution ignorado (parse): {}", e);
                }
            }
        }
        Ok(mensagens)
    }

    /// Baixa a mídia de uma mensagem em base64
    pub async fn baixar_midia_base64(
        &self,
        instancia: &str,
        message_id: &str,
    ) -> Result<MidiaBase64> {
        let corpo = json!({
            "message": { "key": { "id": message_id } },
            "convertToMp4": false,
        });
        let json = self
            .post(
                &format!("/chat/getBase64FromMediaMessage/{}", instancia),
                &corpo,
            )
            .await?;
        let midia: MidiaBase64 = serde_json::from_value(json)?;
        Ok(midia)
    }

    /// Consulta o estado de conexão da instância (QR conectado ou não)
    pub async fn estado_instancia(&self, instancia: &str) -> Result<String> {
        let url = format!(
            "{}/instance/connectionState/{}",
            self.base_url,
            urlencoding::encode(instancia)
        );
        tracing::debug!("GET {}", url);
        let resposta = self
            .http_client
            .get(&url)
            .header("apikey", &self.api_key)
            .send()
            .await?;
        let json = corpo_json(resposta).await?;
        let estado = json
            .pointer("/instance/state")
            .or_else(|| json.get("state"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        Ok(estado.to_string())
    }

    async fn post(&self, endpoint: &str, corpo: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("POST {}", url);

        let resposta = self
            .http_client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/json")
            .json(corpo)
            .send()
            .await?;

        corpo_json(resposta).await
    }
}

/// Normaliza o destinatário para a Evolution: JID de grupo passa intacto,
/// qualquer outra coisa vira dígitos.
fn normalizar_destinatario(destinatario: &str) -> String {
    if destinatario.contains("@g.us") {
        return destinatario.to_string();
    }
    destinatario.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn resultado_envio(json: &Value) -> ResultadoEnvio {
    ResultadoEnvio {
        provider_message_id: json
            .pointer("/key/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    }
}
