//! Cliente do serviço de geração de respostas de IA.
//!
//! O gerador é um colaborador externo: recebe a última mensagem do cliente
//! com contexto da conversa e devolve se deve responder e com qual texto.
//! Há um caminho legado em que o próprio gerador persiste e envia a resposta;
//! nesse caso ele sinaliza `alreadyPersisted` e o agendador só limpa o slot.

use crate::config::settings::IaSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PedidoGeracao {
    pub conversation_id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub message: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RespostaGeracao {
    #[serde(rename = "shouldRespond", default)]
    pub should_respond: bool,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(rename = "alreadyPersisted", default)]
    pub already_persisted: bool,
}

#[derive(Clone)]
pub struct IaResponder {
    http_client: reqwest::Client,
    settings: Option<IaSettings>,
}

impl IaResponder {
    pub fn new(settings: Option<IaSettings>) -> Self {
        let timeout = settings
            .as_ref()
            .map(|s| s.timeout_seconds)
            .unwrap_or(30);
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            settings,
        }
    }

    pub fn habilitado(&self) -> bool {
        self.settings.as_ref().map(|s| s.enabled).unwrap_or(false)
    }

    /// Pede uma resposta ao gerador. Desabilitado vira "não responder".
    pub async fn gerar(&self, pedido: &PedidoGeracao) -> Result<RespostaGeracao, String> {
        let settings = match &self.settings {
            Some(s) if s.enabled => s,
            _ => return Ok(RespostaGeracao::default()),
        };

        let resposta = self
            .http_client
            .post(&settings.endpoint)
            .json(pedido)
            .send()
            .await
            .map_err(|e| format!("gerador de IA inacessível: {}", e))?;

        if !resposta.status().is_success() {
            return Err(format!(
                "gerador de IA retornou status {}",
                resposta.status().as_u16()
            ));
        }

        resposta
            .json::<RespostaGeracao>()
            .await
            .map_err(|e| format!("resposta do gerador ilegível: {}", e))
    }
}
