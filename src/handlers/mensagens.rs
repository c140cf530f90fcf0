//! Envio avulso de mensagem de saída (a tela de atendimento do CRM).

use crate::services::roteador_envio::PedidoEnvio;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::log_request_received;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use provedores::TipoEnvio;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PedidoEnviarMensagem {
    pub connection_id: Uuid,
    pub recipient: String,
    #[serde(default)]
    pub content: String,
    pub kind: TipoEnvio,
    #[serde(default)]
    pub media_url: Option<String>,
}

pub async fn enviar(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoEnviarMensagem>,
) -> AppResult<Json<Value>> {
    log_request_received("/mensagens/enviar", "POST");

    let resultado = state
        .roteador
        .enviar_direto(&PedidoEnvio {
            conexao_id: pedido.connection_id,
            destinatario: pedido.recipient,
            conteudo: pedido.content,
            tipo: pedido.kind,
            media_url: pedido.media_url,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "provider_message_id": resultado.provider_message_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PedidoApagarMensagem {
    pub message_id: Uuid,
}

/// Soft-delete: a mensagem fica no histórico, marcada como apagada.
pub async fn apagar(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoApagarMensagem>,
) -> AppResult<Json<Value>> {
    log_request_received("/mensagens/apagar", "POST");

    if !state.store.marcar_apagada(pedido.message_id).await {
        return Err(AppError::NaoEncontrado(format!(
            "mensagem {}",
            pedido.message_id
        )));
    }
    Ok(Json(json!({ "success": true })))
}
