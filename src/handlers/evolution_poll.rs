//! Ingestão pull da Evolution API.
//!
//! A Evolution não tem push confiável; um cron externo (ou operador) chama
//! este endpoint e o serviço puxa as mensagens recentes da instância. A
//! janela de corte descarta o histórico antigo que o poll devolve junto.

use crate::services::ingestao::{normalizar_evolution, ResultadoIngestao};
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::log_request_received;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const LIMITE_POLL: usize = 50;

#[derive(Debug, Deserialize)]
pub struct PedidoPoll {
    pub connection_id: Uuid,
}

pub async fn poll(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoPoll>,
) -> AppResult<Json<Value>> {
    log_request_received("/ingest/evolution/poll", "POST");

    let conexao = state
        .store
        .conexao(pedido.connection_id)
        .await
        .ok_or_else(|| AppError::NaoEncontrado(format!("conexão {}", pedido.connection_id)))?;
    if conexao.provedor != provedores::TipoProvedor::Evolution {
        return Err(AppError::ValidationError(
            "poll só se aplica a conexões Evolution".to_string(),
        ));
    }

    let mensagens = state
        .evolution
        .buscar_mensagens_recentes(&conexao.instancia, LIMITE_POLL)
        .await
        .map_err(AppError::from)?;

    let janela = Duration::minutes(state.settings.agendador.janela_poll_minutos);
    let messages_seen = mensagens.len();
    let mut processed = 0;
    for mensagem in &mensagens {
        let Some(entrada) = normalizar_evolution(mensagem) else {
            continue;
        };
        if let ResultadoIngestao::Processada(_) =
            state.ingestao.ingerir(&conexao, entrada, Some(janela)).await
        {
            processed += 1;
        }
    }

    Ok(Json(json!({
        "messages_seen": messages_seen,
        "processed": processed,
    })))
}
