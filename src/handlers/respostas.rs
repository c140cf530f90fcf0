//! Disparos manuais do agendador de respostas: o gatilho imediato de uma
//! conversa e a varredura de todos os slots devidos (estilo cron). O loop de
//! tick interno chama a mesma varredura.

use crate::services::agendador_respostas::Desfecho;
use crate::utils::logging::log_request_received;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PedidoProcessarAgora {
    pub conversation_id: Uuid,
}

pub async fn processar_agora(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoProcessarAgora>,
) -> Json<Value> {
    log_request_received("/respostas/processar-agora", "POST");

    let desfecho = state
        .agendador
        .adquirir_e_processar(pedido.conversation_id)
        .await;

    let (resultado, detalhe) = match &desfecho {
        Desfecho::RespostaEnviada => ("enviada", None),
        Desfecho::NaoAdquirido => ("nao_adquirido", None),
        Desfecho::AindaNaoDevido => ("ainda_nao_devido", None),
        Desfecho::IaDesativada => ("ia_desativada", None),
        Desfecho::JaPersistida => ("ja_persistida", None),
        Desfecho::SemResposta => ("sem_resposta", None),
        Desfecho::Falha(erro) => ("falha", Some(erro.clone())),
    };

    Json(json!({
        "resultado": resultado,
        "detalhe": detalhe,
    }))
}

pub async fn processar_pendentes(State(state): State<Arc<AppState>>) -> Json<Value> {
    log_request_received("/respostas/processar-pendentes", "POST");

    let (verificados, enviados) = state.agendador.processar_pendentes().await;
    Json(json!({
        "verificados": verificados,
        "enviados": enviados,
    }))
}
