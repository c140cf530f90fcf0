//! Cadastro operacional de conexões e agentes de IA.
//!
//! No produto completo essas linhas nascem no painel do CRM; aqui o serviço
//! expõe o mínimo para provisionar um tenant sem acesso direto ao banco.

use crate::models::{AgenteIa, Conexao, StatusConexao};
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::log_request_received;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use provedores::TipoProvedor;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PedidoCriarConexao {
    pub tenant_id: Uuid,
    pub provedor: TipoProvedor,
    pub instancia: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub telefone_id: Option<String>,
    #[serde(default)]
    pub verify_token: Option<String>,
}

pub async fn criar_conexao(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoCriarConexao>,
) -> AppResult<Json<Value>> {
    log_request_received("/admin/conexoes", "POST");

    let conexao = Conexao {
        id: Uuid::new_v4(),
        tenant_id: pedido.tenant_id,
        provedor: pedido.provedor,
        instancia: pedido.instancia,
        token: pedido.token,
        telefone_id: pedido.telefone_id,
        verify_token: pedido.verify_token,
        status: StatusConexao::Awaiting,
    };
    let id = conexao.id;
    state.store.inserir_conexao(conexao).await;

    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct PedidoCriarAgente {
    pub tenant_id: Uuid,
    pub nome: String,
    #[serde(default = "verdadeiro")]
    pub principal: bool,
    #[serde(default)]
    pub espera_segundos: Option<i64>,
    #[serde(default = "verdadeiro")]
    pub fragmentar_mensagens: bool,
    #[serde(default = "tamanho_fragmento_padrao")]
    pub tamanho_max_fragmento: usize,
    #[serde(default = "intervalo_fragmentos_padrao")]
    pub intervalo_fragmentos_ms: u64,
    #[serde(default = "verdadeiro")]
    pub simular_digitacao: bool,
}

fn verdadeiro() -> bool {
    true
}

fn tamanho_fragmento_padrao() -> usize {
    500
}

fn intervalo_fragmentos_padrao() -> u64 {
    1200
}

pub async fn criar_agente(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoCriarAgente>,
) -> AppResult<Json<Value>> {
    log_request_received("/admin/agentes", "POST");

    let agente = AgenteIa {
        id: Uuid::new_v4(),
        tenant_id: pedido.tenant_id,
        nome: pedido.nome,
        principal: pedido.principal,
        ativo: true,
        espera_segundos: pedido.espera_segundos,
        fragmentar_mensagens: pedido.fragmentar_mensagens,
        tamanho_max_fragmento: pedido.tamanho_max_fragmento,
        intervalo_fragmentos_ms: pedido.intervalo_fragmentos_ms,
        simular_digitacao: pedido.simular_digitacao,
    };
    let id = agente.id;
    state.store.inserir_agente(agente).await;

    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct PedidoAtualizarConversa {
    pub conversation_id: Uuid,
    pub ia_ativa: bool,
}

/// Transferência entre IA e atendimento humano. Desligar `ia_ativa` tira a
/// conversa do agendador imediatamente: um slot já agendado é descartado na
/// aquisição, sem gerar resposta.
pub async fn atualizar_conversa(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoAtualizarConversa>,
) -> AppResult<Json<Value>> {
    log_request_received("/admin/conversas", "POST");

    let conversa = state
        .store
        .conversa(pedido.conversation_id)
        .await
        .ok_or_else(|| {
            AppError::NaoEncontrado(format!("conversa {}", pedido.conversation_id))
        })?;

    state
        .store
        .definir_ia_ativa(conversa.id, pedido.ia_ativa)
        .await;
    state
        .store
        .registrar_atividade(
            conversa.tenant_id,
            "troca_atendimento",
            json!({ "conversa_id": conversa.id, "ia_ativa": pedido.ia_ativa }),
        )
        .await;

    Ok(Json(json!({ "id": conversa.id, "ia_ativa": pedido.ia_ativa })))
}
