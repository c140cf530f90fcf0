use crate::models::StatusConexao;
use crate::utils::logging::log_health_check;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use provedores::TipoProvedor;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health_check() -> Json<Value> {
    log_health_check();
    Json(json!({
        "status": "healthy",
        "service": "zapcrm-mensageria",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn readiness() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

/// Estado das conexões cadastradas. Conexão Evolution é consultada no
/// provedor e o resultado fica persistido na conexão; Meta/Instagram
/// reportam o status armazenado.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut conexoes = Vec::new();
    for conexao in state.store.todas_conexoes().await {
        let estado = match conexao.provedor {
            TipoProvedor::Evolution => {
                let estado = state
                    .evolution
                    .estado_instancia(&conexao.instancia)
                    .await
                    .unwrap_or_else(|_| "unreachable".to_string());
                let novo = if estado == "open" {
                    StatusConexao::Connected
                } else {
                    StatusConexao::Disconnected
                };
                state.store.atualizar_status_conexao(conexao.id, novo).await;
                estado
            }
            _ => format!("{:?}", conexao.status).to_lowercase(),
        };
        conexoes.push(json!({
            "id": conexao.id,
            "provedor": conexao.provedor.to_string(),
            "instancia": conexao.instancia,
            "estado": estado,
        }));
    }

    Json(json!({
        "service": "zapcrm-mensageria",
        "timestamp": Utc::now().to_rfc3339(),
        "conexoes": conexoes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::suporte::estado_de_teste;
    use crate::models::Conexao;
    use httpmock::prelude::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn status_persiste_o_estado_da_instancia_evolution() {
        let servidor = MockServer::start_async().await;
        servidor
            .mock_async(|when, then| {
                when.method(GET).path("/instance/connectionState/inst1");
                then.status(200)
                    .json_body(json!({ "instance": { "state": "open" } }));
            })
            .await;

        let state = estado_de_teste(&servidor);
        let conexao = Conexao {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            provedor: TipoProvedor::Evolution,
            instancia: "inst1".into(),
            token: None,
            telefone_id: None,
            verify_token: None,
            status: StatusConexao::Awaiting,
        };
        state.store.inserir_conexao(conexao.clone()).await;

        let corpo = status(State(Arc::clone(&state))).await.0;

        assert_eq!(corpo["conexoes"][0]["estado"], "open");
        // O resultado da consulta fica gravado na conexão
        assert_eq!(
            state.store.conexao(conexao.id).await.unwrap().status,
            StatusConexao::Connected
        );
    }
}
