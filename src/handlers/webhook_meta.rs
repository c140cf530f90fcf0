//! Webhook da Meta Cloud API (WhatsApp e Instagram).
//!
//! O GET é o handshake de assinatura da plataforma; o POST recebe os
//! envelopes de mensagem. O POST responde 200 SEMPRE, mesmo com erro
//! interno: a Meta reenvia o evento em caso de não-200 e a deduplicação da
//! ingestão já segura o reenvio — devolver erro só multiplica tráfego.

use crate::services::ingestao::normalizar_meta;
use crate::utils::logging::{
    log_request_processed, log_request_received, log_validation_error, log_warning,
};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

/// Prefixo aceito para verify tokens gerados pelo próprio CRM
const PREFIXO_VERIFY_TOKEN: &str = "zapcrm_verify_";

/// Handshake de assinatura: ecoa `hub.challenge` quando o verify token é
/// reconhecido, senão 403.
pub async fn verificar(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    log_request_received("/webhooks/meta", "GET");

    let modo = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned();

    let (Some("subscribe"), Some(token), Some(challenge)) = (modo, token, challenge) else {
        return (StatusCode::FORBIDDEN, "forbidden".to_string());
    };

    let reconhecido = token.starts_with(PREFIXO_VERIFY_TOKEN)
        || state.store.conexao_por_verify_token(token).await.is_some();
    if reconhecido {
        (StatusCode::OK, challenge)
    } else {
        log_validation_error("hub.verify_token", "token não reconhecido");
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    }
}

/// Recebe envelopes de mensagem. O processamento roda em background; a
/// resposta é 200 imediato.
pub async fn receber(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    log_request_received("/webhooks/meta", "POST");
    let inicio = std::time::Instant::now();

    if state.settings.meta.validar_assinatura {
        if let Some(segredo) = state.settings.meta.app_secret.as_deref() {
            if !assinatura_valida(segredo, &headers, &body) {
                log_validation_error("X-Hub-Signature-256", "assinatura inválida");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "invalid signature" })),
                );
            }
        }
    }

    let envelope = match serde_json::from_slice::<crate::models::MetaWebhookEnvelope>(&body) {
        Ok(envelope) => envelope,
        Err(erro) => {
            // Payload ilegível também recebe 200: não há o que reprocessar
            log_warning(&format!("Webhook Meta ilegível: {}", erro));
            return (StatusCode::OK, Json(json!({ "status": "ignored" })));
        }
    };

    let state = Arc::clone(&state);
    tokio::spawn(async move {
        processar_envelope(state, envelope).await;
    });

    log_request_processed("/webhooks/meta", 200, inicio.elapsed().as_millis() as u64);
    (StatusCode::OK, Json(json!({ "status": "received" })))
}

async fn processar_envelope(state: Arc<AppState>, envelope: crate::models::MetaWebhookEnvelope) {
    for entry in envelope.entry {
        for change in entry.changes {
            let valor = change.value;
            let Some(telefone_id) = valor.metadata.as_ref().map(|m| m.phone_number_id.clone())
            else {
                continue;
            };
            let Some(conexao) = state.store.conexao_por_telefone_id(&telefone_id).await else {
                log_warning(&format!(
                    "Webhook Meta para phone_number_id desconhecido: {}",
                    telefone_id
                ));
                continue;
            };

            for mensagem in &valor.messages {
                let nome = valor
                    .contacts
                    .iter()
                    .find(|c| c.wa_id == mensagem.from)
                    .and_then(|c| c.profile.as_ref())
                    .map(|p| p.name.clone());
                let entrada = normalizar_meta(mensagem, nome, conexao.token.as_deref());
                // Webhook é tempo real: sem janela de corte
                let _ = state.ingestao.ingerir(&conexao, entrada, None).await;
            }
        }
    }
}

fn assinatura_valida(segredo: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let Some(assinatura) = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("sha256="))
    else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(segredo.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let esperada = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(esperada.as_bytes(), assinatura.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assinatura_correta_passa() {
        let corpo = br#"{"object":"whatsapp_business_account"}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"segredo").unwrap();
        mac.update(corpo);
        let hex_assinatura = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature-256",
            format!("sha256={}", hex_assinatura).parse().unwrap(),
        );

        assert!(assinatura_valida("segredo", &headers, corpo));
        assert!(!assinatura_valida("outro-segredo", &headers, corpo));
    }

    #[test]
    fn assinatura_ausente_reprova() {
        let headers = HeaderMap::new();
        assert!(!assinatura_valida("segredo", &headers, b"{}"));
    }
}
