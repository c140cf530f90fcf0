//! Serviço de mensageria do ZapCRM
//!
//! Fluxo:
//! - Webhook da Meta / poll da Evolution alimentam a ingestão (dedup em
//!   três camadas, contato/conversa resolvidos, mídia processada)
//! - Cada mensagem de entrada reagenda o slot de resposta da conversa
//! - O agendador adquire o slot por CAS, pede a resposta ao gerador de IA
//!   e entrega pelo roteador (fragmentação + simulação de digitação)

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use zapcrm_mensageria::config::Settings;
use zapcrm_mensageria::handlers::{
    admin, evolution_poll, health, mensagens, respostas, webhook_meta,
};
use zapcrm_mensageria::services::{
    AgendadorRespostas, IaResponder, Ingestao, MediaPipeline, RoteadorEnvio,
};
use zapcrm_mensageria::storage::Store;
use zapcrm_mensageria::utils::logging::*;
use zapcrm_mensageria::utils::AppError;
use zapcrm_mensageria::AppState;

use provedores::{EvolutionClient, InstagramClient, MetaClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Em produção não existe .env; as variáveis vêm do ambiente
    if dotenvy::dotenv().is_err() {
        tracing::debug!("Arquivo .env não encontrado - usando variáveis de ambiente do sistema");
    }

    tracing_subscriber::fmt::init();

    let settings = Settings::new()
        .map_err(|e| AppError::ConfigError(format!("Failed to load settings: {}", e)))?;
    log_config_loaded(&std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()));

    // Clientes dos provedores
    let evolution = EvolutionClient::new(
        settings.evolution.base_url.clone(),
        settings.evolution.api_key.clone(),
    )
    .map_err(|e| AppError::ConfigError(format!("Failed to create Evolution client: {}", e)))?;
    let meta = MetaClient::new(settings.meta.graph_base_url.clone())
        .map_err(|e| AppError::ConfigError(format!("Failed to create Meta client: {}", e)))?;
    let instagram = InstagramClient::new(settings.meta.graph_base_url.clone())
        .map_err(|e| AppError::ConfigError(format!("Failed to create Instagram client: {}", e)))?;

    let store = Store::new();

    let midia = MediaPipeline::new(evolution.clone(), meta.clone(), settings.midia.clone());
    let ingestao = Ingestao::new(store.clone(), midia, settings.agendador.clone());
    let roteador = RoteadorEnvio::new(store.clone(), evolution.clone(), meta, instagram);

    let ia = IaResponder::new(settings.ia.clone());
    if ia.habilitado() {
        log_info("✅ Gerador de respostas de IA habilitado");
    } else {
        log_warning("⚠️ Gerador de respostas de IA desabilitado (seção [ia] ausente ou enabled=false)");
    }

    let agendador = Arc::new(AgendadorRespostas::new(
        store.clone(),
        ia,
        roteador.clone(),
        settings.agendador.clone(),
    ));
    agendador.clone().iniciar().await;

    let app_state = Arc::new(AppState {
        settings: settings.clone(),
        store,
        ingestao,
        roteador,
        agendador,
        evolution,
    });

    let app = Router::new()
        // Health checks (públicos)
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/status", get(health::status))
        // Webhooks e ingestão
        .route(
            "/webhooks/meta",
            get(webhook_meta::verificar).post(webhook_meta::receber),
        )
        .route("/ingest/evolution/poll", post(evolution_poll::poll))
        // Envio e agendador
        .route("/mensagens/enviar", post(mensagens::enviar))
        .route("/mensagens/apagar", post(mensagens::apagar))
        .route("/respostas/processar-agora", post(respostas::processar_agora))
        .route(
            "/respostas/processar-pendentes",
            post(respostas::processar_pendentes),
        )
        // Provisionamento de tenant e transferência IA/humano
        .route("/admin/conexoes", post(admin::criar_conexao))
        .route("/admin/agentes", post(admin::criar_agente))
        .route("/admin/conversas", post(admin::atualizar_conversa))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state.clone());

    // No Cloud Run, usar a variável de ambiente PORT
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(settings.server.port);
    let listener = TcpListener::bind(format!("{}:{}", settings.server.host, port)).await?;

    log_server_startup(port);
    log_server_ready(port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.agendador.parar().await;
    log_info("🛑 Server shut down gracefully");
    Ok(())
}

/// Signal handler para graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log_info("🛑 Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            log_info("🛑 Received SIGTERM, shutting down gracefully...");
        }
    }
}
