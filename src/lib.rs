pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

use crate::config::Settings;
use crate::services::{AgendadorRespostas, Ingestao, RoteadorEnvio};
use crate::storage::Store;
use provedores::EvolutionClient;
use std::sync::Arc;

/// Estado compartilhado dos handlers
pub struct AppState {
    pub settings: Settings,
    pub store: Store,
    pub ingestao: Ingestao,
    pub roteador: RoteadorEnvio,
    pub agendador: Arc<AgendadorRespostas>,
    pub evolution: EvolutionClient,
}
