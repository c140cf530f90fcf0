use tracing::{debug, error, info, warn};

pub fn log_request_received(endpoint: &str, method: &str) {
    info!("Request received: {} {}", method, endpoint);
}

pub fn log_request_processed(endpoint: &str, status: u16, duration_ms: u64) {
    info!(
        "Request processed: {} - Status: {} - Duration: {}ms",
        endpoint, status, duration_ms
    );
}

pub fn log_mensagem_recebida(contato: &str, conteudo: &str) {
    info!("Mensagem recebida de {}: {}", contato, conteudo);
}

pub fn log_evento_duplicado(provider_message_id: &str, camada: &str) {
    debug!(
        "Evento duplicado ignorado ({}): {}",
        camada, provider_message_id
    );
}

pub fn log_resposta_agendada(conversa_id: &str, dispara_em: &str) {
    info!(
        "Resposta de IA agendada para conversa {} em {}",
        conversa_id, dispara_em
    );
}

pub fn log_resposta_enviada(conversa_id: &str, fragmentos: usize) {
    info!(
        "Resposta enviada para conversa {} ({} fragmento(s))",
        conversa_id, fragmentos
    );
}

pub fn log_provedor_erro(provedor: &str, status: Option<u16>, erro: &str) {
    error!(
        "Provider API error: {} - Status: {:?} - Error: {}",
        provedor, status, erro
    );
}

pub fn log_config_loaded(env: &str) {
    info!("Configuration loaded successfully for environment: {}", env);
}

pub fn log_server_startup(port: u16) {
    info!("🚀 ZapCRM mensageria server starting on port {}", port);
}

pub fn log_server_ready(port: u16) {
    info!("✅ Server ready and listening on http://0.0.0.0:{}", port);
}

pub fn log_health_check() {
    debug!("Health check requested");
}

pub fn log_validation_error(field: &str, message: &str) {
    warn!("Validation error: {} - {}", field, message);
}

pub fn log_info(message: &str) {
    info!("{}", message);
}

pub fn log_error(message: &str) {
    error!("{}", message);
}

pub fn log_warning(message: &str) {
    warn!("{}", message);
}
