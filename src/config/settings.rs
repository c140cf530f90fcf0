use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub evolution: EvolutionSettings,
    pub meta: MetaSettings,
    pub ia: Option<IaSettings>,
    pub midia: Option<MidiaSettings>,
    #[serde(default)]
    pub agendador: AgendadorSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvolutionSettings {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetaSettings {
    #[serde(default = "graph_base_padrao")]
    pub graph_base_url: String,
    pub app_secret: Option<String>,
    #[serde(default)]
    pub validar_assinatura: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IaSettings {
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default = "timeout_ia_padrao")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MidiaSettings {
    pub upload_endpoint: Option<String>,
    pub transcricao_endpoint: Option<String>,
    pub descricao_endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgendadorSettings {
    #[serde(default = "tick_padrao")]
    pub tick_seconds: u64,
    /// Mensagens mais velhas que isso são descartadas no poll da Evolution
    #[serde(default = "janela_poll_padrao")]
    pub janela_poll_minutos: i64,
    /// Janela da deduplicação por texto idêntico do mesmo contato
    #[serde(default = "janela_dedup_padrao")]
    pub janela_dedup_texto_minutos: i64,
    /// Espera antes da IA responder, quando o agente não define a sua
    #[serde(default = "espera_padrao")]
    pub espera_padrao_segundos: i64,
}

impl Default for AgendadorSettings {
    fn default() -> Self {
        Self {
            tick_seconds: tick_padrao(),
            janela_poll_minutos: janela_poll_padrao(),
            janela_dedup_texto_minutos: janela_dedup_padrao(),
            espera_padrao_segundos: espera_padrao(),
        }
    }
}

fn graph_base_padrao() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn timeout_ia_padrao() -> u64 {
    30
}

fn tick_padrao() -> u64 {
    5
}

fn janela_poll_padrao() -> i64 {
    10
}

fn janela_dedup_padrao() -> i64 {
    5
}

fn espera_padrao() -> i64 {
    8
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // Arquivo de configuração base
            .add_source(File::with_name("config/default").required(false))
            // Arquivo específico do ambiente
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        // Credenciais entram por variável de ambiente dedicada
        if let Ok(api_key) = std::env::var("EVOLUTION_API_KEY") {
            builder = builder.set_override("evolution.api_key", api_key)?;
        }
        if let Ok(secret) = std::env::var("META_APP_SECRET") {
            builder = builder.set_override("meta.app_secret", secret)?;
        }

        builder = builder.add_source(Environment::with_prefix("ZAPCRM").separator("__"));

        let s = builder.build()?;

        s.try_deserialize()
    }
}
