//! Entidades do domínio de atendimento.
//!
//! Os valores de enum serializam nos literais que o resto do CRM usa
//! (`em_atendimento`, `entrada`, ...), então mudar um rename aqui quebra
//! os consumidores do banco.

use chrono::{DateTime, Utc};
use provedores::TipoProvedor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusConversa {
    EmAtendimento,
    AguardandoCliente,
    Encerrado,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direcao {
    Entrada,
    Saida,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipoMensagem {
    Texto,
    Imagem,
    Audio,
    Video,
    Documento,
    Sticker,
    Sistema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusConexao {
    Connected,
    Disconnected,
    Awaiting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contato {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub telefone: String,
    pub nome: String,
    pub canal: TipoProvedor,
    #[serde(default)]
    pub tags: Vec<String>,
    pub criado_em: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversa {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contato_id: Uuid,
    pub conexao_id: Uuid,
    /// Classe de canal da conversa: no máximo uma conversa ativa por
    /// (tenant, contato, canal), então WhatsApp e Instagram do mesmo
    /// contato correm em conversas separadas
    pub canal: TipoProvedor,
    pub status: StatusConversa,
    /// Quando falso, nenhuma resposta automática é agendada para a conversa
    pub ia_ativa: bool,
    pub agente_humano_id: Option<Uuid>,
    pub agente_ia_id: Option<Uuid>,
    pub etapa_fluxo: Option<String>,
    pub ultima_mensagem: Option<String>,
    pub ultima_mensagem_em: Option<DateTime<Utc>>,
    pub nao_lidas: u32,
    pub arquivada: bool,
    pub criado_em: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mensagem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversa_id: Uuid,
    pub contato_id: Uuid,
    pub conteudo: String,
    pub direcao: Direcao,
    pub tipo: TipoMensagem,
    pub media_url: Option<String>,
    /// Campos acessórios: provider_message_id, transcricao, descricao_imagem...
    #[serde(default)]
    pub metadata: Value,
    pub enviada_por_ia: bool,
    pub apagada: bool,
    pub apagada_em: Option<DateTime<Utc>>,
    pub criado_em: DateTime<Utc>,
}

impl Mensagem {
    pub fn provider_message_id(&self) -> Option<&str> {
        self.metadata
            .get("provider_message_id")
            .and_then(|v| v.as_str())
    }
}

/// Conexão de um tenant com um provedor de mensageria.
///
/// Para Evolution, `instancia` é a sessão de QR code; para Meta/Instagram,
/// `token` e `telefone_id` (phone-number-id ou page-id) vêm da plataforma.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conexao {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provedor: TipoProvedor,
    pub instancia: String,
    pub token: Option<String>,
    pub telefone_id: Option<String>,
    pub verify_token: Option<String>,
    pub status: StatusConexao,
}

/// Slot de resposta pendente de uma conversa: no máximo um por conversa,
/// adquirido por CAS antes de gerar a resposta de IA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotResposta {
    pub conversa_id: Uuid,
    pub dispara_em: DateTime<Utc>,
    pub em_processamento: bool,
    pub atualizado_em: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenteIa {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub nome: String,
    pub principal: bool,
    pub ativo: bool,
    pub espera_segundos: Option<i64>,
    pub fragmentar_mensagens: bool,
    pub tamanho_max_fragmento: usize,
    pub intervalo_fragmentos_ms: u64,
    pub simular_digitacao: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atividade {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub acao: String,
    pub detalhe: Value,
    pub criado_em: DateTime<Utc>,
}
