//! Ingestão de mensagens recebidas.
//!
//! Os dois provedores convergem aqui: o payload nativo vira uma
//! `EntradaNormalizada` e o fluxo único filtra, deduplica em três camadas,
//! resolve contato e conversa, roda o pipeline de mídia e agenda a resposta
//! de IA quando a conversa tem IA ativa.

use crate::config::settings::AgendadorSettings;
use crate::models::*;
use crate::services::midia::{placeholder_midia, MediaPipeline, RefMidia};
use crate::storage::Store;
use crate::utils::logging::{log_evento_duplicado, log_mensagem_recebida, log_resposta_agendada};
use crate::utils::phone::{eh_jid_grupo, extrair_telefone_de_jid, normalizar_telefone};
use chrono::{DateTime, Duration, TimeZone, Utc};
use provedores::MensagemEvolution;
use serde_json::json;
use uuid::Uuid;

/// Mensagem de entrada já traduzida do formato nativo do provedor
#[derive(Debug, Clone)]
pub struct EntradaNormalizada {
    pub provider_message_id: String,
    pub remetente_jid: String,
    pub telefone: String,
    pub nome_exibicao: Option<String>,
    pub de_mim: bool,
    pub timestamp: DateTime<Utc>,
    pub tipo: TipoMensagem,
    pub texto: Option<String>,
    pub midia: Option<RefMidia>,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotivoDescarte {
    DeMim,
    Grupo,
    ForaDaJanela,
    Duplicada,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultadoIngestao {
    Processada(Uuid),
    Ignorada(MotivoDescarte),
}

/// Converte uma mensagem do poll da Evolution. `None` quando o registro não
/// tem remetente identificável.
pub fn normalizar_evolution(mensagem: &MensagemEvolution) -> Option<EntradaNormalizada> {
    if mensagem.key.remote_jid.is_empty() || mensagem.key.id.is_empty() {
        return None;
    }
    let remetente_jid = mensagem.key.remote_jid.clone();
    let telefone = extrair_telefone_de_jid(&remetente_jid);

    let tipo = match mensagem.tipo_conteudo() {
        "texto" => TipoMensagem::Texto,
        "imagem" => TipoMensagem::Imagem,
        "audio" => TipoMensagem::Audio,
        "video" => TipoMensagem::Video,
        "documento" => TipoMensagem::Documento,
        "sticker" => TipoMensagem::Sticker,
        _ => TipoMensagem::Texto,
    };

    let midia = if tipo != TipoMensagem::Texto {
        Some(RefMidia::Evolution {
            message_id: mensagem.key.id.clone(),
        })
    } else {
        None
    };

    Some(EntradaNormalizada {
        provider_message_id: mensagem.key.id.clone(),
        remetente_jid,
        telefone,
        nome_exibicao: mensagem.push_name.clone(),
        de_mim: mensagem.key.from_me,
        timestamp: Utc
            .timestamp_opt(mensagem.message_timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now),
        tipo,
        texto: mensagem.texto_ou_legenda(),
        midia,
        mime: mensagem.mimetype_midia(),
    })
}

/// Converte uma mensagem do webhook da Meta. `token` é o da conexão, usado
/// depois para baixar a mídia pelo media-id.
pub fn normalizar_meta(
    mensagem: &MetaMessage,
    nome_contato: Option<String>,
    token: Option<&str>,
) -> EntradaNormalizada {
    let tipo = match mensagem.tipo.as_str() {
        "text" => TipoMensagem::Texto,
        "image" => TipoMensagem::Imagem,
        "audio" => TipoMensagem::Audio,
        "video" => TipoMensagem::Video,
        "document" => TipoMensagem::Documento,
        "sticker" => TipoMensagem::Sticker,
        _ => TipoMensagem::Texto,
    };

    let midia = match (mensagem.media_id(), token) {
        (Some(media_id), Some(token)) => Some(RefMidia::Meta {
            media_id: media_id.to_string(),
            token: token.to_string(),
        }),
        _ => None,
    };

    let texto = mensagem
        .text
        .as_ref()
        .map(|t| t.body.clone())
        .or_else(|| mensagem.legenda().map(|l| l.to_string()));

    let timestamp = mensagem
        .timestamp
        .parse::<i64>()
        .ok()
        .and_then(|segundos| Utc.timestamp_opt(segundos, 0).single())
        .unwrap_or_else(Utc::now);

    let mime = [
        &mensagem.image,
        &mensagem.audio,
        &mensagem.video,
        &mensagem.document,
        &mensagem.sticker,
    ]
    .into_iter()
    .flatten()
    .find_map(|m| m.mime_type.clone());

    EntradaNormalizada {
        provider_message_id: mensagem.id.clone(),
        remetente_jid: mensagem.from.clone(),
        telefone: normalizar_telefone(&mensagem.from),
        nome_exibicao: nome_contato,
        de_mim: false,
        timestamp,
        tipo,
        texto,
        midia,
        mime,
    }
}

#[derive(Clone)]
pub struct Ingestao {
    store: Store,
    midia: MediaPipeline,
    agendador: AgendadorSettings,
}

impl Ingestao {
    pub fn new(store: Store, midia: MediaPipeline, agendador: AgendadorSettings) -> Self {
        Self {
            store,
            midia,
            agendador,
        }
    }

    /// Processa uma entrada normalizada.
    ///
    /// `janela` descarta mensagens antigas e só faz sentido no poll da
    /// Evolution, que devolve histórico; webhook entrega em tempo real e
    /// passa `None`.
    pub async fn ingerir(
        &self,
        conexao: &Conexao,
        entrada: EntradaNormalizada,
        janela: Option<Duration>,
    ) -> ResultadoIngestao {
        if entrada.de_mim {
            return ResultadoIngestao::Ignorada(MotivoDescarte::DeMim);
        }
        if eh_jid_grupo(&entrada.remetente_jid) {
            return ResultadoIngestao::Ignorada(MotivoDescarte::Grupo);
        }
        if let Some(janela) = janela {
            if entrada.timestamp < Utc::now() - janela {
                return ResultadoIngestao::Ignorada(MotivoDescarte::ForaDaJanela);
            }
        }

        // Camada 1: marcador de evento já processado no tenant. A chave é o
        // tenant, não a conexão: reprovisionar a conexão não reabre o ledger.
        if self
            .store
            .marcador_existe(conexao.tenant_id, &entrada.provider_message_id)
            .await
        {
            log_evento_duplicado(&entrada.provider_message_id, "marcador");
            return ResultadoIngestao::Ignorada(MotivoDescarte::Duplicada);
        }

        // Camada 2: mensagem persistida com o mesmo id do provedor
        if self
            .store
            .mensagem_com_provider_id(conexao.tenant_id, &entrada.provider_message_id)
            .await
            .is_some()
        {
            log_evento_duplicado(&entrada.provider_message_id, "provider_id");
            self.store
                .registrar_marcador(conexao.tenant_id, &entrada.provider_message_id)
                .await;
            return ResultadoIngestao::Ignorada(MotivoDescarte::Duplicada);
        }

        let contato = match self
            .store
            .contato_por_telefone(conexao.tenant_id, &entrada.telefone)
            .await
        {
            Some(contato) => contato,
            None => {
                let nome = entrada
                    .nome_exibicao
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| entrada.telefone.clone());
                self.store
                    .criar_contato(conexao.tenant_id, entrada.telefone.clone(), nome, conexao.provedor)
                    .await
            }
        };

        // Camada 3: texto idêntico do mesmo contato dentro da janela curta.
        // Pega retransmissão do provedor que chega com id novo.
        if entrada.tipo == TipoMensagem::Texto {
            if let Some(texto) = &entrada.texto {
                let janela_texto =
                    Duration::minutes(self.agendador.janela_dedup_texto_minutos);
                if self
                    .store
                    .existe_texto_recente(conexao.tenant_id, contato.id, texto, janela_texto)
                    .await
                {
                    log_evento_duplicado(&entrada.provider_message_id, "texto_recente");
                    self.store
                        .registrar_marcador(conexao.tenant_id, &entrada.provider_message_id)
                        .await;
                    return ResultadoIngestao::Ignorada(MotivoDescarte::Duplicada);
                }
            }
        }

        // A conversa é por canal: WhatsApp e Instagram do mesmo contato não
        // se misturam, e a resposta sai pela conexão que abriu a conversa
        let conversa = match self
            .store
            .conversa_ativa_do_contato(contato.id, conexao.provedor)
            .await
        {
            Some(conversa) => conversa,
            None => {
                let agente = self.store.agente_principal(conexao.tenant_id).await;
                self.store
                    .criar_conversa(
                        conexao.tenant_id,
                        contato.id,
                        conexao.id,
                        conexao.provedor,
                        agente.map(|a| a.id),
                    )
                    .await
            }
        };

        let mut metadata = json!({ "provider_message_id": entrada.provider_message_id });
        let mut media_url = None;
        let mut conteudo = entrada.texto.clone().unwrap_or_default();

        if let Some(referencia) = &entrada.midia {
            let processada = self
                .midia
                .processar(
                    conexao.provedor,
                    &conexao.instancia,
                    referencia,
                    entrada.mime.as_deref(),
                )
                .await;
            media_url = processada.url;
            if let Some(transcricao) = &processada.transcricao {
                metadata["transcricao"] = json!(transcricao);
            }
            if let Some(descricao) = &processada.descricao {
                metadata["descricao_imagem"] = json!(descricao);
            }
            if conteudo.is_empty() {
                conteudo = placeholder_midia(&entrada.tipo).to_string();
            }
        }

        let mensagem = Mensagem {
            id: Uuid::new_v4(),
            tenant_id: conexao.tenant_id,
            conversa_id: conversa.id,
            contato_id: contato.id,
            conteudo: conteudo.clone(),
            direcao: Direcao::Entrada,
            tipo: entrada.tipo,
            media_url,
            metadata,
            enviada_por_ia: false,
            apagada: false,
            apagada_em: None,
            criado_em: entrada.timestamp,
        };
        let mensagem_id = mensagem.id;

        self.store.inserir_mensagem(mensagem).await;
        self.store
            .registrar_marcador(conexao.tenant_id, &entrada.provider_message_id)
            .await;
        self.store
            .atualizar_snapshot_conversa(conversa.id, &conteudo, entrada.timestamp, Direcao::Entrada)
            .await;
        log_mensagem_recebida(&contato.nome, &conteudo);

        if conversa.ia_ativa {
            let espera = match conversa.agente_ia_id {
                Some(agente_id) => self
                    .store
                    .agente(agente_id)
                    .await
                    .and_then(|a| a.espera_segundos)
                    .unwrap_or(self.agendador.espera_padrao_segundos),
                None => self.agendador.espera_padrao_segundos,
            };
            let dispara_em = Utc::now() + Duration::seconds(espera);
            self.store.upsert_slot(conversa.id, dispara_em).await;
            log_resposta_agendada(&conversa.id.to_string(), &dispara_em.to_rfc3339());
        }

        ResultadoIngestao::Processada(mensagem_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provedores::{EvolutionClient, MetaClient, TipoProvedor};

    fn ingestao(store: Store) -> Ingestao {
        // Pipeline apontando para lugar nenhum; os testes só usam texto
        let evolution = EvolutionClient::new("http://localhost:1", "x").unwrap();
        let meta = MetaClient::new("http://localhost:1").unwrap();
        let midia = MediaPipeline::new(evolution, meta, None);
        Ingestao::new(store, midia, AgendadorSettings::default())
    }

    fn conexao_de(tenant_id: Uuid, provedor: TipoProvedor) -> Conexao {
        Conexao {
            id: Uuid::new_v4(),
            tenant_id,
            provedor,
            instancia: "inst1".into(),
            token: None,
            telefone_id: None,
            verify_token: None,
            status: StatusConexao::Connected,
        }
    }

    fn conexao_teste() -> Conexao {
        conexao_de(Uuid::new_v4(), TipoProvedor::Evolution)
    }

    fn entrada_texto(id: &str, texto: &str) -> EntradaNormalizada {
        EntradaNormalizada {
            provider_message_id: id.to_string(),
            remetente_jid: "5511999999999@s.whatsapp.net".into(),
            telefone: "5511999999999".into(),
            nome_exibicao: Some("Maria".into()),
            de_mim: false,
            timestamp: Utc::now(),
            tipo: TipoMensagem::Texto,
            texto: Some(texto.to_string()),
            midia: None,
            mime: None,
        }
    }

    #[tokio::test]
    async fn mesma_mensagem_duas_vezes_so_processa_uma() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let conexao = conexao_teste();

        let primeira = ingestao
            .ingerir(&conexao, entrada_texto("A1", "Oi"), None)
            .await;
        let segunda = ingestao
            .ingerir(&conexao, entrada_texto("A1", "Oi"), None)
            .await;

        assert!(matches!(primeira, ResultadoIngestao::Processada(_)));
        assert_eq!(
            segunda,
            ResultadoIngestao::Ignorada(MotivoDescarte::Duplicada)
        );
    }

    #[tokio::test]
    async fn texto_identico_com_id_novo_e_descartado() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let conexao = conexao_teste();

        ingestao
            .ingerir(&conexao, entrada_texto("A1", "Bom dia"), None)
            .await;
        let retransmitida = ingestao
            .ingerir(&conexao, entrada_texto("A2", "Bom dia"), None)
            .await;

        assert_eq!(
            retransmitida,
            ResultadoIngestao::Ignorada(MotivoDescarte::Duplicada)
        );
    }

    #[tokio::test]
    async fn mensagem_propria_e_de_grupo_sao_ignoradas() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let conexao = conexao_teste();

        let mut propria = entrada_texto("A1", "Eu mesmo");
        propria.de_mim = true;
        assert_eq!(
            ingestao.ingerir(&conexao, propria, None).await,
            ResultadoIngestao::Ignorada(MotivoDescarte::DeMim)
        );

        let mut grupo = entrada_texto("A2", "No grupo");
        grupo.remetente_jid = "120363041234567890@g.us".into();
        assert_eq!(
            ingestao.ingerir(&conexao, grupo, None).await,
            ResultadoIngestao::Ignorada(MotivoDescarte::Grupo)
        );
    }

    #[tokio::test]
    async fn mensagem_velha_cai_fora_da_janela_do_poll() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let conexao = conexao_teste();

        let mut antiga = entrada_texto("A1", "Mensagem de ontem");
        antiga.timestamp = Utc::now() - Duration::hours(20);

        assert_eq!(
            ingestao
                .ingerir(&conexao, antiga.clone(), Some(Duration::minutes(10)))
                .await,
            ResultadoIngestao::Ignorada(MotivoDescarte::ForaDaJanela)
        );
        // Sem janela (webhook), a mesma mensagem entra
        assert!(matches!(
            ingestao.ingerir(&conexao, antiga, None).await,
            ResultadoIngestao::Processada(_)
        ));
    }

    #[tokio::test]
    async fn rajada_de_mensagens_agenda_um_slot_so() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let conexao = conexao_teste();

        ingestao
            .ingerir(&conexao, entrada_texto("A1", "Oi"), None)
            .await;
        ingestao
            .ingerir(&conexao, entrada_texto("A2", "Tem esse produto?"), None)
            .await;
        let ultima = ingestao
            .ingerir(&conexao, entrada_texto("A3", "O azul"), None)
            .await;

        let mensagem_id = match ultima {
            ResultadoIngestao::Processada(id) => id,
            outro => panic!("esperava processada, veio {:?}", outro),
        };
        let _ = mensagem_id;

        // Um único slot, reagendado pela última mensagem
        let devidos = store
            .slots_devidos(Utc::now() + Duration::seconds(30))
            .await;
        assert_eq!(devidos.len(), 1);
        let espera_esperada = Utc::now()
            + Duration::seconds(AgendadorSettings::default().espera_padrao_segundos);
        let diferenca = (devidos[0].dispara_em - espera_esperada).num_seconds().abs();
        assert!(diferenca <= 1);
    }

    #[tokio::test]
    async fn contato_novo_ganha_nome_do_push_name() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let conexao = conexao_teste();

        ingestao
            .ingerir(&conexao, entrada_texto("A1", "Oi"), None)
            .await;

        let contato = store
            .contato_por_telefone(conexao.tenant_id, "5511999999999")
            .await
            .unwrap();
        assert_eq!(contato.nome, "Maria");

        let conversa = store
            .conversa_ativa_do_contato(contato.id, TipoProvedor::Evolution)
            .await
            .unwrap();
        assert_eq!(conversa.status, StatusConversa::EmAtendimento);
        assert!(conversa.ia_ativa);
    }

    #[tokio::test]
    async fn canais_diferentes_abrem_conversas_separadas() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let tenant = Uuid::new_v4();
        let whatsapp = conexao_de(tenant, TipoProvedor::Evolution);
        let mut meta = conexao_de(tenant, TipoProvedor::Meta);
        meta.token = Some("token".into());
        store.inserir_conexao(whatsapp.clone()).await;
        store.inserir_conexao(meta.clone()).await;

        ingestao
            .ingerir(&whatsapp, entrada_texto("W1", "Oi pelo WhatsApp"), None)
            .await;
        ingestao
            .ingerir(&meta, entrada_texto("M1", "Oi pelo app oficial"), None)
            .await;

        let contato = store
            .contato_por_telefone(tenant, "5511999999999")
            .await
            .unwrap();
        let conversa_whatsapp = store
            .conversa_ativa_do_contato(contato.id, TipoProvedor::Evolution)
            .await
            .unwrap();
        let conversa_meta = store
            .conversa_ativa_do_contato(contato.id, TipoProvedor::Meta)
            .await
            .unwrap();

        // Cada canal tem a sua conversa, presa à conexão que a abriu: a
        // resposta volta pelo canal em que o cliente falou
        assert_ne!(conversa_whatsapp.id, conversa_meta.id);
        assert_eq!(conversa_whatsapp.conexao_id, whatsapp.id);
        assert_eq!(conversa_meta.conexao_id, meta.id);
        assert_eq!(
            store.mensagens_da_conversa(conversa_whatsapp.id).await.len(),
            1
        );
        assert_eq!(store.mensagens_da_conversa(conversa_meta.id).await.len(), 1);
    }

    #[tokio::test]
    async fn marcador_sobrevive_a_reprovisao_da_conexao() {
        let store = Store::new();
        let ingestao = ingestao(store.clone());
        let tenant = Uuid::new_v4();
        let original = conexao_de(tenant, TipoProvedor::Evolution);

        ingestao
            .ingerir(&original, entrada_texto("A1", "Oi"), None)
            .await;

        // O ledger é do tenant, não da conexão que recebeu o evento
        assert!(store.marcador_existe(tenant, "A1").await);

        // Conexão apagada e recriada: id novo, mesmo tenant
        let recriada = conexao_de(tenant, TipoProvedor::Evolution);
        assert_eq!(
            ingestao
                .ingerir(&recriada, entrada_texto("A1", "Oi"), None)
                .await,
            ResultadoIngestao::Ignorada(MotivoDescarte::Duplicada)
        );
    }
}
