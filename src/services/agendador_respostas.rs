//! Agendador de respostas de IA.
//!
//! Um loop de tick varre os slots devidos; cada conversa é processada sob o
//! slot adquirido por CAS, então dois ticks (ou dois réplicas) nunca geram
//! resposta dupla. O slot é removido depois de qualquer tentativa, com ou
//! sem sucesso: a próxima mensagem do cliente cria um novo.

use crate::config::settings::AgendadorSettings;
use crate::services::ia_responder::{IaResponder, PedidoGeracao};
use crate::services::roteador_envio::RoteadorEnvio;
use crate::storage::Store;
use crate::utils::logging::{log_error, log_info};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desfecho {
    /// Outro worker segura o slot, ou o slot não existe mais
    NaoAdquirido,
    /// Disparo ainda no futuro; o slot foi devolvido
    AindaNaoDevido,
    IaDesativada,
    /// O gerador legado já persistiu e enviou por conta própria
    JaPersistida,
    RespostaEnviada,
    SemResposta,
    Falha(String),
}

pub struct AgendadorRespostas {
    store: Store,
    ia: IaResponder,
    roteador: RoteadorEnvio,
    settings: AgendadorSettings,
    rodando: Arc<RwLock<bool>>,
}

impl AgendadorRespostas {
    pub fn new(
        store: Store,
        ia: IaResponder,
        roteador: RoteadorEnvio,
        settings: AgendadorSettings,
    ) -> Self {
        Self {
            store,
            ia,
            roteador,
            settings,
            rodando: Arc::new(RwLock::new(false)),
        }
    }

    /// Tenta adquirir o slot da conversa e gerar a resposta.
    pub async fn adquirir_e_processar(&self, conversa_id: Uuid) -> Desfecho {
        let Some(slot) = self.store.try_adquirir_slot(conversa_id).await else {
            return Desfecho::NaoAdquirido;
        };

        if slot.dispara_em > Utc::now() {
            self.store.liberar_slot(conversa_id).await;
            return Desfecho::AindaNaoDevido;
        }

        // Daqui em diante o slot morre junto com a tentativa
        let desfecho = self.processar(conversa_id).await;
        self.store.remover_slot(conversa_id).await;
        desfecho
    }

    async fn processar(&self, conversa_id: Uuid) -> Desfecho {
        let Some(conversa) = self.store.conversa(conversa_id).await else {
            return Desfecho::Falha(format!("conversa {} não existe mais", conversa_id));
        };
        if !conversa.ia_ativa {
            return Desfecho::IaDesativada;
        }

        let Some(ultima) = self.store.ultima_mensagem_recebida(conversa_id).await else {
            return Desfecho::SemResposta;
        };

        // Áudio responde pela transcrição; imagem manda a descrição à parte
        let texto = ultima
            .metadata
            .get("transcricao")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| ultima.conteudo.clone());
        let descricao_imagem = ultima
            .metadata
            .get("descricao_imagem")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let pedido = PedidoGeracao {
            conversation_id: conversa.id,
            tenant_id: conversa.tenant_id,
            agent_id: conversa.agente_ia_id,
            message: texto,
            message_type: format!("{:?}", ultima.tipo).to_lowercase(),
            image_description: descricao_imagem,
        };

        let resposta = match self.ia.gerar(&pedido).await {
            Ok(resposta) => resposta,
            Err(erro) => {
                log_error(&format!(
                    "Geração de resposta falhou para conversa {}: {}",
                    conversa_id, erro
                ));
                return Desfecho::Falha(erro);
            }
        };

        if resposta.already_persisted {
            return Desfecho::JaPersistida;
        }
        if !resposta.should_respond {
            return Desfecho::SemResposta;
        }
        let Some(reply) = resposta.reply.filter(|r| !r.trim().is_empty()) else {
            return Desfecho::SemResposta;
        };

        match self.roteador.responder_conversa(&conversa, &reply, true).await {
            Ok(_) => Desfecho::RespostaEnviada,
            Err(erro) => Desfecho::Falha(erro.to_string()),
        }
    }

    /// Varre todos os slots devidos uma vez. Retorna (verificados, enviados).
    pub async fn processar_pendentes(&self) -> (usize, usize) {
        let devidos = self.store.slots_devidos(Utc::now()).await;
        let verificados = devidos.len();
        let mut enviados = 0;
        for slot in devidos {
            if self.adquirir_e_processar(slot.conversa_id).await == Desfecho::RespostaEnviada {
                enviados += 1;
            }
        }
        (verificados, enviados)
    }

    /// Sobe o loop de tick em background
    pub async fn iniciar(self: Arc<Self>) {
        {
            let mut rodando = self.rodando.write().await;
            if *rodando {
                return;
            }
            *rodando = true;
        }

        let agendador = self;
        tokio::spawn(async move {
            log_info(&format!(
                "Agendador de respostas ativo (tick de {}s)",
                agendador.settings.tick_seconds
            ));
            let mut intervalo =
                tokio::time::interval(Duration::from_secs(agendador.settings.tick_seconds.max(1)));
            loop {
                intervalo.tick().await;
                if !*agendador.rodando.read().await {
                    log_info("Agendador de respostas encerrado");
                    break;
                }
                let (verificados, enviados) = agendador.processar_pendentes().await;
                if verificados > 0 {
                    log_info(&format!(
                        "Tick do agendador: {} slot(s) devidos, {} resposta(s) enviada(s)",
                        verificados, enviados
                    ));
                }
            }
        });
    }

    pub async fn parar(&self) {
        *self.rodando.write().await = false;
    }
}
