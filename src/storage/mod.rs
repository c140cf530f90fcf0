//! Armazenamento em memória do serviço.
//!
//! Cada método equivale a um comando lógico de banco; a troca por Postgres
//! mantém a assinatura e move o lock para a transação. O ponto delicado é
//! `try_adquirir_slot`: a aquisição do slot de resposta é um
//! compare-and-set feito sob o lock de escrita, então dois workers nunca
//! processam a mesma conversa ao mesmo tempo.

use crate::models::*;
use chrono::{DateTime, Duration, Utc};
use provedores::TipoProvedor;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct Store {
    contatos: Arc<RwLock<HashMap<Uuid, Contato>>>,
    conversas: Arc<RwLock<HashMap<Uuid, Conversa>>>,
    mensagens: Arc<RwLock<Vec<Mensagem>>>,
    conexoes: Arc<RwLock<HashMap<Uuid, Conexao>>>,
    /// Marcadores de evento processado: (tenant, provider_message_id).
    /// Chaveado pelo tenant para sobreviver à troca de conexão e à remoção
    /// do contato que originou a mensagem.
    marcadores: Arc<RwLock<HashSet<(Uuid, String)>>>,
    slots: Arc<RwLock<HashMap<Uuid, SlotResposta>>>,
    agentes: Arc<RwLock<HashMap<Uuid, AgenteIa>>>,
    atividades: Arc<RwLock<Vec<Atividade>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- conexões ----

    pub async fn inserir_conexao(&self, conexao: Conexao) {
        self.conexoes.write().await.insert(conexao.id, conexao);
    }

    pub async fn conexao(&self, id: Uuid) -> Option<Conexao> {
        self.conexoes.read().await.get(&id).cloned()
    }

    pub async fn todas_conexoes(&self) -> Vec<Conexao> {
        self.conexoes.read().await.values().cloned().collect()
    }

    pub async fn conexao_por_verify_token(&self, verify_token: &str) -> Option<Conexao> {
        self.conexoes
            .read()
            .await
            .values()
            .find(|c| c.verify_token.as_deref() == Some(verify_token))
            .cloned()
    }

    pub async fn conexao_por_telefone_id(&self, telefone_id: &str) -> Option<Conexao> {
        self.conexoes
            .read()
            .await
            .values()
            .find(|c| c.telefone_id.as_deref() == Some(telefone_id))
            .cloned()
    }

    pub async fn atualizar_status_conexao(&self, id: Uuid, status: StatusConexao) {
        if let Some(conexao) = self.conexoes.write().await.get_mut(&id) {
            conexao.status = status;
        }
    }

    // ---- contatos ----

    pub async fn contato(&self, id: Uuid) -> Option<Contato> {
        self.contatos.read().await.get(&id).cloned()
    }

    pub async fn contato_por_telefone(
        &self,
        tenant_id: Uuid,
        telefone: &str,
    ) -> Option<Contato> {
        self.contatos
            .read()
            .await
            .values()
            .find(|c| c.tenant_id == tenant_id && c.telefone == telefone)
            .cloned()
    }

    pub async fn criar_contato(
        &self,
        tenant_id: Uuid,
        telefone: String,
        nome: String,
        canal: TipoProvedor,
    ) -> Contato {
        let contato = Contato {
            id: Uuid::new_v4(),
            tenant_id,
            telefone,
            nome,
            canal,
            tags: Vec::new(),
            criado_em: Utc::now(),
        };
        self.contatos
            .write()
            .await
            .insert(contato.id, contato.clone());
        contato
    }

    // ---- conversas ----

    /// Conversa não-arquivada e não-encerrada do contato naquele canal, se
    /// existir. O canal faz parte da chave: o mesmo contato pode ter uma
    /// conversa de WhatsApp e outra de Instagram abertas ao mesmo tempo.
    pub async fn conversa_ativa_do_contato(
        &self,
        contato_id: Uuid,
        canal: TipoProvedor,
    ) -> Option<Conversa> {
        self.conversas
            .read()
            .await
            .values()
            .find(|c| {
                c.contato_id == contato_id
                    && c.canal == canal
                    && !c.arquivada
                    && c.status != StatusConversa::Encerrado
            })
            .cloned()
    }

    pub async fn criar_conversa(
        &self,
        tenant_id: Uuid,
        contato_id: Uuid,
        conexao_id: Uuid,
        canal: TipoProvedor,
        agente_ia_id: Option<Uuid>,
    ) -> Conversa {
        let conversa = Conversa {
            id: Uuid::new_v4(),
            tenant_id,
            contato_id,
            conexao_id,
            canal,
            status: StatusConversa::EmAtendimento,
            ia_ativa: true,
            agente_humano_id: None,
            agente_ia_id,
            etapa_fluxo: None,
            ultima_mensagem: None,
            ultima_mensagem_em: None,
            nao_lidas: 0,
            arquivada: false,
            criado_em: Utc::now(),
        };
        self.conversas
            .write()
            .await
            .insert(conversa.id, conversa.clone());
        conversa
    }

    pub async fn conversa(&self, id: Uuid) -> Option<Conversa> {
        self.conversas.read().await.get(&id).cloned()
    }

    /// Atualiza o snapshot da conversa depois de persistir uma mensagem.
    ///
    /// Mensagem de entrada incrementa não-lidas e volta a conversa para
    /// `em_atendimento`; mensagem de saída não mexe em nenhum dos dois.
    pub async fn atualizar_snapshot_conversa(
        &self,
        conversa_id: Uuid,
        resumo: &str,
        em: DateTime<Utc>,
        direcao: Direcao,
    ) {
        if let Some(conversa) = self.conversas.write().await.get_mut(&conversa_id) {
            conversa.ultima_mensagem = Some(resumo.to_string());
            conversa.ultima_mensagem_em = Some(em);
            if direcao == Direcao::Entrada {
                conversa.nao_lidas += 1;
                conversa.status = StatusConversa::EmAtendimento;
            }
        }
    }

    pub async fn definir_status_conversa(&self, conversa_id: Uuid, status: StatusConversa) {
        if let Some(conversa) = self.conversas.write().await.get_mut(&conversa_id) {
            conversa.status = status;
        }
    }

    pub async fn definir_ia_ativa(&self, conversa_id: Uuid, ia_ativa: bool) {
        if let Some(conversa) = self.conversas.write().await.get_mut(&conversa_id) {
            conversa.ia_ativa = ia_ativa;
        }
    }

    // ---- mensagens ----

    pub async fn inserir_mensagem(&self, mensagem: Mensagem) {
        self.mensagens.write().await.push(mensagem);
    }

    pub async fn mensagem_com_provider_id(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
    ) -> Option<Mensagem> {
        self.mensagens
            .read()
            .await
            .iter()
            .find(|m| {
                m.tenant_id == tenant_id
                    && m.provider_message_id() == Some(provider_message_id)
            })
            .cloned()
    }

    /// Mensagem de entrada com texto idêntico do mesmo contato dentro da
    /// janela. Pega retransmissão do provedor que chega com id novo.
    pub async fn existe_texto_recente(
        &self,
        tenant_id: Uuid,
        contato_id: Uuid,
        conteudo: &str,
        janela: Duration,
    ) -> bool {
        let corte = Utc::now() - janela;
        self.mensagens.read().await.iter().any(|m| {
            m.tenant_id == tenant_id
                && m.contato_id == contato_id
                && m.direcao == Direcao::Entrada
                && m.conteudo == conteudo
                && m.criado_em >= corte
        })
    }

    pub async fn ultima_mensagem_recebida(&self, conversa_id: Uuid) -> Option<Mensagem> {
        self.mensagens
            .read()
            .await
            .iter()
            .filter(|m| m.conversa_id == conversa_id && m.direcao == Direcao::Entrada)
            .max_by_key(|m| m.criado_em)
            .cloned()
    }

    pub async fn mensagens_da_conversa(&self, conversa_id: Uuid) -> Vec<Mensagem> {
        let mut mensagens: Vec<Mensagem> = self
            .mensagens
            .read()
            .await
            .iter()
            .filter(|m| m.conversa_id == conversa_id)
            .cloned()
            .collect();
        mensagens.sort_by_key(|m| m.criado_em);
        mensagens
    }

    pub async fn marcar_apagada(&self, mensagem_id: Uuid) -> bool {
        let mut mensagens = self.mensagens.write().await;
        if let Some(mensagem) = mensagens.iter_mut().find(|m| m.id == mensagem_id) {
            mensagem.apagada = true;
            mensagem.apagada_em = Some(Utc::now());
            return true;
        }
        false
    }

    // ---- marcadores de processamento ----

    pub async fn marcador_existe(&self, tenant_id: Uuid, provider_message_id: &str) -> bool {
        self.marcadores
            .read()
            .await
            .contains(&(tenant_id, provider_message_id.to_string()))
    }

    pub async fn registrar_marcador(&self, tenant_id: Uuid, provider_message_id: &str) {
        self.marcadores
            .write()
            .await
            .insert((tenant_id, provider_message_id.to_string()));
    }

    // ---- slots de resposta ----

    /// Cria ou reagenda o slot da conversa. Cada nova mensagem empurra o
    /// horário de disparo para frente; o flag de processamento é preservado
    /// para não roubar um slot de um worker em voo.
    pub async fn upsert_slot(&self, conversa_id: Uuid, dispara_em: DateTime<Utc>) {
        let mut slots = self.slots.write().await;
        let agora = Utc::now();
        slots
            .entry(conversa_id)
            .and_modify(|slot| {
                slot.dispara_em = dispara_em;
                slot.atualizado_em = agora;
            })
            .or_insert(SlotResposta {
                conversa_id,
                dispara_em,
                em_processamento: false,
                atualizado_em: agora,
            });
    }

    /// Compare-and-set: só retorna o slot se ele existia e NÃO estava em
    /// processamento; o flag vira `true` na mesma escrita.
    pub async fn try_adquirir_slot(&self, conversa_id: Uuid) -> Option<SlotResposta> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(&conversa_id) {
            Some(slot) if !slot.em_processamento => {
                slot.em_processamento = true;
                slot.atualizado_em = Utc::now();
                Some(slot.clone())
            }
            _ => None,
        }
    }

    /// Devolve o slot sem consumi-lo (disparo ainda no futuro)
    pub async fn liberar_slot(&self, conversa_id: Uuid) {
        if let Some(slot) = self.slots.write().await.get_mut(&conversa_id) {
            slot.em_processamento = false;
            slot.atualizado_em = Utc::now();
        }
    }

    pub async fn remover_slot(&self, conversa_id: Uuid) {
        self.slots.write().await.remove(&conversa_id);
    }

    /// Slots cujo horário de disparo já passou e que ninguém está processando
    pub async fn slots_devidos(&self, agora: DateTime<Utc>) -> Vec<SlotResposta> {
        self.slots
            .read()
            .await
            .values()
            .filter(|s| !s.em_processamento && s.dispara_em <= agora)
            .cloned()
            .collect()
    }

    // ---- agentes de IA ----

    pub async fn inserir_agente(&self, agente: AgenteIa) {
        self.agentes.write().await.insert(agente.id, agente);
    }

    pub async fn agente(&self, id: Uuid) -> Option<AgenteIa> {
        self.agentes.read().await.get(&id).cloned()
    }

    pub async fn agente_principal(&self, tenant_id: Uuid) -> Option<AgenteIa> {
        self.agentes
            .read()
            .await
            .values()
            .find(|a| a.tenant_id == tenant_id && a.principal && a.ativo)
            .cloned()
    }

    // ---- atividades ----

    pub async fn registrar_atividade(&self, tenant_id: Uuid, acao: &str, detalhe: Value) {
        self.atividades.write().await.push(Atividade {
            id: Uuid::new_v4(),
            tenant_id,
            acao: acao.to_string(),
            detalhe,
            criado_em: Utc::now(),
        });
    }

    pub async fn atividades_do_tenant(&self, tenant_id: Uuid) -> Vec<Atividade> {
        self.atividades
            .read()
            .await
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aquisicao_de_slot_e_exclusiva() {
        let store = Store::new();
        let conversa_id = Uuid::new_v4();
        store.upsert_slot(conversa_id, Utc::now()).await;

        let primeira = store.try_adquirir_slot(conversa_id).await;
        let segunda = store.try_adquirir_slot(conversa_id).await;

        assert!(primeira.is_some());
        assert!(segunda.is_none());

        store.liberar_slot(conversa_id).await;
        assert!(store.try_adquirir_slot(conversa_id).await.is_some());
    }

    #[tokio::test]
    async fn upsert_reagenda_sem_roubar_slot_em_voo() {
        let store = Store::new();
        let conversa_id = Uuid::new_v4();
        let t1 = Utc::now();
        store.upsert_slot(conversa_id, t1).await;
        store.try_adquirir_slot(conversa_id).await.unwrap();

        // Nova mensagem durante o processamento reagenda mas não libera
        let t2 = t1 + Duration::seconds(8);
        store.upsert_slot(conversa_id, t2).await;

        assert!(store.try_adquirir_slot(conversa_id).await.is_none());
        let slots = store.slots_devidos(t2 + Duration::seconds(1)).await;
        assert!(slots.is_empty());
    }

    #[test]
    fn slot_inexistente_nao_e_adquirido() {
        let store = Store::new();
        assert!(tokio_test::block_on(store.try_adquirir_slot(Uuid::new_v4())).is_none());
    }

    #[tokio::test]
    async fn entrada_incrementa_nao_lidas_e_reabre() {
        let store = Store::new();
        let tenant = Uuid::new_v4();
        let contato = store
            .criar_contato(tenant, "5511999999999".into(), "Maria".into(), TipoProvedor::Evolution)
            .await;
        let conversa = store
            .criar_conversa(tenant, contato.id, Uuid::new_v4(), TipoProvedor::Evolution, None)
            .await;
        store
            .definir_status_conversa(conversa.id, StatusConversa::AguardandoCliente)
            .await;

        store
            .atualizar_snapshot_conversa(conversa.id, "Oi", Utc::now(), Direcao::Entrada)
            .await;

        let conversa = store.conversa(conversa.id).await.unwrap();
        assert_eq!(conversa.nao_lidas, 1);
        assert_eq!(conversa.status, StatusConversa::EmAtendimento);
        assert_eq!(conversa.ultima_mensagem.as_deref(), Some("Oi"));

        store
            .atualizar_snapshot_conversa(conversa.id, "Olá!", Utc::now(), Direcao::Saida)
            .await;
        let conversa = store.conversa(conversa.id).await.unwrap();
        assert_eq!(conversa.nao_lidas, 1);
    }

    #[tokio::test]
    async fn apagar_mensagem_e_soft_delete() {
        let store = Store::new();
        let mensagem = Mensagem {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            conversa_id: Uuid::new_v4(),
            contato_id: Uuid::new_v4(),
            conteudo: "apaga isso".into(),
            direcao: Direcao::Entrada,
            tipo: TipoMensagem::Texto,
            media_url: None,
            metadata: serde_json::json!({}),
            enviada_por_ia: false,
            apagada: false,
            apagada_em: None,
            criado_em: Utc::now(),
        };
        store.inserir_mensagem(mensagem.clone()).await;

        assert!(store.marcar_apagada(mensagem.id).await);
        assert!(!store.marcar_apagada(Uuid::new_v4()).await);

        // O registro continua no histórico, só ganha o flag
        let historico = store.mensagens_da_conversa(mensagem.conversa_id).await;
        assert_eq!(historico.len(), 1);
        assert!(historico[0].apagada);
        assert!(historico[0].apagada_em.is_some());
    }

    #[tokio::test]
    async fn dedup_por_texto_respeita_a_janela() {
        let store = Store::new();
        let tenant = Uuid::new_v4();
        let contato_id = Uuid::new_v4();
        let mut mensagem = Mensagem {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            conversa_id: Uuid::new_v4(),
            contato_id,
            conteudo: "Bom dia".into(),
            direcao: Direcao::Entrada,
            tipo: TipoMensagem::Texto,
            media_url: None,
            metadata: serde_json::json!({}),
            enviada_por_ia: false,
            apagada: false,
            apagada_em: None,
            criado_em: Utc::now() - Duration::minutes(10),
        };
        store.inserir_mensagem(mensagem.clone()).await;

        let janela = Duration::minutes(5);
        assert!(!store.existe_texto_recente(tenant, contato_id, "Bom dia", janela).await);

        mensagem.id = Uuid::new_v4();
        mensagem.criado_em = Utc::now();
        store.inserir_mensagem(mensagem).await;
        assert!(store.existe_texto_recente(tenant, contato_id, "Bom dia", janela).await);
        // Outro contato não colide
        assert!(!store.existe_texto_recente(tenant, Uuid::new_v4(), "Bom dia", janela).await);
    }
}
