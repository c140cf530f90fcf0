//! Roteador de envio de mensagens de saída.
//!
//! Decide o adaptador pelo provedor da conexão e cuida das diferenças de
//! semântica: a Evolution aceita URL externa direto, a Meta exige upload
//! prévio para obter media-id, e Instagram sem credencial de plataforma cai
//! para a ponte Evolution.

use crate::models::*;
use crate::storage::Store;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::{log_provedor_erro, log_resposta_enviada};
use crate::services::fragmentador::fragmentar;
use provedores::{
    EvolutionClient, InstagramClient, MetaClient, ProviderError, ResultadoEnvio, TipoEnvio,
    TipoProvedor,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Um envio avulso, pedido pela API ou pelo agendador
#[derive(Debug, Clone)]
pub struct PedidoEnvio {
    pub conexao_id: Uuid,
    pub destinatario: String,
    pub conteudo: String,
    pub tipo: TipoEnvio,
    pub media_url: Option<String>,
}

#[derive(Clone)]
pub struct RoteadorEnvio {
    store: Store,
    evolution: EvolutionClient,
    meta: MetaClient,
    instagram: InstagramClient,
    http_client: reqwest::Client,
}

impl RoteadorEnvio {
    pub fn new(
        store: Store,
        evolution: EvolutionClient,
        meta: MetaClient,
        instagram: InstagramClient,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            store,
            evolution,
            meta,
            instagram,
            http_client,
        }
    }

    /// Envia pela conexão, sem persistir nada. Falha de provedor registra
    /// atividade no tenant antes de propagar.
    pub async fn enviar_direto(&self, pedido: &PedidoEnvio) -> AppResult<ResultadoEnvio> {
        let conexao = self
            .store
            .conexao(pedido.conexao_id)
            .await
            .ok_or_else(|| AppError::NaoEncontrado(format!("conexão {}", pedido.conexao_id)))?;

        let resultado = match conexao.provedor {
            TipoProvedor::Evolution => self.enviar_evolution(&conexao, pedido).await,
            TipoProvedor::Meta => self.enviar_meta(&conexao, pedido).await,
            TipoProvedor::Instagram => self.enviar_instagram(&conexao, pedido).await,
        };

        match resultado {
            Ok(resultado) => Ok(resultado),
            Err(erro) => {
                log_provedor_erro(&conexao.provedor.to_string(), erro.status(), &erro.to_string());
                self.store
                    .registrar_atividade(
                        conexao.tenant_id,
                        "falha_envio",
                        json!({
                            "conexao_id": conexao.id,
                            "provedor": conexao.provedor.to_string(),
                            "destinatario": pedido.destinatario,
                            "erro": erro.to_string(),
                        }),
                    )
                    .await;
                Err(erro.into())
            }
        }
    }

    async fn enviar_evolution(
        &self,
        conexao: &Conexao,
        pedido: &PedidoEnvio,
    ) -> Result<ResultadoEnvio, ProviderError> {
        match pedido.tipo {
            TipoEnvio::Texto => {
                self.evolution
                    .enviar_texto(&conexao.instancia, &pedido.destinatario, &pedido.conteudo)
                    .await
            }
            TipoEnvio::Audio => {
                let url = media_url_obrigatoria(pedido)?;
                self.evolution
                    .enviar_audio(&conexao.instancia, &pedido.destinatario, url)
                    .await
            }
            TipoEnvio::Imagem => {
                let url = media_url_obrigatoria(pedido)?;
                let legenda = legenda_opcional(pedido);
                self.evolution
                    .enviar_midia(
                        &conexao.instancia,
                        &pedido.destinatario,
                        "image",
                        url,
                        legenda,
                        None,
                    )
                    .await
            }
            TipoEnvio::Documento => {
                let url = media_url_obrigatoria(pedido)?;
                let nome = url.rsplit('/').next().filter(|n| !n.is_empty());
                self.evolution
                    .enviar_midia(
                        &conexao.instancia,
                        &pedido.destinatario,
                        "document",
                        url,
                        None,
                        nome,
                    )
                    .await
            }
        }
    }

    async fn enviar_meta(
        &self,
        conexao: &Conexao,
        pedido: &PedidoEnvio,
    ) -> Result<ResultadoEnvio, ProviderError> {
        let token = conexao
            .token
            .as_deref()
            .ok_or_else(|| ProviderError::Config("conexão Meta sem token".to_string()))?;
        let telefone_id = conexao.telefone_id.as_deref().ok_or_else(|| {
            ProviderError::Config("conexão Meta sem phone_number_id".to_string())
        })?;

        match pedido.tipo {
            TipoEnvio::Texto => {
                self.meta
                    .enviar_texto(token, telefone_id, &pedido.destinatario, &pedido.conteudo)
                    .await
            }
            TipoEnvio::Imagem => {
                let media_id = self.subir_para_meta(token, telefone_id, pedido).await?;
                self.meta
                    .enviar_imagem(
                        token,
                        telefone_id,
                        &pedido.destinatario,
                        &media_id,
                        legenda_opcional(pedido),
                    )
                    .await
            }
            TipoEnvio::Audio => {
                let media_id = self.subir_para_meta(token, telefone_id, pedido).await?;
                self.meta
                    .enviar_audio(token, telefone_id, &pedido.destinatario, &media_id)
                    .await
            }
            TipoEnvio::Documento => {
                let url = media_url_obrigatoria(pedido)?;
                let nome = url.rsplit('/').next().filter(|n| !n.is_empty());
                let media_id = self.subir_para_meta(token, telefone_id, pedido).await?;
                self.meta
                    .enviar_documento(token, telefone_id, &pedido.destinatario, &media_id, nome)
                    .await
            }
        }
    }

    async fn enviar_instagram(
        &self,
        conexao: &Conexao,
        pedido: &PedidoEnvio,
    ) -> Result<ResultadoEnvio, ProviderError> {
        // Conexão de Instagram sem credencial de plataforma usa a ponte
        // Evolution, que também fala com o Instagram da conta conectada
        let (Some(token), Some(page_id)) =
            (conexao.token.as_deref(), conexao.telefone_id.as_deref())
        else {
            return self.enviar_evolution(conexao, pedido).await;
        };

        match pedido.tipo {
            TipoEnvio::Texto => {
                self.instagram
                    .enviar_texto(token, page_id, &pedido.destinatario, &pedido.conteudo)
                    .await
            }
            outro => {
                let url = media_url_obrigatoria(pedido)?;
                self.instagram
                    .enviar_anexo(token, page_id, &pedido.destinatario, outro, url)
                    .await
            }
        }
    }

    /// Baixa os bytes da URL e sobe para o endpoint de mídia da conexão
    async fn subir_para_meta(
        &self,
        token: &str,
        telefone_id: &str,
        pedido: &PedidoEnvio,
    ) -> Result<String, ProviderError> {
        let url = media_url_obrigatoria(pedido)?;
        let resposta = self.http_client.get(url).send().await?;
        let status = resposta.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ProviderError::Api {
                status,
                body: format!("falha ao buscar mídia em {}", url),
            });
        }
        let mime = resposta
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resposta.bytes().await?.to_vec();
        let nome = url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("arquivo");

        self.meta
            .subir_midia(token, telefone_id, bytes, &mime, nome)
            .await
    }

    /// Envia uma resposta dentro de uma conversa, fragmentando conforme o
    /// agente e persistindo cada fragmento como mensagem de saída.
    ///
    /// Falha no meio deixa os fragmentos já entregues persistidos; o erro
    /// sobe para o chamador decidir.
    pub async fn responder_conversa(
        &self,
        conversa: &Conversa,
        resposta: &str,
        enviada_por_ia: bool,
    ) -> AppResult<usize> {
        let conexao = self
            .store
            .conexao(conversa.conexao_id)
            .await
            .ok_or_else(|| AppError::NaoEncontrado(format!("conexão {}", conversa.conexao_id)))?;
        let contato = self
            .store
            .contato(conversa.contato_id)
            .await
            .ok_or_else(|| AppError::NaoEncontrado(format!("contato {}", conversa.contato_id)))?;

        let agente = match conversa.agente_ia_id {
            Some(id) => self.store.agente(id).await,
            None => None,
        };

        let fragmentos: Vec<String> = match &agente {
            Some(agente) if agente.fragmentar_mensagens => {
                fragmentar(resposta, agente.tamanho_max_fragmento)
            }
            _ => vec![resposta.to_string()],
        };
        let fragmentos: Vec<&str> = fragmentos
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();

        let simular_digitacao = agente
            .as_ref()
            .map(|a| a.simular_digitacao)
            .unwrap_or(false)
            && conexao.provedor == TipoProvedor::Evolution;
        let intervalo_ms = agente
            .as_ref()
            .map(|a| a.intervalo_fragmentos_ms)
            .unwrap_or(0);

        let total = fragmentos.len();
        for (indice, fragmento) in fragmentos.iter().enumerate() {
            if simular_digitacao {
                let duracao_ms = (fragmento.chars().count() as u64 * 40).clamp(1000, 3000);
                if let Err(erro) = self
                    .evolution
                    .marcar_digitando(&conexao.instancia, &contato.telefone, duracao_ms)
                    .await
                {
                    // Presença é cosmética; o envio segue mesmo sem ela
                    tracing::warn!("Falha ao sinalizar digitação: {}", erro);
                }
                tokio::time::sleep(Duration::from_millis(duracao_ms)).await;
            }

            let pedido = PedidoEnvio {
                conexao_id: conexao.id,
                destinatario: contato.telefone.clone(),
                conteudo: fragmento.to_string(),
                tipo: TipoEnvio::Texto,
                media_url: None,
            };
            let resultado = self.enviar_direto(&pedido).await?;

            let agora = chrono::Utc::now();
            let mut metadata = json!({});
            if let Some(pmid) = &resultado.provider_message_id {
                metadata["provider_message_id"] = json!(pmid);
            }
            let mensagem = Mensagem {
                id: Uuid::new_v4(),
                tenant_id: conversa.tenant_id,
                conversa_id: conversa.id,
                contato_id: contato.id,
                conteudo: fragmento.to_string(),
                direcao: Direcao::Saida,
                tipo: TipoMensagem::Texto,
                media_url: None,
                metadata,
                enviada_por_ia,
                apagada: false,
                apagada_em: None,
                criado_em: agora,
            };
            self.store.inserir_mensagem(mensagem).await;
            self.store
                .atualizar_snapshot_conversa(conversa.id, fragmento, agora, Direcao::Saida)
                .await;

            if indice + 1 < total && intervalo_ms > 0 {
                tokio::time::sleep(Duration::from_millis(intervalo_ms)).await;
            }
        }

        self.store
            .definir_status_conversa(conversa.id, StatusConversa::AguardandoCliente)
            .await;
        log_resposta_enviada(&conversa.id.to_string(), total);
        Ok(total)
    }
}

fn media_url_obrigatoria(pedido: &PedidoEnvio) -> Result<&str, ProviderError> {
    pedido
        .media_url
        .as_deref()
        .ok_or_else(|| ProviderError::Config("envio de mídia sem media_url".to_string()))
}

fn legenda_opcional(pedido: &PedidoEnvio) -> Option<&str> {
    if pedido.conteudo.trim().is_empty() {
        None
    } else {
        Some(pedido.conteudo.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    async fn roteador(servidor: &MockServer, store: Store) -> RoteadorEnvio {
        let evolution = EvolutionClient::new(servidor.base_url(), "chave").unwrap();
        let meta = MetaClient::new(servidor.base_url()).unwrap();
        let instagram = InstagramClient::new(servidor.base_url()).unwrap();
        RoteadorEnvio::new(store, evolution, meta, instagram)
    }

    async fn conexao(store: &Store, provedor: TipoProvedor, token: Option<&str>) -> Conexao {
        let conexao = Conexao {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            provedor,
            instancia: "inst1".into(),
            token: token.map(|t| t.to_string()),
            telefone_id: token.map(|_| "123456".to_string()),
            verify_token: None,
            status: StatusConexao::Connected,
        };
        store.inserir_conexao(conexao.clone()).await;
        conexao
    }

    #[tokio::test]
    async fn evolution_envia_imagem_sem_upload() {
        let servidor = MockServer::start_async().await;
        let envio = servidor
            .mock_async(|when, then| {
                when.method(POST).path("/message/sendMedia/inst1");
                then.status(201)
                    .json_body(serde_json::json!({ "key": { "id": "MSG9" } }));
            })
            .await;

        let store = Store::new();
        let conexao = conexao(&store, TipoProvedor::Evolution, None).await;
        let roteador = roteador(&servidor, store).await;

        let resultado = roteador
            .enviar_direto(&PedidoEnvio {
                conexao_id: conexao.id,
                destinatario: "5511999999999".into(),
                conteudo: "legenda".into(),
                tipo: TipoEnvio::Imagem,
                media_url: Some("https://cdn.example.com/foto.jpg".into()),
            })
            .await
            .unwrap();

        envio.assert_async().await;
        assert_eq!(resultado.provider_message_id.as_deref(), Some("MSG9"));
    }

    #[tokio::test]
    async fn meta_sobe_a_midia_antes_de_enviar() {
        let servidor = MockServer::start_async().await;
        servidor
            .mock_async(|when, then| {
                when.method(GET).path("/blob/foto.jpg");
                then.status(200)
                    .header("content-type", "image/jpeg")
                    .body(vec![0xFF, 0xD8, 0xFF]);
            })
            .await;
        let upload = servidor
            .mock_async(|when, then| {
                when.method(POST).path("/123456/media");
                then.status(200).json_body(serde_json::json!({ "id": "MEDIA7" }));
            })
            .await;
        let envio = servidor
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/123456/messages")
                    .json_body_partial(r#"{ "type": "image", "image": { "id": "MEDIA7" } }"#);
                then.status(200).json_body(serde_json::json!({
                    "messages": [ { "id": "wamid.Z" } ]
                }));
            })
            .await;

        let store = Store::new();
        let conexao = conexao(&store, TipoProvedor::Meta, Some("token")).await;
        let roteador = roteador(&servidor, store).await;

        let resultado = roteador
            .enviar_direto(&PedidoEnvio {
                conexao_id: conexao.id,
                destinatario: "5511999999999".into(),
                conteudo: String::new(),
                tipo: TipoEnvio::Imagem,
                media_url: Some(format!("{}/blob/foto.jpg", servidor.base_url())),
            })
            .await
            .unwrap();

        upload.assert_hits_async(1).await;
        envio.assert_async().await;
        assert_eq!(resultado.provider_message_id.as_deref(), Some("wamid.Z"));
    }

    #[tokio::test]
    async fn instagram_sem_token_cai_para_evolution() {
        let servidor = MockServer::start_async().await;
        let envio = servidor
            .mock_async(|when, then| {
                when.method(POST).path("/message/sendText/inst1");
                then.status(201)
                    .json_body(serde_json::json!({ "key": { "id": "MSG2" } }));
            })
            .await;

        let store = Store::new();
        let conexao = conexao(&store, TipoProvedor::Instagram, None).await;
        let roteador = roteador(&servidor, store).await;

        roteador
            .enviar_direto(&PedidoEnvio {
                conexao_id: conexao.id,
                destinatario: "5511999999999".into(),
                conteudo: "Oi".into(),
                tipo: TipoEnvio::Texto,
                media_url: None,
            })
            .await
            .unwrap();

        envio.assert_async().await;
    }

    #[tokio::test]
    async fn falha_de_envio_registra_atividade() {
        let servidor = MockServer::start_async().await;
        servidor
            .mock_async(|when, then| {
                when.method(POST).path("/message/sendText/inst1");
                then.status(500).json_body(serde_json::json!({ "error": "boom" }));
            })
            .await;

        let store = Store::new();
        let conexao = conexao(&store, TipoProvedor::Evolution, None).await;
        let roteador = roteador(&servidor, store.clone()).await;

        let erro = roteador
            .enviar_direto(&PedidoEnvio {
                conexao_id: conexao.id,
                destinatario: "5511999999999".into(),
                conteudo: "Oi".into(),
                tipo: TipoEnvio::Texto,
                media_url: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(erro, AppError::Provedor { .. }));
        let atividades = store.atividades_do_tenant(conexao.tenant_id).await;
        assert_eq!(atividades.len(), 1);
        assert_eq!(atividades[0].acao, "falha_envio");
    }

    #[tokio::test]
    async fn resposta_fragmentada_persiste_cada_fragmento() {
        let servidor = MockServer::start_async().await;
        let envio = servidor
            .mock_async(|when, then| {
                when.method(POST).path("/message/sendText/inst1");
                then.status(201)
                    .json_body(serde_json::json!({ "key": { "id": "MSG3" } }));
            })
            .await;

        let store = Store::new();
        let conexao = conexao(&store, TipoProvedor::Evolution, None).await;
        let contato = store
            .criar_contato(
                conexao.tenant_id,
                "5511999999999".into(),
                "Maria".into(),
                TipoProvedor::Evolution,
            )
            .await;
        let agente = AgenteIa {
            id: Uuid::new_v4(),
            tenant_id: conexao.tenant_id,
            nome: "Atendente".into(),
            principal: true,
            ativo: true,
            espera_segundos: Some(1),
            fragmentar_mensagens: true,
            tamanho_max_fragmento: 60,
            intervalo_fragmentos_ms: 0,
            simular_digitacao: false,
        };
        store.inserir_agente(agente.clone()).await;
        let conversa = store
            .criar_conversa(
                conexao.tenant_id,
                contato.id,
                conexao.id,
                TipoProvedor::Evolution,
                Some(agente.id),
            )
            .await;

        let roteador = roteador(&servidor, store.clone()).await;
        let resposta = "Temos sim! O modelo azul está disponível. \
                        Posso separar uma unidade para você retirar hoje. \
                        Qual o melhor horário?";
        let enviados = roteador
            .responder_conversa(&conversa, resposta, true)
            .await
            .unwrap();

        assert!(enviados >= 2);
        envio.assert_hits_async(enviados).await;

        let mensagens = store.mensagens_da_conversa(conversa.id).await;
        assert_eq!(mensagens.len(), enviados);
        assert!(mensagens.iter().all(|m| m.direcao == Direcao::Saida));
        assert!(mensagens.iter().all(|m| m.enviada_por_ia));

        let conversa = store.conversa(conversa.id).await.unwrap();
        assert_eq!(conversa.status, StatusConversa::AguardandoCliente);
    }
}
