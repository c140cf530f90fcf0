//! Pipeline de mídia recebida: baixa do provedor, sobe para o blob e pede
//! transcrição (áudio) ou descrição (imagem) aos colaboradores.
//!
//! O pipeline nunca derruba a ingestão: qualquer etapa que falhe vira campo
//! ausente e a mensagem segue com o placeholder do tipo.

use crate::config::settings::MidiaSettings;
use crate::utils::logging::log_warning;
use crate::utils::retry::RetryPolicy;
use base64::Engine;
use provedores::{EvolutionClient, MetaClient, TipoProvedor};
use serde_json::json;
use std::time::Duration;

/// Resultado do pipeline para anexar à mensagem
#[derive(Debug, Clone, Default)]
pub struct MidiaProcessada {
    pub url: Option<String>,
    pub transcricao: Option<String>,
    pub descricao: Option<String>,
}

/// Referência à mídia de uma mensagem de entrada, ainda no provedor
#[derive(Debug, Clone)]
pub enum RefMidia {
    /// Evolution baixa pelo id da mensagem
    Evolution { message_id: String },
    /// Meta/Instagram baixam pelo media-id com o token da conexão
    Meta { media_id: String, token: String },
}

#[derive(Clone)]
pub struct MediaPipeline {
    http_client: reqwest::Client,
    evolution: EvolutionClient,
    meta: MetaClient,
    settings: Option<MidiaSettings>,
    retry: RetryPolicy,
}

impl MediaPipeline {
    pub fn new(
        evolution: EvolutionClient,
        meta: MetaClient,
        settings: Option<MidiaSettings>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            evolution,
            meta,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    /// Processa a mídia de ponta a ponta. Erros viram `None` nos campos.
    pub async fn processar(
        &self,
        provedor: TipoProvedor,
        instancia: &str,
        referencia: &RefMidia,
        mime_sugerido: Option<&str>,
    ) -> MidiaProcessada {
        let (base64_conteudo, mime) = match self.baixar(instancia, referencia).await {
            Ok(par) => par,
            Err(erro) => {
                log_warning(&format!(
                    "Falha ao baixar mídia do provedor {}: {}",
                    provedor, erro
                ));
                return MidiaProcessada::default();
            }
        };
        let mime = mime_sugerido.map(|m| m.to_string()).unwrap_or(mime);

        let mut resultado = MidiaProcessada {
            url: self.subir_blob(&base64_conteudo, &mime).await,
            ..Default::default()
        };

        if mime.starts_with("audio/") {
            resultado.transcricao = self.transcrever(&base64_conteudo, &mime).await;
        } else if mime.starts_with("image/") {
            resultado.descricao = self.descrever(&base64_conteudo, &mime).await;
        }
        resultado
    }

    async fn baixar(
        &self,
        instancia: &str,
        referencia: &RefMidia,
    ) -> Result<(String, String), provedores::ProviderError> {
        match referencia {
            RefMidia::Evolution { message_id } => {
                let midia = self
                    .evolution
                    .baixar_midia_base64(instancia, message_id)
                    .await?;
                let mime = midia
                    .mimetype
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                Ok((midia.base64, mime))
            }
            RefMidia::Meta { media_id, token } => {
                let (bytes, mime) = self.meta.baixar_midia(token, media_id).await?;
                let base64_conteudo =
                    base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok((base64_conteudo, mime))
            }
        }
    }

    async fn subir_blob(&self, base64_conteudo: &str, mime: &str) -> Option<String> {
        let endpoint = self.settings.as_ref()?.upload_endpoint.as_deref()?;
        let corpo = json!({ "base64": base64_conteudo, "mime": mime });
        match self
            .retry
            .executar(|| self.chamar_colaborador(endpoint, &corpo, "url"))
            .await
        {
            Ok(url) => Some(url),
            Err(erro) => {
                log_warning(&format!("Upload de mídia falhou: {}", erro));
                None
            }
        }
    }

    async fn transcrever(&self, base64_conteudo: &str, mime: &str) -> Option<String> {
        let endpoint = self.settings.as_ref()?.transcricao_endpoint.as_deref()?;
        let corpo = json!({ "base64": base64_conteudo, "mime": mime });
        match self
            .retry
            .executar(|| self.chamar_colaborador(endpoint, &corpo, "texto"))
            .await
        {
            Ok(texto) => Some(texto),
            Err(erro) => {
                log_warning(&format!("Transcrição de áudio falhou: {}", erro));
                None
            }
        }
    }

    async fn descrever(&self, base64_conteudo: &str, mime: &str) -> Option<String> {
        let endpoint = self.settings.as_ref()?.descricao_endpoint.as_deref()?;
        let corpo = json!({ "base64": base64_conteudo, "mime": mime });
        match self
            .retry
            .executar(|| self.chamar_colaborador(endpoint, &corpo, "descricao"))
            .await
        {
            Ok(descricao) => Some(descricao),
            Err(erro) => {
                log_warning(&format!("Descrição de imagem falhou: {}", erro));
                None
            }
        }
    }

    async fn chamar_colaborador(
        &self,
        endpoint: &str,
        corpo: &serde_json::Value,
        campo: &str,
    ) -> Result<String, String> {
        let resposta = self
            .http_client
            .post(endpoint)
            .json(corpo)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resposta.status().is_success() {
            return Err(format!("status {}", resposta.status().as_u16()));
        }
        let json: serde_json::Value = resposta.json().await.map_err(|e| e.to_string())?;
        json.get(campo)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| format!("resposta sem campo '{}'", campo))
    }
}

/// Placeholder de conteúdo quando a mídia não gera texto
pub fn placeholder_midia(tipo: &crate::models::TipoMensagem) -> &'static str {
    use crate::models::TipoMensagem;
    match tipo {
        TipoMensagem::Audio => "🎵 Áudio",
        TipoMensagem::Imagem | TipoMensagem::Sticker => "📷 Imagem",
        TipoMensagem::Video => "🎥 Vídeo",
        TipoMensagem::Documento => "📄 Documento",
        TipoMensagem::Texto | TipoMensagem::Sistema => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn pipeline(servidor: &MockServer) -> MediaPipeline {
        let evolution = EvolutionClient::new(servidor.base_url(), "chave").unwrap();
        let meta = MetaClient::new(servidor.base_url()).unwrap();
        let settings = MidiaSettings {
            upload_endpoint: Some(format!("{}/media/upload", servidor.base_url())),
            transcricao_endpoint: Some(format!("{}/media/transcribe", servidor.base_url())),
            descricao_endpoint: Some(format!("{}/media/describe", servidor.base_url())),
        };
        MediaPipeline::new(evolution, meta, Some(settings))
    }

    #[tokio::test]
    async fn audio_da_evolution_ganha_url_e_transcricao() {
        let servidor = MockServer::start_async().await;
        servidor
            .mock_async(|when, then| {
                when.method(POST).path("/chat/getBase64FromMediaMessage/inst1");
                then.status(200).json_body(serde_json::json!({
                    "base64": "QUJD",
                    "mimetype": "audio/ogg"
                }));
            })
            .await;
        servidor
            .mock_async(|when, then| {
                when.method(POST).path("/media/upload");
                then.status(200)
                    .json_body(serde_json::json!({ "url": "https://blob.example.com/a.ogg" }));
            })
            .await;
        servidor
            .mock_async(|when, then| {
                when.method(POST).path("/media/transcribe");
                then.status(200)
                    .json_body(serde_json::json!({ "texto": "quero cancelar o pedido" }));
            })
            .await;

        let resultado = pipeline(&servidor)
            .processar(
                TipoProvedor::Evolution,
                "inst1",
                &RefMidia::Evolution { message_id: "A1".into() },
                None,
            )
            .await;

        assert_eq!(resultado.url.as_deref(), Some("https://blob.example.com/a.ogg"));
        assert_eq!(resultado.transcricao.as_deref(), Some("quero cancelar o pedido"));
        assert!(resultado.descricao.is_none());
    }

    #[tokio::test]
    async fn falha_de_download_nao_propaga() {
        let servidor = MockServer::start_async().await;
        servidor
            .mock_async(|when, then| {
                when.method(POST).path("/chat/getBase64FromMediaMessage/inst1");
                then.status(500).json_body(serde_json::json!({ "error": "boom" }));
            })
            .await;

        let resultado = pipeline(&servidor)
            .processar(
                TipoProvedor::Evolution,
                "inst1",
                &RefMidia::Evolution { message_id: "A1".into() },
                None,
            )
            .await;

        assert!(resultado.url.is_none());
        assert!(resultado.transcricao.is_none());
    }
}
