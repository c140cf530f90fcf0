//! Tipos compartilhados entre os adaptadores

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canal de envio da conexão
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoProvedor {
    Evolution,
    Meta,
    Instagram,
}

impl std::fmt::Display for TipoProvedor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TipoProvedor::Evolution => "evolution",
            TipoProvedor::Meta => "meta",
            TipoProvedor::Instagram => "instagram",
        };
        write!(f, "{}", s)
    }
}

/// Tipo lógico de um envio de saída
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoEnvio {
    Texto,
    Imagem,
    Audio,
    Documento,
}

/// Resultado de um envio aceito pelo provedor
#[derive(Debug, Clone, Default)]
pub struct ResultadoEnvio {
    /// Id da mensagem atribuído pelo provedor, quando retornado
    pub provider_message_id: Option<String>,
}

/// Mídia baixada do provedor, já em base64
#[derive(Debug, Clone, Deserialize)]
pub struct MidiaBase64 {
    pub base64: String,
    #[serde(default)]
    pub mimetype: Option<String>,
}

/// Chave de identificação de uma mensagem na Evolution API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChaveEvolution {
    #[serde(rename = "remoteJid", default)]
    pub remote_jid: String,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: String,
}

/// Mensagem crua retornada pelo poll da Evolution API.
///
/// O campo `message` mantém o envelope original (conversation,
/// extendedTextMessage, imageMessage, audioMessage, ...) como `Value` porque
/// a Evolution muda o formato entre versões; a extração é tolerante.
#[derive(Debug, Clone, Deserialize)]
pub struct MensagemEvolution {
    pub key: ChaveEvolution,
    #[serde(rename = "pushName", default)]
    pub push_name: Option<String>,
    #[serde(rename = "messageTimestamp", default)]
    pub message_timestamp: i64,
    #[serde(default)]
    pub message: Option<Value>,
}

impl MensagemEvolution {
    /// Tipo de conteúdo da mensagem, pelo campo presente no envelope
    pub fn tipo_conteudo(&self) -> &'static str {
        let Some(msg) = &self.message else {
            return "desconhecido";
        };
        if msg.get("conversation").is_some() || msg.get("extendedTextMessage").is_some() {
            "texto"
        } else if msg.get("imageMessage").is_some() {
            "imagem"
        } else if msg.get("audioMessage").is_some() {
            "audio"
        } else if msg.get("videoMessage").is_some() {
            "video"
        } else if msg.get("documentMessage").is_some() {
            "documento"
        } else if msg.get("stickerMessage").is_some() {
            "sticker"
        } else {
            "desconhecido"
        }
    }

    /// Texto da mensagem ou legenda da mídia, quando houver
    pub fn texto_ou_legenda(&self) -> Option<String> {
        let msg = self.message.as_ref()?;

        if let Some(t) = msg.get("conversation").and_then(|v| v.as_str()) {
            return Some(t.to_string());
        }
        if let Some(t) = msg
            .pointer("/extendedTextMessage/text")
            .and_then(|v| v.as_str())
        {
            return Some(t.to_string());
        }
        for envelope in ["imageMessage", "videoMessage", "documentMessage"] {
            if let Some(t) = msg
                .get(envelope)
                .and_then(|m| m.get("caption"))
                .and_then(|v| v.as_str())
            {
                return Some(t.to_string());
            }
        }
        None
    }

    /// Mimetype anunciado pela mídia, quando houver
    pub fn mimetype_midia(&self) -> Option<String> {
        let msg = self.message.as_ref()?;
        for envelope in [
            "imageMessage",
            "audioMessage",
            "videoMessage",
            "documentMessage",
            "stickerMessage",
        ] {
            if let Some(t) = msg
                .get(envelope)
                .and_then(|m| m.get("mimetype"))
                .and_then(|v| v.as_str())
            {
                return Some(t.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mensagem(message: Value) -> MensagemEvolution {
        serde_json::from_value(json!({
            "key": { "remoteJid": "5511999999999@s.whatsapp.net", "fromMe": false, "id": "ABC123" },
            "pushName": "Maria",
            "messageTimestamp": 1700000000,
            "message": message
        }))
        .unwrap()
    }

    #[test]
    fn extrai_texto_de_conversation() {
        let m = mensagem(json!({ "conversation": "Oi" }));
        assert_eq!(m.tipo_conteudo(), "texto");
        assert_eq!(m.texto_ou_legenda().as_deref(), Some("Oi"));
    }

    #[test]
    fn extrai_texto_de_extended_text() {
        let m = mensagem(json!({ "extendedTextMessage": { "text": "Tudo bem?" } }));
        assert_eq!(m.tipo_conteudo(), "texto");
        assert_eq!(m.texto_ou_legenda().as_deref(), Some("Tudo bem?"));
    }

    #[test]
    fn extrai_legenda_de_imagem() {
        let m = mensagem(json!({
            "imageMessage": { "caption": "olha isso", "mimetype": "image/jpeg" }
        }));
        assert_eq!(m.tipo_conteudo(), "imagem");
        assert_eq!(m.texto_ou_legenda().as_deref(), Some("olha isso"));
        assert_eq!(m.mimetype_midia().as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn audio_sem_legenda() {
        let m = mensagem(json!({ "audioMessage": { "mimetype": "audio/ogg; codecs=opus" } }));
        assert_eq!(m.tipo_conteudo(), "audio");
        assert_eq!(m.texto_ou_legenda(), None);
    }
}
