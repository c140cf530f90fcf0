//! Envelope do webhook da Meta Cloud API.
//!
//! O mesmo formato serve WhatsApp (field `messages`) e Instagram; campos que
//! não usamos são tolerados e descartados pelo serde.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaWebhookEnvelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<MetaEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<MetaChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: MetaChangeValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: Option<MetaMetadata>,
    #[serde(default)]
    pub contacts: Vec<MetaContact>,
    #[serde(default)]
    pub messages: Vec<MetaMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaMetadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaContact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<MetaProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaProfile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaMessage {
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub tipo: String,
    #[serde(default)]
    pub text: Option<MetaText>,
    #[serde(default)]
    pub image: Option<MetaMedia>,
    #[serde(default)]
    pub audio: Option<MetaMedia>,
    #[serde(default)]
    pub video: Option<MetaMedia>,
    #[serde(default)]
    pub document: Option<MetaMedia>,
    #[serde(default)]
    pub sticker: Option<MetaMedia>,
}

impl MetaMessage {
    /// O media-id da mensagem, qualquer que seja o tipo de mídia
    pub fn media_id(&self) -> Option<&str> {
        [&self.image, &self.audio, &self.video, &self.document, &self.sticker]
            .into_iter()
            .flatten()
            .next()
            .map(|m| m.id.as_str())
    }

    pub fn legenda(&self) -> Option<&str> {
        [&self.image, &self.video, &self.document]
            .into_iter()
            .flatten()
            .find_map(|m| m.caption.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaText {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaMedia {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}
