//! Wire envelopes carried on the event streams.
//!
//! Stream entries are flat string→string maps. Absent media is encoded as an
//! empty `mediaKey`, never as a missing field, so every consumer sees the
//! same field set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// One inbound chat message as it travels through the pipeline.
///
/// ```
/// use vox_core::MessageEnvelope;
///
/// let env = MessageEnvelope::text("u1", "c1", "1700000000", "hola");
/// let fields = env.to_fields();
/// assert_eq!(fields["userId"], "u1");
/// assert_eq!(fields["mediaKey"], "");
/// assert_eq!(MessageEnvelope::from_fields(&fields).unwrap(), env);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub user_id: String,
    pub chat_id: String,
    /// Unix seconds, kept as the string the gateway received.
    pub timestamp: String,
    pub body: String,
    /// Blob-store key of the attached media; empty when the message is text.
    pub media_key: String,
    pub transcribed: bool,
}

impl MessageEnvelope {
    pub fn text(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        timestamp: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            timestamp: timestamp.into(),
            body: body.into(),
            media_key: String::new(),
            transcribed: false,
        }
    }

    pub fn has_media(&self) -> bool {
        !self.media_key.is_empty()
    }

    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("userId".into(), self.user_id.clone()),
            ("chatId".into(), self.chat_id.clone()),
            ("timestamp".into(), self.timestamp.clone()),
            ("body".into(), self.body.clone()),
            ("mediaKey".into(), self.media_key.clone()),
            (
                "transcribed".into(),
                if self.transcribed { "true" } else { "false" }.into(),
            ),
        ])
    }

    /// Parses a stream entry. Only `userId` is required; everything else
    /// defaults so that partially-populated entries (e.g. replayed ones)
    /// still parse.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, EnvelopeError> {
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let user_id = fields
            .get("userId")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(EnvelopeError::MissingField("userId"))?;
        Ok(Self {
            user_id,
            chat_id: get("chatId"),
            timestamp: get("timestamp"),
            body: get("body"),
            media_key: get("mediaKey"),
            transcribed: get("transcribed") == "true",
        })
    }
}

/// A reply produced by the router worker, headed back to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub user_id: String,
    pub chat_id: String,
    pub body: String,
}

impl ReplyEnvelope {
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("userId".into(), self.user_id.clone()),
            ("chatId".into(), self.chat_id.clone()),
            ("body".into(), self.body.clone()),
        ])
    }

    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, EnvelopeError> {
        let user_id = fields
            .get("userId")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(EnvelopeError::MissingField("userId"))?;
        Ok(Self {
            user_id,
            chat_id: fields.get("chatId").cloned().unwrap_or_default(),
            body: fields.get("body").cloned().unwrap_or_default(),
        })
    }
}

/// An uploaded document queued for chunking and embedding.
///
/// Carries either a blob-store path or the text inline; `storage_path` and
/// `text` are both optional on the wire but at least one must be present for
/// the embedding worker to make progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub document_id: String,
    pub user_id: String,
    pub storage_path: String,
    pub text: String,
}

impl DocumentEvent {
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("document_id".into(), self.document_id.clone()),
            ("user_id".into(), self.user_id.clone()),
            ("storage_path".into(), self.storage_path.clone()),
            ("text".into(), self.text.clone()),
        ])
    }

    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, EnvelopeError> {
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let document_id = fields
            .get("document_id")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(EnvelopeError::MissingField("document_id"))?;
        let user_id = fields
            .get("user_id")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(EnvelopeError::MissingField("user_id"))?;
        Ok(Self {
            document_id,
            user_id,
            storage_path: get("storage_path"),
            text: get("text"),
        })
    }
}
