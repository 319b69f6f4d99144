//! Operator messaging over the Telegram Bot API.
//!
//! The hunt loop and the command listener both talk to the operator through
//! the [`Messenger`] trait; the production implementation is a blocking
//! `ureq` client bound to one bot token and one operator chat. Photo uploads
//! use a hand-built multipart body since the API only accepts file fields
//! that way.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Messaging failures. The listener logs and swallows these; the hunt loop
/// propagates them only for operator-facing sends it cannot skip.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("transport error: {0}")]
    Transport(#[from] Box<ureq::Error>),
    #[error("malformed API response: {0}")]
    Decode(#[from] std::io::Error),
    #[error("API rejected request: {0}")]
    Api(String),
}

/// One operator update: monotonically increasing id plus the message text,
/// if the update carried any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub text: Option<String>,
}

/// Opaque remote-messaging capability.
pub trait Messenger: Send + Sync {
    fn send_text(&self, text: &str) -> Result<(), MessagingError>;

    /// Send a JPEG with a caption. `silent` suppresses the operator-side
    /// notification sound.
    fn send_image(&self, image: &[u8], caption: &str, silent: bool) -> Result<(), MessagingError>;

    /// Fetch updates with id >= `since`.
    fn poll_updates(&self, since: i64) -> Result<Vec<Update>, MessagingError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiUpdate {
    update_id: i64,
    message: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    text: Option<String>,
}

const MULTIPART_BOUNDARY: &str = "shinyhunt-frame-boundary";

/// Blocking Telegram Bot API client.
pub struct TelegramBot {
    agent: ureq::Agent,
    api_base: String,
    token: String,
    chat_id: i64,
}

impl TelegramBot {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self::with_api_base("https://api.telegram.org", token, chat_id)
    }

    /// Point the client at a different API host. Exists for tests against a
    /// local stand-in server.
    pub fn with_api_base(api_base: &str, token: &str, chat_id: i64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<Option<T>, MessagingError> {
        if !envelope.ok {
            return Err(MessagingError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            ));
        }
        Ok(envelope.result)
    }
}

impl Messenger for TelegramBot {
    fn send_text(&self, text: &str) -> Result<(), MessagingError> {
        debug!(len = text.len(), "sendMessage");
        let response = self
            .agent
            .post(&self.method_url("sendMessage"))
            .send_json(serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
            }))
            .map_err(Box::new)?;
        let envelope: ApiEnvelope<serde_json::Value> = response.into_json()?;
        Self::unwrap_envelope(envelope).map(|_| ())
    }

    fn send_image(&self, image: &[u8], caption: &str, silent: bool) -> Result<(), MessagingError> {
        debug!(bytes = image.len(), silent, "sendPhoto");
        let body = multipart_photo_body(
            MULTIPART_BOUNDARY,
            self.chat_id,
            caption,
            silent,
            image,
        );
        let response = self
            .agent
            .post(&self.method_url("sendPhoto"))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .send_bytes(&body)
            .map_err(Box::new)?;
        let envelope: ApiEnvelope<serde_json::Value> = response.into_json()?;
        Self::unwrap_envelope(envelope).map(|_| ())
    }

    fn poll_updates(&self, since: i64) -> Result<Vec<Update>, MessagingError> {
        let response = self
            .agent
            .post(&self.method_url("getUpdates"))
            .send_json(serde_json::json!({ "offset": since }))
            .map_err(Box::new)?;
        let envelope: ApiEnvelope<Vec<ApiUpdate>> = response.into_json()?;
        let updates = Self::unwrap_envelope(envelope)?.unwrap_or_default();
        Ok(updates
            .into_iter()
            .map(|u| Update {
                update_id: u.update_id,
                text: u.message.and_then(|m| m.text),
            })
            .collect())
    }
}

fn multipart_photo_body(
    boundary: &str,
    chat_id: i64,
    caption: &str,
    silent: bool,
    image: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(image.len() + 512);
    let text_field = |name: &str, value: &str, body: &mut Vec<u8>| {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };
    text_field("chat_id", &chat_id.to_string(), &mut body);
    text_field("caption", caption, &mut body);
    if silent {
        text_field("disable_notification", "true", &mut body);
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; \
             filename=\"frame.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
