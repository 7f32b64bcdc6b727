//! SSML reply envelope returned to the voice platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope format version expected by the platform.
pub const REPLY_VERSION: &str = "1.0";

/// Top-level webhook response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceReply {
    pub version: String,
    pub response: ReplyBody,
}

/// The `response` object of a [`VoiceReply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    #[serde(rename = "outputSpeech")]
    pub output_speech: OutputSpeech,
    /// Always `false`: the session stays open for follow-up turns.
    #[serde(rename = "shouldEndSession")]
    pub should_end_session: bool,
}

/// Speech payload. `kind` is always `"SSML"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub kind: String,
    pub ssml: String,
}

impl VoiceReply {
    /// Renders `text` into an SSML reply.
    ///
    /// The text is converted with [`ToString`] and then escaped with
    /// [`escape_ssml`] before it is placed inside `<speak>`. Upstream model
    /// output is untrusted, so escaping is unconditional.
    pub fn speak(text: impl fmt::Display) -> Self {
        let safe = escape_ssml(&text.to_string());
        Self {
            version: REPLY_VERSION.to_string(),
            response: ReplyBody {
                output_speech: OutputSpeech {
                    kind: "SSML".to_string(),
                    ssml: format!("<speak>{safe}</speak>"),
                },
                should_end_session: false,
            },
        }
    }

    /// Returns the rendered SSML document.
    pub fn ssml(&self) -> &str {
        &self.response.output_speech.ssml
    }
}

/// Escapes the three SSML metacharacters `&`, `<` and `>`.
///
/// Not idempotent: escaping an already escaped string escapes the `&` of
/// each entity again.
pub fn escape_ssml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Fixed, non-technical replies spoken when the bridge cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyMessage {
    /// The webhook payload could not be decoded.
    InvalidRequest,
    /// No usable credential is stored for the user.
    NotConfigured,
    /// The user's model could not be reached or answered badly.
    UpstreamUnreachable,
    /// An infrastructure failure on our side.
    InternalError,
}

impl ReplyMessage {
    /// The spoken text.
    pub fn text(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid request format.",
            Self::NotConfigured => "You have not configured an LLM yet.",
            Self::UpstreamUnreachable => "Sorry, I could not reach your model.",
            Self::InternalError => "Sorry, there was an error processing your request.",
        }
    }

    /// Renders the message as a reply.
    pub fn reply(self) -> VoiceReply {
        VoiceReply::speak(self.text())
    }
}

impl fmt::Display for ReplyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
