//! Shared wire types for the voxgate bridge.
//!
//! This crate holds the voice-platform request envelope, the SSML reply
//! envelope and the fixed user-facing reply texts. It has no I/O and no
//! async code, so every other crate in the workspace can depend on it.

pub mod reply;
pub mod request;

pub use reply::{escape_ssml, OutputSpeech, ReplyBody, ReplyMessage, VoiceReply};
pub use request::{InboundRequest, RequestError};
