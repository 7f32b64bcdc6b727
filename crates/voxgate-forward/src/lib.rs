//! Outbound forwarding of voice queries to a user's LLM endpoint.
//!
//! The upstream contract is an OpenAI-compatible chat-completion `POST`:
//! one user message in, the first choice's message content out. Every call
//! is a single attempt bounded by a timeout; there are no retries, since
//! the voice platform's own response budget is shorter than a retry cycle.

pub mod chat;
pub mod endpoint;
pub mod forwarder;

pub use endpoint::{EndpointTarget, MODEL_SEPARATOR};
pub use forwarder::{ForwardError, Forwarder, ForwarderConfig};
