//! Parsing of stored endpoint strings.
//!
//! Users may append `/model_name=<model>` to the endpoint URL to pick a
//! model. The string is split on that literal separator: the first segment
//! is the URL, the second (if non-empty after trimming) the model name.
//! Further segments are ignored.
//
// TODO: replace the suffix convention with a separate model field on the
// stored credential once provisioning accepts one.

use crate::forwarder::ForwardError;
use url::Url;

/// Literal separator between the URL and an optional model name.
pub const MODEL_SEPARATOR: &str = "/model_name=";

/// A parsed endpoint: where to post and which model to ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    pub url: Url,
    pub model: Option<String>,
}

impl EndpointTarget {
    /// Splits off the model suffix and validates the URL.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::InvalidEndpoint`] unless the URL part is an
    /// absolute `http` or `https` URL with a host.
    pub fn parse(endpoint: &str) -> Result<Self, ForwardError> {
        let mut parts = endpoint.split(MODEL_SEPARATOR);
        let raw_url = parts.next().unwrap_or_default().trim();
        let model = parts
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let url = Url::parse(raw_url)
            .map_err(|e| ForwardError::InvalidEndpoint(format!("unparseable url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ForwardError::InvalidEndpoint(format!(
                    "unsupported scheme '{other}'"
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(ForwardError::InvalidEndpoint("url has no host".to_string()));
        }

        Ok(Self { url, model })
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }
}
