use std::time::Duration;

use pixelpost_common::outgoing;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::Serialize;

use crate::{DeliveryError, destination::DestinationResponse};

const USER_AGENT: &str = concat!("pixelpost/", env!("CARGO_PKG_VERSION"));

/// Credentials attached to a single request. Each adapter only ever passes
/// its own secret, so tokens never cross destinations.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    Bearer(&'a str),
    Header(&'static str, &'a str),
}

impl<'a> Auth<'a> {
    /// Bearer auth when a non-empty token is configured.
    #[must_use]
    pub fn bearer(token: Option<&'a str>) -> Self {
        token.filter(|t| !t.is_empty()).map_or(Self::None, Self::Bearer)
    }
}

/// Shared JSON-over-HTTP client for every adapter.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
}

impl HttpSender {
    /// `timeout` bounds each request unless overridden per call.
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// POST `body` as JSON and capture the status and body of the reply.
    ///
    /// Only transport problems are errors; classifying the status is the
    /// caller's job.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        auth: Auth<'_>,
        body: &T,
        timeout: Option<Duration>,
    ) -> crate::Result<DestinationResponse> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(body);

        request = match auth {
            Auth::None => request,
            Auth::Bearer(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            Auth::Header(name, value) => request.header(name, value),
        };

        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        outgoing!(url, "POST");

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        outgoing!(url, status, "Response");

        Ok(DestinationResponse { status, body })
    }
}
