use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use crate::exchange::adapter::{ExchangeError, HttpMethod};
use crate::model::Venue;

/// Executes a single HTTP attempt against one venue and decodes the JSON body.
///
/// Anything other than HTTP 200 and any transport failure is logged with
/// venue, method and endpoint, then surfaced as an `ExchangeError`.
#[derive(Clone)]
pub struct RestTransport {
    venue: Venue,
    base_url: String,
    client: Client,
}

impl RestTransport {
    pub fn new(venue: Venue, base_url: impl Into<String>) -> Self {
        Self {
            venue,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `query` must already be URL-encoded (and signed when required), so the
    /// bytes on the wire match the bytes that were signed.
    pub async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: &str,
        headers: &[(&'static str, String)],
    ) -> Result<Value, ExchangeError> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };

        let mut request = self.client.request(method.into(), &url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        debug!(venue = %self.venue, %method, endpoint, "REST request");

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(
                    venue = %self.venue,
                    %method,
                    endpoint,
                    error = %e,
                    "Connection error while making request"
                );
                return Err(ExchangeError::Network(e.to_string()));
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                error!(venue = %self.venue, %method, endpoint, error = %e, "Failed to read response body");
                return Err(ExchangeError::Network(e.to_string()));
            }
        };

        if status != reqwest::StatusCode::OK {
            error!(
                venue = %self.venue,
                %method,
                endpoint,
                status = status.as_u16(),
                body = %text,
                "Error while making request"
            );
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            error!(venue = %self.venue, %method, endpoint, error = %e, "Undecodable response body");
            ExchangeError::Parse(format!("{} | body: {}", e, text))
        })
    }
}
