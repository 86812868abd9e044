//! HTTP client shared by all venue adapters.
//!
//! Every venue call goes through [`SignedClient`]: it signs with the venue's
//! dialect, races the request against the import's cancellation token and maps
//! failures into [`VenueError`].

use reqwest::{Client, Method, RequestBuilder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{RequestSigner, VenueError};
use crate::domain::{Credential, TimeMs};

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Clone)]
pub struct SignedClient {
    http: Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
    clock: Clock,
}

impl SignedClient {
    pub fn new(base_url: impl Into<String>, signer: Arc<dyn RequestSigner>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
            clock: Arc::new(|| TimeMs::now().as_ms()),
        }
    }

    /// Replace the signing clock (tests pin it to reproduce signatures).
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated request. The credential is checked before anything is
    /// sent.
    pub async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, VenueError> {
        let signed = self.signer.sign(params, credential, (self.clock)())?;
        let url = join_url(&self.base_url, path, &signed.query);
        debug!("Signed {} {}{}", method, self.base_url, path);

        let mut request = self.http.request(method, url);
        for (name, value) in signed.headers {
            request = request.header(name, value);
        }
        self.execute(request, cancel).await
    }

    pub async fn signed_get(
        &self,
        path: &str,
        params: &[(String, String)],
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, VenueError> {
        self.signed_request(Method::GET, path, params, credential, cancel)
            .await
    }

    /// Unsigned market-data request.
    pub async fn public_get(
        &self,
        path: &str,
        params: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, VenueError> {
        let query = super::signing::encode_query(params);
        let url = join_url(&self.base_url, path, &query);
        debug!("Public GET {}{}", self.base_url, path);
        self.execute(self.http.get(url), cancel).await
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, VenueError> {
        if cancel.is_cancelled() {
            return Err(VenueError::Cancelled);
        }

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| VenueError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| VenueError::Transport(e.to_string()))?;

            if !status.is_success() {
                let message = extract_error_message(&body).unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
                return Err(VenueError::Venue {
                    status: status.as_u16(),
                    message,
                });
            }

            serde_json::from_str::<serde_json::Value>(&body)
                .map_err(|e| VenueError::Parse(e.to_string()))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VenueError::Cancelled),
            result = exchange => result,
        }
    }
}

impl fmt::Debug for SignedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedClient")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer)
            .finish()
    }
}

fn join_url(base: &str, path: &str, query: &str) -> String {
    if query.is_empty() {
        format!("{}{}", base, path)
    } else {
        format!("{}{}?{}", base, path, query)
    }
}

/// The venue's own error text from an error body, if it has one.
///
/// Binance and Mexc use `{code, msg}`, Bybit `{retCode, retMsg}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = ["msg", "retMsg", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))?;
    let code = ["code", "retCode"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|c| c.to_string());
    Some(match code {
        Some(code) => format!("{} (code {})", message, code.trim_matches('"')),
        None => message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::signer_for;
    use crate::domain::Venue;

    #[test]
    fn test_extracts_binance_error() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        assert_eq!(
            extract_error_message(body),
            Some("Invalid symbol. (code -1121)".to_string())
        );
    }

    #[test]
    fn test_extracts_bybit_error() {
        let body = r#"{"retCode":10003,"retMsg":"API key is invalid."}"#;
        assert_eq!(
            extract_error_message(body),
            Some("API key is invalid. (code 10003)".to_string())
        );
    }

    #[test]
    fn test_non_json_error_body_has_no_message() {
        assert_eq!(extract_error_message("<html>502</html>"), None);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://x", "/a", ""), "https://x/a");
        assert_eq!(join_url("https://x", "/a", "b=1"), "https://x/a?b=1");
    }

    #[tokio::test]
    async fn test_blank_credential_fails_before_network() {
        // Unroutable address: reaching the network would be a Transport error.
        let client = SignedClient::new(
            "http://127.0.0.1:9",
            signer_for(Venue::Binance, 5000),
            Duration::from_millis(200),
        );
        let cred = Credential::new(Venue::Binance, "", "secret");
        let err = client
            .signed_get("/api/v3/account", &[], &cred, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let client = SignedClient::new(
            "http://127.0.0.1:9",
            signer_for(Venue::Bybit, 5000),
            Duration::from_millis(200),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .public_get("/v5/market/tickers", &[], &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, VenueError::Cancelled);
    }
}
