use serde::Deserialize;
use std::fmt;

use super::Venue;

/// API credential for one venue account.
///
/// `Debug` never prints the key or secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub venue: Venue,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

impl Credential {
    pub fn new(venue: Venue, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            venue,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// True when both key and secret are non-blank.
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_secret.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("venue", &self.venue)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::new(Venue::Binance, "my-key", "my-secret");
        let printed = format!("{:?}", cred);
        assert!(!printed.contains("my-key"));
        assert!(!printed.contains("my-secret"));
        assert!(printed.contains("binance") || printed.contains("Binance"));
    }

    #[test]
    fn test_blank_credentials_are_incomplete() {
        assert!(!Credential::new(Venue::Bybit, "", "secret").is_complete());
        assert!(!Credential::new(Venue::Bybit, "key", "  ").is_complete());
        assert!(Credential::new(Venue::Bybit, "key", "secret").is_complete());
    }

    #[test]
    fn test_deserializes_camel_case() {
        let cred: Credential = serde_json::from_str(
            r#"{"venue":"mexc","apiKey":"k","apiSecret":"s"}"#,
        )
        .unwrap();
        assert_eq!(cred.venue, Venue::Mexc);
        assert_eq!(cred.api_key, "k");
    }
}
