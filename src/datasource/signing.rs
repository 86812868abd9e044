//! Per-venue request-signing dialects.
//!
//! Two recipes cover the supported venues: the signature is either appended to
//! the query string (Binance, Mexc) or sent in headers over
//! `timestamp + apiKey + recvWindow + query` (Bybit).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

use super::VenueError;
use crate::domain::{Credential, Venue};

type HmacSha256 = Hmac<Sha256>;

/// Query string and headers to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParts {
    pub query: String,
    pub headers: Vec<(&'static str, String)>,
}

pub trait RequestSigner: Send + Sync + fmt::Debug {
    /// Sign `params` for `credential` at `timestamp_ms`.
    ///
    /// Fails with [`VenueError::Authentication`] on a blank key or secret.
    fn sign(
        &self,
        params: &[(String, String)],
        credential: &Credential,
        timestamp_ms: i64,
    ) -> Result<SignedParts, VenueError>;
}

/// `timestamp` and `recvWindow` appended to the query, then
/// `signature=hex(hmac(query))`; API key in a header.
#[derive(Debug, Clone)]
pub struct QuerySigner {
    api_key_header: &'static str,
    recv_window_ms: u64,
}

impl QuerySigner {
    pub fn new(api_key_header: &'static str, recv_window_ms: u64) -> Self {
        Self {
            api_key_header,
            recv_window_ms,
        }
    }
}

impl RequestSigner for QuerySigner {
    fn sign(
        &self,
        params: &[(String, String)],
        credential: &Credential,
        timestamp_ms: i64,
    ) -> Result<SignedParts, VenueError> {
        ensure_complete(credential)?;

        let mut all = params.to_vec();
        all.push(("timestamp".to_string(), timestamp_ms.to_string()));
        all.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));
        let query = encode_query(&all);
        let signature = hmac_sha256_hex(&credential.api_secret, &query)?;

        Ok(SignedParts {
            query: format!("{}&signature={}", query, signature),
            headers: vec![(self.api_key_header, credential.api_key.clone())],
        })
    }
}

/// Query left untouched; key, timestamp, recv-window and signature headers.
#[derive(Debug, Clone)]
pub struct HeaderSigner {
    recv_window_ms: u64,
}

impl HeaderSigner {
    pub const API_KEY: &'static str = "X-BAPI-API-KEY";
    pub const TIMESTAMP: &'static str = "X-BAPI-TIMESTAMP";
    pub const RECV_WINDOW: &'static str = "X-BAPI-RECV-WINDOW";
    pub const SIGN: &'static str = "X-BAPI-SIGN";

    pub fn new(recv_window_ms: u64) -> Self {
        Self { recv_window_ms }
    }
}

impl RequestSigner for HeaderSigner {
    fn sign(
        &self,
        params: &[(String, String)],
        credential: &Credential,
        timestamp_ms: i64,
    ) -> Result<SignedParts, VenueError> {
        ensure_complete(credential)?;

        let query = encode_query(params);
        let timestamp = timestamp_ms.to_string();
        let recv_window = self.recv_window_ms.to_string();
        let payload = format!(
            "{}{}{}{}",
            timestamp, credential.api_key, recv_window, query
        );
        let signature = hmac_sha256_hex(&credential.api_secret, &payload)?;

        Ok(SignedParts {
            query,
            headers: vec![
                (Self::API_KEY, credential.api_key.clone()),
                (Self::TIMESTAMP, timestamp),
                (Self::RECV_WINDOW, recv_window),
                (Self::SIGN, signature),
            ],
        })
    }
}

/// The signing dialect a venue speaks.
pub fn signer_for(venue: Venue, recv_window_ms: u64) -> Arc<dyn RequestSigner> {
    match venue {
        Venue::Binance => Arc::new(QuerySigner::new("X-MBX-APIKEY", recv_window_ms)),
        Venue::Mexc => Arc::new(QuerySigner::new("X-MEXC-APIKEY", recv_window_ms)),
        Venue::Bybit => Arc::new(HeaderSigner::new(recv_window_ms)),
    }
}

/// `k=v&k2=v2` in the given order, values percent-encoded.
pub fn encode_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn ensure_complete(credential: &Credential) -> Result<(), VenueError> {
    if credential.is_complete() {
        Ok(())
    } else {
        Err(VenueError::Authentication(format!(
            "{} API key and secret are required",
            credential.venue
        )))
    }
}

fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String, VenueError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VenueError::Authentication(format!("unusable API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
