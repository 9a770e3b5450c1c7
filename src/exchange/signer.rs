use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::exchange::adapter::{ExchangeError, HttpMethod};

type HmacSha256 = Hmac<Sha256>;

/// BitMEX signatures are valid until `now + EXPIRY_WINDOW_SECS`.
pub const BITMEX_EXPIRY_WINDOW_SECS: i64 = 5;

fn hmac_hex(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// URL-encode parameters in the order given (`a=1&b=x+y`).
pub fn encode_params(params: &[(String, String)]) -> Result<String, ExchangeError> {
    serde_urlencoded::to_string(params).map_err(|e| ExchangeError::Signing(e.to_string()))
}

/// Binance Futures: HMAC-SHA256 over the encoded query string, sent back as
/// the trailing `signature` parameter.
#[derive(Clone)]
pub struct BinanceSigner {
    secret: String,
}

impl BinanceSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, encoded_query: &str) -> Result<String, ExchangeError> {
        hmac_hex(&self.secret, encoded_query)
    }

    /// Appends `timestamp` to the parameters and returns the fully signed
    /// query string.
    pub fn signed_query(
        &self,
        mut params: Vec<(String, String)>,
        timestamp_ms: i64,
    ) -> Result<String, ExchangeError> {
        params.push(("timestamp".to_string(), timestamp_ms.to_string()));
        let query = encode_params(&params)?;
        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }
}

/// Header values carried by every BitMEX request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmexAuthHeaders {
    pub api_expires: String,
    pub api_key: String,
    pub api_signature: String,
}

/// BitMEX: HMAC-SHA256 over `METHOD + path[?query] + expires`, sent as headers.
#[derive(Clone)]
pub struct BitmexSigner {
    api_key: String,
    secret: String,
}

impl BitmexSigner {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    pub fn sign(
        &self,
        method: HttpMethod,
        path: &str,
        encoded_query: &str,
        expires: i64,
    ) -> Result<String, ExchangeError> {
        let message = if encoded_query.is_empty() {
            format!("{}{}{}", method, path, expires)
        } else {
            format!("{}{}?{}{}", method, path, encoded_query, expires)
        };
        hmac_hex(&self.secret, &message)
    }

    pub fn headers(
        &self,
        method: HttpMethod,
        path: &str,
        encoded_query: &str,
        now_secs: i64,
    ) -> Result<BitmexAuthHeaders, ExchangeError> {
        let expires = now_secs + BITMEX_EXPIRY_WINDOW_SECS;
        Ok(BitmexAuthHeaders {
            api_expires: expires.to_string(),
            api_key: self.api_key.clone(),
            api_signature: self.sign(method, path, encoded_query, expires)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("side".to_string(), "BUY".to_string()),
        ]
    }

    #[test]
    fn test_binance_signed_query_layout() {
        let signer = BinanceSigner::new("secret");
        let query = signer.signed_query(params(), 1_700_000_000_000).unwrap();

        assert!(query.starts_with("symbol=BTCUSDT&side=BUY&timestamp=1700000000000&signature="));
        let signature = query.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_encode_params_escapes_values() {
        let encoded = encode_params(&[("filter".to_string(), "{\"a\": 1}".to_string())]).unwrap();
        assert_eq!(encoded, "filter=%7B%22a%22%3A+1%7D");
    }

    #[test]
    fn test_bitmex_empty_query_omits_question_mark() {
        let signer = BitmexSigner::new("key", "secret");
        let with_empty = signer.sign(HttpMethod::Get, "/api/v1/instrument/active", "", 100).unwrap();
        let expected = hmac_hex("secret", "GET/api/v1/instrument/active100").unwrap();
        assert_eq!(with_empty, expected);
    }

    #[test]
    fn test_bitmex_headers_expiry_window() {
        let signer = BitmexSigner::new("key", "secret");
        let headers = signer
            .headers(HttpMethod::Get, "/api/v1/user/margin", "currency=all", 1_000)
            .unwrap();
        assert_eq!(headers.api_expires, "1005");
        assert_eq!(headers.api_key, "key");
        assert_eq!(
            headers.api_signature,
            hmac_hex("secret", "GET/api/v1/user/margin?currency=all1005").unwrap()
        );
    }
}
