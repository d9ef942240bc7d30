use crate::gateway::error::{GatewayError, GatewayResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// HTTP client for gateway calls: per-request timeout plus bounded
/// exponential backoff on 429s, 5xx responses and transport failures.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> GatewayResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = request.send().await.map_err(|e| GatewayError::Network {
                message: format!("gateway request failed: {}", e),
            });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            GatewayError::Gateway {
                                message: format!("invalid gateway JSON response: {}", e),
                                status_code: None,
                                retryable: false,
                            }
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                            continue;
                        }
                        return Err(GatewayError::RateLimit {
                            message: "gateway rate limit exceeded".to_string(),
                            retry_after_seconds: None,
                        });
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "gateway server error, retrying"
                        );
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }

                    return Err(GatewayError::Gateway {
                        message: format!("HTTP {}: {}", status, text),
                        status_code: Some(status.as_u16().to_string()),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::Network {
            message: "gateway request failed".to_string(),
        }))
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(4))
}

pub fn verify_hmac_sha512_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature.trim().as_bytes())
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn webhook_hmac_verification_detects_invalid_signature() {
        let payload = br#"{"event":"charge.success"}"#;
        assert!(!verify_hmac_sha512_hex(payload, "secret", "not-a-valid-signature"));
    }

    #[test]
    fn webhook_hmac_verification_accepts_the_real_signature() {
        use hmac::{Hmac, Mac};
        use sha2::Sha512;

        let payload = br#"{"event":"charge.success"}"#;
        let mut mac = Hmac::<Sha512>::new_from_slice(b"secret").expect("hmac init");
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());
        assert!(verify_hmac_sha512_hex(payload, "secret", &signature));
    }

    #[test]
    fn backoff_delay_is_capped() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), Duration::from_secs(16));
    }
}
