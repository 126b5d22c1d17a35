//! Delegates verification and settlement to an external x402 facilitator service.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{Facilitator, Payer};
use crate::types::{PaymentRequirement, X402_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum RemoteFacilitatorError {
    #[error("failed to build facilitator URL: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("facilitator request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("facilitator returned {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("verification rejected: {0}")]
    VerifyRejected(String),
    #[error("settlement rejected: {0}")]
    SettleRejected(String),
}

#[derive(Serialize)]
struct VerifyOrSettleRequest<'a> {
    #[serde(rename = "x402Version")]
    x402_version: u8,
    #[serde(rename = "paymentPayload")]
    payment_payload: &'a serde_json::value::RawValue,
    #[serde(rename = "paymentRequirements")]
    payment_requirements: &'a PaymentRequirement,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(rename = "isValid")]
    is_valid: bool,
    payer: Option<String>,
    #[serde(rename = "invalidReason")]
    invalid_reason: Option<String>,
}

#[derive(Deserialize)]
struct SettleResponse {
    success: bool,
    #[serde(rename = "errorReason")]
    error_reason: Option<String>,
}

/// Talks to an external facilitator over HTTP, mirroring the `/verify` and `/settle`
/// contract of the local implementation so the middleware is indifferent to which one
/// it is driving.
#[derive(Clone)]
pub struct RemoteFacilitator {
    client: reqwest::Client,
    verify_url: Url,
    settle_url: Url,
    timeout: Duration,
}

impl RemoteFacilitator {
    pub fn new(base_url: &str) -> Result<Self, RemoteFacilitatorError> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&base_url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            verify_url: base.join("verify")?,
            settle_url: base.join("settle")?,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &Url,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<T, RemoteFacilitatorError> {
        let raw_payload = serde_json::value::RawValue::from_string(
            String::from_utf8_lossy(payload_bytes).into_owned(),
        )
        .unwrap_or_else(|_| serde_json::value::RawValue::from_string("null".to_string()).unwrap());
        let body = VerifyOrSettleRequest {
            x402_version: X402_VERSION,
            payment_payload: &raw_payload,
            payment_requirements: requirement,
        };
        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteFacilitatorError::HttpStatus { status, body });
        }
        Ok(response.json::<T>().await?)
    }
}

impl Facilitator for RemoteFacilitator {
    type Error = RemoteFacilitatorError;

    async fn verify(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<Payer, Self::Error> {
        let response: VerifyResponse = self
            .post_json(&self.verify_url, payload_bytes, requirement)
            .await?;
        if response.is_valid {
            Ok(Payer(response.payer.unwrap_or_default()))
        } else {
            Err(RemoteFacilitatorError::VerifyRejected(
                response.invalid_reason.unwrap_or_else(|| "rejected".to_string()),
            ))
        }
    }

    async fn settle(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<(), Self::Error> {
        let response: SettleResponse = self
            .post_json(&self.settle_url, payload_bytes, requirement)
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(RemoteFacilitatorError::SettleRejected(
                response.error_reason.unwrap_or_else(|| "rejected".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized_before_joining() {
        let a = RemoteFacilitator::new("https://facilitator.example").unwrap();
        let b = RemoteFacilitator::new("https://facilitator.example/").unwrap();
        assert_eq!(a.verify_url, b.verify_url);
        assert_eq!(a.verify_url.as_str(), "https://facilitator.example/verify");
        assert_eq!(a.settle_url.as_str(), "https://facilitator.example/settle");
    }
}
