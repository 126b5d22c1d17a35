//! Pre-serialized `402` advertisement material, computed once at startup.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::types::{PaymentRequiredBody, PaymentRequirement, ResourceInfo};

/// Immutable `402` body and its compact (base64) header encoding, built once from
/// configuration and reused for every unauthenticated/unpaid request.
pub struct Advertisement {
    pub requirement: PaymentRequirement,
    body_json: Vec<u8>,
    header_value: String,
}

impl Advertisement {
    pub fn new(gateway_url: &str, description: &str, requirement: PaymentRequirement) -> Self {
        let body = PaymentRequiredBody {
            x402_version: crate::types::X402_VERSION,
            error: "Payment required".to_string(),
            resource: ResourceInfo {
                url: gateway_url.to_string(),
                description: description.to_string(),
                mime_type: String::new(),
            },
            accepts: vec![requirement.clone()],
            reason: None,
        };
        let body_json = serde_json::to_vec(&body).expect("advertisement body is serializable");
        let header_value = BASE64.encode(&body_json);
        Self {
            requirement,
            body_json,
            header_value,
        }
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_json
    }

    /// Body bytes with a machine-readable `reason` code attached, for the Path-1 cases
    /// (`token_not_found`) that must surface one. Computed per-response since the reason
    /// varies, unlike the immutable base advertisement.
    pub fn body_with_reason(&self, reason: &str) -> Vec<u8> {
        let mut body: PaymentRequiredBody =
            serde_json::from_slice(&self.body_json).expect("advertisement body round-trips");
        body.reason = Some(reason.to_string());
        serde_json::to_vec(&body).expect("advertisement body is serializable")
    }

    pub fn header_value(&self) -> &str {
        &self.header_value
    }
}
