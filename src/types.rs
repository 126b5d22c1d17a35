//! Wire types for the x402 `exact` scheme over `eip155`: the `402` advertisement,
//! the client-submitted payment payload, and the ERC-3009 authorization it carries.

use alloy_primitives::{Address, U256};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

use crate::network::Network;

pub const X402_VERSION: u8 = 2;

/// Payment scheme. Only `"exact"` is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exact")
    }
}

/// A 20-byte EVM address, serialized as 0x-prefixed lowercase hex.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EvmAddress(pub Address);

impl Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        EvmAddress(address)
    }
}

impl From<EvmAddress> for Address {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl std::str::FromStr for EvmAddress {
    type Err = <Address as std::str::FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Address>().map(EvmAddress)
    }
}

impl Serialize for EvmAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<Address>()
            .map(EvmAddress)
            .map_err(|e| D::Error::custom(format!("invalid EVM address: {e}")))
    }
}

/// A 65-byte secp256k1 signature, `0x`-prefixed, 130 hex characters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

static SIG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("valid regex"));

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !SIG_REGEX.is_match(&s) {
            return Err(D::Error::custom(
                "signature must be 0x-prefixed and 130 hex chars",
            ));
        }
        let bytes = hex::decode(&s[2..]).map_err(|_| D::Error::custom("invalid signature hex"))?;
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature must be exactly 65 bytes"))?;
        Ok(EvmSignature(array))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A 32-byte authorization nonce, `0x`-prefixed, 64 hex characters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HexEncodedNonce(pub [u8; 32]);

static NONCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid regex"));

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !NONCE_REGEX.is_match(&s) {
            return Err(D::Error::custom("nonce must be 0x-prefixed and 64 hex chars"));
        }
        let bytes = hex::decode(&s[2..]).map_err(|_| D::Error::custom("invalid nonce hex"))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("nonce must be exactly 32 bytes"))?;
        Ok(HexEncodedNonce(array))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A decimal-string-encoded unsigned integer (atomic token units, or a unix timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalU256(pub U256);

impl<'de> Deserialize<'de> for DecimalU256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<U256>()
            .map(DecimalU256)
            .map_err(|_| D::Error::custom("expected a decimal-string integer"))
    }
}

impl Serialize for DecimalU256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

/// ERC-3009 `TransferWithAuthorization` fields as carried in the client payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: DecimalU256,
    pub valid_after: DecimalU256,
    pub valid_before: DecimalU256,
    pub nonce: HexEncodedNonce,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: EvmSignature,
    pub authorization: ExactEvmPayloadAuthorization,
}

/// The EIP-712 domain hint advertised/echoed alongside a payment requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eip712Extra {
    pub name: String,
    pub version: String,
}

/// A single advertised payment requirement (one entry of the `402` body's `accepts`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub scheme: Scheme,
    pub network: Network,
    pub amount: String,
    pub asset: EvmAddress,
    pub pay_to: EvmAddress,
    pub max_timeout_seconds: u64,
    pub extra: Eip712Extra,
}

impl PaymentRequirement {
    pub fn amount_u256(&self) -> Result<U256, alloy_primitives::ruint::ParseError> {
        self.amount.parse()
    }
}

/// A resource descriptor, echoed in both the `402` advertisement and the client's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub url: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// The `402` response body, also the base64-decoded form of the `Payment-Required` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequiredBody {
    #[serde(rename = "x402Version")]
    pub x402_version: u8,
    pub error: String,
    pub resource: ResourceInfo,
    pub accepts: Vec<PaymentRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The client-submitted payment payload, delivered base64-encoded in `Payment-Signature`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(rename = "x402Version")]
    pub x402_version: u8,
    pub resource: ResourceInfo,
    pub accepted: PaymentRequirement,
    pub payload: ExactEvmPayload,
}
