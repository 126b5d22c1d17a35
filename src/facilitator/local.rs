//! Verifies and settles an ERC-3009 `transferWithAuthorization` directly against an EVM
//! chain, without any external payment service.

use alloy_contract as _; // required by the `#[sol(rpc)]` call-builder codegen below
use alloy_network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, FixedBytes, Signature, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockId, BlockNumberOrTag, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{SystemTime, SystemTimeError};

use super::{Facilitator, Payer};
use crate::network::Network;
use crate::types::{ExactEvmPayloadAuthorization, PaymentPayload, PaymentRequirement};

sol! {
    /// EIP-712 typed-data struct matching ERC-3009's `TransferWithAuthorization`.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

sol! {
    #[sol(rpc)]
    interface Erc3009Token {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocalFacilitatorError {
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(Network),
    #[error("authorization expired or not yet active")]
    InvalidTiming,
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error(
        "recovered signer {recovered} does not match authorization.from {expected}"
    )]
    SignerMismatch { recovered: Address, expected: Address },
    #[error("payload recipient {payload} does not match requirement payTo {requirement}")]
    ReceiverMismatch { payload: Address, requirement: Address },
    #[error("payload value {value} is below the required amount {required}")]
    InsufficientValue { value: U256, required: U256 },
    #[error("failed to read system clock: {0}")]
    Clock(#[from] SystemTimeError),
    #[error("RPC transport error: {0}")]
    Transport(String),
}

/// One pre-built HTTP provider per configured settlement network, constructed once at
/// startup and reused across verify/settle calls.
pub struct ProviderMap {
    providers: HashMap<Network, alloy_provider::RootProvider<Ethereum>>,
}

impl ProviderMap {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, network: Network, rpc_url: url::Url) {
        let provider = ProviderBuilder::new().connect_http(rpc_url);
        self.providers.insert(network, provider);
    }

    fn by_network(&self, network: Network) -> Option<&alloy_provider::RootProvider<Ethereum>> {
        self.providers.get(&network)
    }
}

impl Default for ProviderMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies and settles ERC-3009 payments for every configured network, signing
/// settlement transactions with a relayer key held read-only for the process lifetime.
pub struct LocalFacilitator {
    providers: ProviderMap,
    relayer: PrivateKeySigner,
}

impl LocalFacilitator {
    pub fn new(providers: ProviderMap, relayer_private_key: &str) -> Result<Self, LocalFacilitatorError> {
        let relayer = PrivateKeySigner::from_str(relayer_private_key)
            .map_err(|e| LocalFacilitatorError::Transport(format!("invalid relayer key: {e}")))?;
        Ok(Self { providers, relayer })
    }

    fn parse_payload(
        payload_bytes: &[u8],
    ) -> Result<PaymentPayload, LocalFacilitatorError> {
        serde_json::from_slice(payload_bytes)
            .map_err(|e| LocalFacilitatorError::Transport(format!("malformed payload: {e}")))
    }

    fn assert_valid(
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> Result<Address, LocalFacilitatorError> {
        assert_time(&payload.payload.authorization)?;

        let payload_to: Address = payload.payload.authorization.to.into();
        let required_to: Address = requirement.pay_to.into();
        if payload_to != required_to {
            return Err(LocalFacilitatorError::ReceiverMismatch {
                payload: payload_to,
                requirement: required_to,
            });
        }
        let value = payload.payload.authorization.value.0;
        let required_amount = requirement
            .amount_u256()
            .map_err(|e| LocalFacilitatorError::Transport(format!("invalid amount: {e}")))?;
        if value < required_amount {
            return Err(LocalFacilitatorError::InsufficientValue {
                value,
                required: required_amount,
            });
        }

        let domain = eip712_domain! {
            name: requirement.extra.name.clone(),
            version: requirement.extra.version.clone(),
            chain_id: requirement.network.chain_id(),
            verifying_contract: requirement.asset.into(),
        };
        let recovered = recover_signer(&payload.payload, &domain)?;
        let expected: Address = payload.payload.authorization.from.into();
        if recovered != expected {
            return Err(LocalFacilitatorError::SignerMismatch {
                recovered,
                expected,
            });
        }
        Ok(recovered)
    }
}

fn assert_time(authorization: &ExactEvmPayloadAuthorization) -> Result<(), LocalFacilitatorError> {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs();
    let valid_before: u64 = authorization.valid_before.0.to::<u64>();
    let valid_after: u64 = authorization.valid_after.0.to::<u64>();
    if valid_before < now {
        return Err(LocalFacilitatorError::InvalidTiming);
    }
    if valid_after > now {
        return Err(LocalFacilitatorError::InvalidTiming);
    }
    Ok(())
}

fn recover_signer(
    payload: &crate::types::ExactEvmPayload,
    domain: &alloy_sol_types::Eip712Domain,
) -> Result<Address, LocalFacilitatorError> {
    let signature = Signature::from_raw_array(&payload.signature.0)
        .map_err(|e| LocalFacilitatorError::InvalidSignature(e.to_string()))?;
    let authorization = &payload.authorization;
    let typed = TransferWithAuthorization {
        from: authorization.from.into(),
        to: authorization.to.into(),
        value: authorization.value.0,
        validAfter: authorization.valid_after.0,
        validBefore: authorization.valid_before.0,
        nonce: FixedBytes(authorization.nonce.0),
    };
    let digest = typed.eip712_signing_hash(domain);
    signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| LocalFacilitatorError::InvalidSignature(e.to_string()))
}

impl Facilitator for LocalFacilitator {
    type Error = LocalFacilitatorError;

    async fn verify(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<Payer, Self::Error> {
        let payload = Self::parse_payload(payload_bytes)?;
        if self.providers.by_network(payload.accepted.network).is_none() {
            return Err(LocalFacilitatorError::UnsupportedNetwork(requirement.network));
        }
        let from = Self::assert_valid(&payload, requirement)?;
        Ok(Payer(format!("{from:#x}")))
    }

    async fn settle(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<(), Self::Error> {
        let payload = Self::parse_payload(payload_bytes)?;
        let provider = self
            .providers
            .by_network(payload.accepted.network)
            .ok_or(LocalFacilitatorError::UnsupportedNetwork(requirement.network))?;
        Self::assert_valid(&payload, requirement)?;

        let authorization = &payload.payload.authorization;
        let asset_address: Address = requirement.asset.into();
        let contract = Erc3009Token::new(asset_address, provider.clone());

        let sig = Signature::from_raw_array(&payload.payload.signature.0)
            .map_err(|e| LocalFacilitatorError::InvalidSignature(e.to_string()))?;
        let v: u8 = if sig.v() { 28 } else { 27 };
        let r: FixedBytes<32> = FixedBytes::from(sig.r().to_be_bytes());
        let s: FixedBytes<32> = FixedBytes::from(sig.s().to_be_bytes());

        let call = contract.transferWithAuthorization(
            authorization.from.into(),
            authorization.to.into(),
            authorization.value.0,
            authorization.valid_after.0,
            authorization.valid_before.0,
            FixedBytes(authorization.nonce.0),
            v,
            r,
            s,
        );

        let wallet = EthereumWallet::from(self.relayer.clone());
        let calldata: Bytes = call.calldata().to_owned();
        let base_tx = TransactionRequest::default()
            .with_to(asset_address)
            .with_from(self.relayer.address())
            .with_input(calldata)
            .with_chain_id(requirement.network.chain_id());

        // Estimate gas; fall back to a safe constant if the node can't or won't
        // simulate the call (e.g. against a relayer balance too low to cover it).
        const FALLBACK_GAS_LIMIT: u64 = 100_000;
        let gas_limit = match provider
            .estimate_gas(base_tx.clone())
            .block(BlockId::latest())
            .await
        {
            Ok(estimate) => ((estimate as u128 * 12) / 10) as u64,
            Err(err) => {
                tracing::warn!(error = %err, "gas estimation failed, using fallback limit");
                FALLBACK_GAS_LIMIT
            }
        };

        let latest_block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| LocalFacilitatorError::Transport(e.to_string()))?
            .ok_or_else(|| LocalFacilitatorError::Transport("latest block unavailable".to_string()))?;
        let base_fee: u128 = latest_block
            .header
            .base_fee_per_gas
            .ok_or_else(|| LocalFacilitatorError::Transport("network does not report a base fee".to_string()))?
            as u128;
        let tip: u128 = 1_000_000_000;
        let fee_cap = base_fee.saturating_add(tip);

        let nonce = provider
            .get_transaction_count(self.relayer.address())
            .await
            .map_err(|e| LocalFacilitatorError::Transport(e.to_string()))?;

        let tx = base_tx
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_max_priority_fee_per_gas(tip)
            .with_max_fee_per_gas(fee_cap);

        let signed = tx
            .build(&wallet)
            .await
            .map_err(|e| LocalFacilitatorError::Transport(e.to_string()))?;
        provider
            .send_tx_envelope(signed)
            .await
            .map_err(|e| LocalFacilitatorError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_window_rejects_expired_authorization() {
        let authorization = ExactEvmPayloadAuthorization {
            from: Address::ZERO.into(),
            to: Address::ZERO.into(),
            value: crate::types::DecimalU256(U256::from(1u64)),
            valid_after: crate::types::DecimalU256(U256::from(0u64)),
            valid_before: crate::types::DecimalU256(U256::from(1u64)),
            nonce: crate::types::HexEncodedNonce([0u8; 32]),
        };
        assert!(assert_time(&authorization).is_err());
    }

    #[test]
    fn time_window_accepts_future_expiry() {
        let far_future = 4_102_444_800u64; // 2100-01-01
        let authorization = ExactEvmPayloadAuthorization {
            from: Address::ZERO.into(),
            to: Address::ZERO.into(),
            value: crate::types::DecimalU256(U256::from(1u64)),
            valid_after: crate::types::DecimalU256(U256::from(0u64)),
            valid_before: crate::types::DecimalU256(U256::from(far_future)),
            nonce: crate::types::HexEncodedNonce([0u8; 32]),
        };
        assert!(assert_time(&authorization).is_ok());
    }
}
