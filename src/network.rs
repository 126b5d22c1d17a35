//! CAIP-2 chain identifiers for the `eip155` (EVM) namespace.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

pub const EIP155_NAMESPACE: &str = "eip155";

/// A CAIP-2 identifier of the form `eip155:<decimal chain id>`, e.g. `eip155:84532`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Network(u64);

#[derive(Debug, thiserror::Error)]
pub enum NetworkFormatError {
    #[error("expected '{EIP155_NAMESPACE}:<chain id>', got {0:?}")]
    BadFormat(String),
    #[error("chain id {0:?} is not a valid decimal number")]
    BadChainId(String),
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        self.0
    }

    pub fn new(chain_id: u64) -> Self {
        Network(chain_id)
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{EIP155_NAMESPACE}:{}", self.0)
    }
}

impl FromStr for Network {
    type Err = NetworkFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| NetworkFormatError::BadFormat(s.to_string()))?;
        if namespace != EIP155_NAMESPACE {
            return Err(NetworkFormatError::BadFormat(s.to_string()));
        }
        let chain_id = reference
            .parse::<u64>()
            .map_err(|_| NetworkFormatError::BadChainId(reference.to_string()))?;
        Ok(Network(chain_id))
    }
}

impl Serialize for Network {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Network::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_caip2() {
        let network: Network = "eip155:84532".parse().expect("valid");
        assert_eq!(network.chain_id(), 84532);
        assert_eq!(network.to_string(), "eip155:84532");
    }

    #[test]
    fn rejects_unknown_namespace() {
        assert!("solana:84532".parse::<Network>().is_err());
    }

    #[test]
    fn rejects_non_decimal_reference() {
        assert!("eip155:base-sepolia".parse::<Network>().is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!("eip15584532".parse::<Network>().is_err());
    }
}
