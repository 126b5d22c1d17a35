//! Process configuration: CLI flags with environment-variable fallback, loaded and
//! validated exactly once at startup.

use clap::Parser;
use std::path::PathBuf;

use crate::error::ConfigError;

/// CLI/environment arguments for the gateway server.
///
/// Every flag has a matching `env = "..."` fallback so the binary can be configured
/// entirely from the environment (and a `.env` file) in a container deployment.
#[derive(Parser, Debug, Clone)]
#[command(name = "x402-gate")]
#[command(about = "Payment-gated JSON-RPC proxy speaking the x402 exact-scheme flow")]
pub struct CliArgs {
    /// Optional path to a `.env` file to load before parsing.
    #[arg(long, short, env = "CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: String,

    #[arg(long, env = "BIND_PORT", default_value_t = 8080)]
    pub bind_port: u16,

    /// Upstream JSON-RPC endpoint the proxy forwards authorized requests to.
    #[arg(long, env = "UPSTREAM_URL")]
    pub upstream_url: String,

    /// Base URL of an external facilitator. Mutually exclusive with `--settlement-rpc-url`.
    #[arg(long, env = "FACILITATOR_URL")]
    pub facilitator_url: Option<String>,

    /// JSON-RPC endpoint of the settlement chain, for the Local Facilitator.
    #[arg(long, env = "SETTLEMENT_RPC_URL")]
    pub settlement_rpc_url: Option<String>,

    /// Relayer private key used to sign settlement transactions, for the Local Facilitator.
    #[arg(long, env = "RELAYER_PRIVATE_KEY")]
    pub relayer_private_key: Option<String>,

    /// CAIP-2 network identifier, e.g. `eip155:84532`.
    #[arg(long, env = "NETWORK")]
    pub network: String,

    /// ERC-3009-compatible stablecoin contract address.
    #[arg(long, env = "ASSET_ADDRESS")]
    pub asset_address: String,

    /// Address that receives settled payments.
    #[arg(long, env = "PAY_TO")]
    pub pay_to: String,

    /// Required payment amount, in atomic units of the asset.
    #[arg(long, env = "AMOUNT")]
    pub amount: String,

    /// EIP-712 domain name advertised for the asset.
    #[arg(long, env = "EIP712_NAME")]
    pub eip712_name: String,

    /// EIP-712 domain version advertised for the asset.
    #[arg(long, env = "EIP712_VERSION")]
    pub eip712_version: String,

    /// Public URL of this gateway, echoed in the `402` advertisement's resource field.
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080/")]
    pub gateway_url: String,

    /// HMAC-SHA256 signing secret for credit-tokens.
    #[arg(long, env = "TOKEN_SECRET")]
    pub token_secret: String,

    #[arg(long, env = "TOKEN_LIFETIME_SECS", default_value_t = 3600)]
    pub token_lifetime_secs: u64,

    /// Number of RPC calls a single successful payment buys.
    #[arg(long, env = "ALLOWANCE_PER_PAYMENT", default_value_t = 100)]
    pub allowance_per_payment: i64,
}

/// Which facilitator implementation this process runs.
#[derive(Debug, Clone)]
pub enum FacilitatorMode {
    Remote { base_url: String },
    Local { rpc_url: String, relayer_key: String },
    /// No facilitator configured: the payment middleware degrades to a transparent
    /// pass-through, forwarding every request to the upstream unchecked. A deliberate
    /// escape hatch for running this binary as a plain reverse proxy.
    PassThrough,
}

/// Validated configuration. Every field here is guaranteed present and well-formed;
/// nothing downstream re-validates it.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,
    pub upstream_url: String,
    pub facilitator_mode: FacilitatorMode,
    pub network: String,
    pub asset_address: String,
    pub pay_to: String,
    pub amount: String,
    pub eip712_name: String,
    pub eip712_version: String,
    pub gateway_url: String,
    pub token_secret: String,
    pub token_lifetime_secs: u64,
    pub allowance_per_payment: i64,
}

impl TryFrom<CliArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let facilitator_mode = match (args.facilitator_url, args.settlement_rpc_url, args.relayer_private_key) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(ConfigError::ConflictingFacilitatorMode);
            }
            (Some(base_url), None, None) => FacilitatorMode::Remote { base_url },
            (None, Some(rpc_url), Some(relayer_key)) => FacilitatorMode::Local { rpc_url, relayer_key },
            (None, Some(_), None) => {
                return Err(ConfigError::MissingField {
                    field: "relayer-private-key",
                    context: "settlement-rpc-url is set",
                });
            }
            (None, None, Some(_)) => {
                return Err(ConfigError::MissingField {
                    field: "settlement-rpc-url",
                    context: "relayer-private-key is set",
                });
            }
            (None, None, None) => FacilitatorMode::PassThrough,
        };

        if args.token_secret.len() < 16 {
            return Err(ConfigError::InvalidValue {
                field: "token-secret",
                source: "must be at least 16 bytes".into(),
            });
        }

        Ok(Config {
            bind_host: args.bind_host,
            bind_port: args.bind_port,
            upstream_url: args.upstream_url,
            facilitator_mode,
            network: args.network,
            asset_address: args.asset_address,
            pay_to: args.pay_to,
            amount: args.amount,
            eip712_name: args.eip712_name,
            eip712_version: args.eip712_version,
            gateway_url: args.gateway_url,
            token_secret: args.token_secret,
            token_lifetime_secs: args.token_lifetime_secs,
            allowance_per_payment: args.allowance_per_payment,
        })
    }
}

impl Config {
    /// Parses CLI/env arguments and validates them into a [`Config`].
    pub fn load() -> Result<Self, ConfigError> {
        Config::try_from(CliArgs::parse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            config: None,
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8080,
            upstream_url: "http://localhost:9000".to_string(),
            facilitator_url: None,
            settlement_rpc_url: None,
            relayer_private_key: None,
            network: "eip155:84532".to_string(),
            asset_address: "0x0000000000000000000000000000000000000001".to_string(),
            pay_to: "0x0000000000000000000000000000000000000002".to_string(),
            amount: "1000".to_string(),
            eip712_name: "USDC".to_string(),
            eip712_version: "2".to_string(),
            gateway_url: "http://localhost:8080/".to_string(),
            token_secret: "a-sixteen-byte-secret!!".to_string(),
            token_lifetime_secs: 3600,
            allowance_per_payment: 100,
        }
    }

    #[test]
    fn defaults_to_pass_through_when_unconfigured() {
        let args = base_args();
        let config = Config::try_from(args).unwrap();
        assert!(matches!(config.facilitator_mode, FacilitatorMode::PassThrough));
    }

    #[test]
    fn accepts_remote_facilitator_mode() {
        let mut args = base_args();
        args.facilitator_url = Some("https://facilitator.example".to_string());
        let config = Config::try_from(args).unwrap();
        assert!(matches!(config.facilitator_mode, FacilitatorMode::Remote { .. }));
    }

    #[test]
    fn rejects_mixed_facilitator_modes() {
        let mut args = base_args();
        args.facilitator_url = Some("https://facilitator.example".to_string());
        args.settlement_rpc_url = Some("https://rpc.example".to_string());
        assert!(matches!(
            Config::try_from(args),
            Err(ConfigError::ConflictingFacilitatorMode)
        ));
    }

    #[test]
    fn rejects_short_token_secret() {
        let mut args = base_args();
        args.facilitator_url = Some("https://facilitator.example".to_string());
        args.token_secret = "short".to_string();
        assert!(Config::try_from(args).is_err());
    }
}
