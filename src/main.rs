//! Process bootstrap: load configuration, wire the payment gateway's components
//! together, and serve until a shutdown signal arrives.

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use dashmap::DashMap;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use url::Url;

use x402_gate::advertisement::Advertisement;
use x402_gate::config::{Config, FacilitatorMode};
use x402_gate::counter_store::CounterStore;
use x402_gate::facilitator::local::{LocalFacilitator, LocalFacilitatorError, ProviderMap};
use x402_gate::facilitator::remote::{RemoteFacilitator, RemoteFacilitatorError};
use x402_gate::facilitator::{Facilitator, Payer};
use x402_gate::middleware::{GatewayState, paygate};
use x402_gate::network::Network;
use x402_gate::proxy::{UpstreamProxy, proxy_handler};
use x402_gate::sig_down::SigDown;
use x402_gate::token_manager::TokenManager;
use x402_gate::types::{Eip712Extra, PaymentRequirement, Scheme};

/// Unifies the two facilitator implementations behind one concrete type so the
/// router can be built once regardless of which mode this process runs in.
#[derive(Clone)]
enum AnyFacilitator {
    Remote(RemoteFacilitator),
    Local(Arc<LocalFacilitator>),
}

#[derive(Debug, thiserror::Error)]
enum AnyFacilitatorError {
    #[error(transparent)]
    Remote(#[from] RemoteFacilitatorError),
    #[error(transparent)]
    Local(#[from] LocalFacilitatorError),
}

impl Facilitator for AnyFacilitator {
    type Error = AnyFacilitatorError;

    async fn verify(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<Payer, Self::Error> {
        match self {
            AnyFacilitator::Remote(f) => Ok(f.verify(payload_bytes, requirement).await?),
            AnyFacilitator::Local(f) => Ok(f.verify(payload_bytes, requirement).await?),
        }
    }

    async fn settle(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> Result<(), Self::Error> {
        match self {
            AnyFacilitator::Remote(f) => Ok(f.settle(payload_bytes, requirement).await?),
            AnyFacilitator::Local(f) => Ok(f.settle(payload_bytes, requirement).await?),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    x402_gate::telemetry::init();

    let config = Config::load().unwrap_or_else(|err| {
        tracing::error!(error = %err, "invalid configuration");
        std::process::exit(1);
    });

    let network: Network = config.network.parse().unwrap_or_else(|err| {
        tracing::error!(error = %err, "invalid network identifier");
        std::process::exit(1);
    });
    let asset = config.asset_address.parse().unwrap_or_else(|_| {
        tracing::error!("invalid asset address");
        std::process::exit(1);
    });
    let pay_to = config.pay_to.parse().unwrap_or_else(|_| {
        tracing::error!("invalid pay-to address");
        std::process::exit(1);
    });

    let requirement = PaymentRequirement {
        scheme: Scheme::Exact,
        network,
        amount: config.amount.clone(),
        asset,
        pay_to,
        max_timeout_seconds: 60,
        extra: Eip712Extra {
            name: config.eip712_name.clone(),
            version: config.eip712_version.clone(),
        },
    };
    let advertisement = Arc::new(Advertisement::new(
        &config.gateway_url,
        "JSON-RPC access, paid per credit block",
        requirement,
    ));

    let facilitator: Option<AnyFacilitator> = match &config.facilitator_mode {
        FacilitatorMode::Remote { base_url } => {
            let remote = RemoteFacilitator::new(base_url).unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to configure remote facilitator");
                std::process::exit(1);
            });
            Some(AnyFacilitator::Remote(remote))
        }
        FacilitatorMode::Local { rpc_url, relayer_key } => {
            let rpc_url = Url::from_str(rpc_url).unwrap_or_else(|err| {
                tracing::error!(error = %err, "invalid settlement RPC URL");
                std::process::exit(1);
            });
            let mut providers = ProviderMap::new();
            providers.insert(network, rpc_url);
            let local = LocalFacilitator::new(providers, relayer_key).unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to configure local facilitator");
                std::process::exit(1);
            });
            Some(AnyFacilitator::Local(Arc::new(local)))
        }
        FacilitatorMode::PassThrough => {
            tracing::info!("no facilitator configured, running as a pass-through proxy");
            None
        }
    };

    let counter_store = Arc::new(CounterStore::new());
    let token_manager = Arc::new(TokenManager::new(
        counter_store,
        config.token_secret.as_bytes(),
        config.token_lifetime_secs,
    ));

    let gateway_state = GatewayState {
        token_manager,
        facilitator,
        advertisement,
        replay_set: Arc::new(DashMap::new()),
        allowance_per_payment: config.allowance_per_payment,
    };

    let upstream_url = Url::parse(&config.upstream_url).unwrap_or_else(|err| {
        tracing::error!(error = %err, "invalid upstream URL");
        std::process::exit(1);
    });
    let upstream_proxy = UpstreamProxy::new(upstream_url, std::time::Duration::from_secs(30));

    let payment_router = Router::new()
        .route("/", axum::routing::post(proxy_handler))
        .with_state(upstream_proxy)
        .layer(axum::middleware::from_fn_with_state(
            gateway_state,
            paygate,
        ));
    let health_router = Router::new().route("/health", get(|| async { "ok" }));

    let app = payment_router
        .merge(health_router)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        );

    let addr = SocketAddr::new(
        config.bind_host.parse().unwrap_or_else(|err| {
            tracing::error!(error = %err, "invalid bind host");
            std::process::exit(1);
        }),
        config.bind_port,
    );
    tracing::info!(%addr, "starting x402 payment gateway");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, %addr, "failed to bind listener");
        std::process::exit(1);
    });

    let sig_down = SigDown::try_new().unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to install signal handlers");
        std::process::exit(1);
    });
    let cancellation_token = sig_down.cancellation_token();
    let shutdown = async move { cancellation_token.cancelled().await };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}
