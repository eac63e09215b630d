//! the HTTP surface over a pool registry and a relay executor (spec.md
//! §6). Grounded on the teacher's `http_verifier_server` example: an
//! `AppContext` held behind `Arc`, handlers returning typed `Json<T>`, a
//! `Router` wired up with CORS and tracing layers and served with
//! `axum::serve`.

pub mod dto;
pub mod error;
pub mod rate_limit;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chain_client::ChainClient;
use pool_state::PoolRegistry;
use relay_executor::Executor;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::rate_limit::RateLimiter;

pub struct AppContext<C: ChainClient> {
    pub pools: Arc<PoolRegistry>,
    pub executor: Arc<Executor<C>>,
    pub rate_limiter: RateLimiter,
}

impl<C: ChainClient> AsRef<RateLimiter> for AppContext<C> {
    fn as_ref(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

impl<C: ChainClient> AppContext<C> {
    pub fn new(pools: Arc<PoolRegistry>, executor: Arc<Executor<C>>) -> Self {
        Self {
            pools,
            executor,
            rate_limiter: RateLimiter::new(),
        }
    }
}

/// builds the full route table. `C` stays generic so the relay binary can
/// serve a real `EvmRpcClient` while integration tests serve a fake chain.
pub fn build_router<C: ChainClient + 'static>(ctx: Arc<AppContext<C>>) -> Router {
    let read_routes = Router::new()
        .route("/pool/:pool/root", get(routes::get_root::<C>))
        .route("/pool/:pool/path/:leaf_index", get(routes::get_path::<C>))
        .route("/pool/:pool/memos", get(routes::get_memos::<C>))
        .route("/pool/:pool/nullifier/:hash", get(routes::get_nullifier_status::<C>))
        .route("/pool/:pool/commitment/:hash", get(routes::get_commitment::<C>))
        .route("/discover", post(routes::discover::<C>))
        .route("/relay/info", get(routes::relay_info::<C>))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            rate_limit::read_only_rate_limit::<AppContext<C>>,
        ));

    let relay_routes = Router::new()
        .route("/relay/simulate", post(routes::simulate::<C>))
        .route("/relay/unshield", post(routes::submit_unshield::<C>))
        .route("/relay/transfer", post(routes::submit_transfer::<C>))
        .route("/relay/transfer-multi", post(routes::submit_transfer_multi::<C>))
        .route("/relay/swap", post(routes::submit_swap::<C>))
        .route("/relay/batch-transfer", post(routes::submit_batch_transfer::<C>))
        .route("/relay/batch-unshield", post(routes::submit_batch_unshield::<C>))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            rate_limit::relay_rate_limit::<AppContext<C>>,
        ));

    Router::new()
        .merge(read_routes)
        .merge(relay_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// serves `router` on `listen_addr`, passing the caller's socket address
/// through so the rate limiter can key buckets per IP (spec.md §6 "Rate
/// limiting"; relies on `into_make_service_with_connect_info`).
pub async fn serve(router: Router, listen_addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use chain_client::{Address, BlockHeader, LogEntry, LogFilter, TransactionReceipt, TxHash};
    use relay_executor::ExecutorConfig;
    use tower::ServiceExt;

    fn peer() -> SocketAddr {
        "203.0.113.1:1234".parse().unwrap()
    }

    fn request(uri: impl AsRef<str>) -> Request<Body> {
        let mut req = Request::builder().uri(uri.as_ref()).body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(peer()));
        req
    }

    struct FakeChain;

    #[async_trait::async_trait]
    impl ChainClient for FakeChain {
        async fn get_block_number(&self) -> chain_client::Result<u64> {
            Ok(0)
        }
        async fn get_logs(&self, _filter: &LogFilter) -> chain_client::Result<Vec<LogEntry>> {
            Ok(vec![])
        }
        async fn call(&self, _to: Address, _data: &[u8]) -> chain_client::Result<Vec<u8>> {
            Ok(vec![1])
        }
        async fn send_raw_transaction(&self, _raw: &[u8]) -> chain_client::Result<TxHash> {
            Ok(TxHash([9u8; 32]))
        }
        async fn get_transaction_receipt(&self, _hash: TxHash) -> chain_client::Result<Option<TransactionReceipt>> {
            Ok(None)
        }
        async fn get_transaction_count(&self, _address: Address) -> chain_client::Result<u64> {
            Ok(0)
        }
        async fn gas_price(&self) -> chain_client::Result<u128> {
            Ok(1)
        }
        async fn get_block_header(&self, _number: u64) -> chain_client::Result<Option<BlockHeader>> {
            Ok(None)
        }
        async fn get_balance(&self, _address: Address) -> chain_client::Result<u128> {
            Ok(u128::MAX)
        }
    }

    async fn test_context() -> Arc<AppContext<FakeChain>> {
        let pool_addr = Address([1u8; 20]);
        let mut pools = PoolRegistry::new();
        pools.register(pool_addr, Default::default());
        let pools = Arc::new(pools);
        let config = ExecutorConfig {
            relayer: Address([3u8; 20]),
            private_key: [7u8; 32],
            chain_id: 1,
            gas_floor: 1,
            gas_limit: relay_executor::DEFAULT_GAS_LIMIT,
            fee_policy: Default::default(),
        };
        let executor = Executor::new(Arc::new(FakeChain), pools.clone(), config).await.unwrap();
        Arc::new(AppContext::new(pools, Arc::new(executor)))
    }

    #[tokio::test]
    async fn root_route_returns_zero_state_for_fresh_pool() {
        let ctx = test_context().await;
        let pool = Address([1u8; 20]);
        let app = build_router(ctx);
        let response = app
            .oneshot(request(format!("/pool/{}/root", pool.to_hex())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_pool_returns_error_envelope() {
        let ctx = test_context().await;
        let app = build_router(ctx);
        let response = app
            .oneshot(request(format!("/pool/{}/root", Address([99u8; 20]).to_hex())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn relay_info_reports_availability() {
        let ctx = test_context().await;
        let app = build_router(ctx);
        let response = app.oneshot(request("/relay/info")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
