//! handlers for every route in the HTTP surface (spec.md §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chain_client::{Address, ChainClient};
use field_hash::Fr;
use pool_state::Pool;
use relay_executor::policy;
use relay_executor::request::RelayRequest;
use relay_executor::SimulationOutcome;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::dto::{
    BatchTransferRequestDto, BatchUnshieldRequestDto, CheckResult, CommitmentResponse,
    DiscoverRequest, DiscoverResponse, MemoResponse, NullifierStatusResponse, PathResponse,
    RelayInfoResponse, RootResponse, SimulateRequestDto, SimulateResponse, SubmitResponse,
    SwapRequestDto, TransferMultiRequestDto, TransferRequestDto, UnshieldRequestDto,
};
use crate::error::ApiError;
use crate::AppContext;

async fn pool_handle<C: ChainClient>(
    ctx: &AppContext<C>,
    pool: Address,
) -> Result<Arc<RwLock<Pool>>, ApiError> {
    ctx.pools
        .get(pool)
        .ok_or_else(|| ApiError::not_found(format!("pool {} is not registered with this relayer", pool.to_hex())))
}

fn parse_fr_param(label: &str, s: &str) -> Result<Fr, ApiError> {
    Fr::from_hex_be(s).map_err(|_| ApiError::missing_params(format!("{label} is not a valid field element")))
}

// --- pool read routes ----------------------------------------------------

pub async fn get_root<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Path(pool): Path<Address>,
) -> Result<Json<RootResponse>, ApiError> {
    let handle = pool_handle(&ctx, pool).await?;
    let (root, total_commitments) = handle.read().await.get_root();
    Ok(Json(RootResponse { root, total_commitments }))
}

pub async fn get_path<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Path((pool, leaf_index)): Path<(Address, u64)>,
) -> Result<Json<PathResponse>, ApiError> {
    let handle = pool_handle(&ctx, pool).await?;
    let path = handle.read().await.get_path(leaf_index)?;
    Ok(Json(PathResponse {
        path_elements: path.path_elements,
        path_indices: path.path_indices,
        root: path.root,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<u64>,
}

pub async fn get_memos<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Path(pool): Path<Address>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<Vec<MemoResponse>>, ApiError> {
    let handle = pool_handle(&ctx, pool).await?;
    let pool = handle.read().await;
    let memos = pool.get_memos(query.since).into_iter().map(MemoResponse::from).collect();
    Ok(Json(memos))
}

pub async fn get_nullifier_status<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Path((pool, hash)): Path<(Address, String)>,
) -> Result<Json<NullifierStatusResponse>, ApiError> {
    let nullifier = parse_fr_param("nullifierHash", &hash)?;
    let handle = pool_handle(&ctx, pool).await?;
    let spent = handle.read().await.is_nullifier_spent(nullifier);
    Ok(Json(NullifierStatusResponse { spent }))
}

pub async fn get_commitment<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Path((pool, hash)): Path<(Address, String)>,
) -> Result<Json<CommitmentResponse>, ApiError> {
    let commitment = parse_fr_param("commitment", &hash)?;
    let handle = pool_handle(&ctx, pool).await?;
    let pool = handle.read().await;
    let meta = pool
        .commitment_meta(commitment)
        .ok_or_else(|| ApiError::not_found("no commitment with that hash in this pool"))?;
    Ok(Json(CommitmentResponse::from(meta)))
}

pub async fn discover<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Json(req): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let handle = pool_handle(&ctx, req.pool).await?;
    let pool = handle.read().await;
    let mut memos: Vec<_> = pool.get_memos(req.since).into_iter().collect();
    memos.sort_by_key(|m| m.timestamp);
    let limit = req.limit.unwrap_or(memos.len()).min(memos.len());
    let next_since = memos.get(limit).map(|m| m.timestamp).or_else(|| memos.last().map(|m| m.timestamp + 1));
    let page = memos[..limit].iter().map(|m| MemoResponse::from(*m)).collect();
    Ok(Json(DiscoverResponse {
        memos: page,
        next_since,
    }))
}

// --- relay info / simulate / submit --------------------------------------

pub async fn relay_info<C: ChainClient>(State(ctx): State<Arc<AppContext<C>>>) -> Result<Json<RelayInfoResponse>, ApiError> {
    let balance = ctx.executor.native_balance().await.unwrap_or(0);
    let available = ctx.executor.is_available().await;
    let policy = ctx.executor.fee_policy();
    Ok(Json(RelayInfoResponse {
        relayer: ctx.executor.relayer(),
        native_balance: balance,
        available,
        min_fee_floor: policy.min_fee_floor.to_string(),
        ceiling_bps: policy.ceiling_bps,
    }))
}

async fn run_simulation<C: ChainClient>(ctx: &AppContext<C>, request: RelayRequest) -> Json<SimulateResponse> {
    let mut checks = Vec::new();

    let shape = policy::gate_shape(&request);
    checks.push(CheckResult {
        name: "shape",
        passed: shape.is_ok(),
        detail: shape.as_ref().err().map(ToString::to_string),
    });
    if let Err(e) = shape {
        return Json(SimulateResponse {
            would_pass: false,
            decoded_error: Some(e.to_string()),
            estimated_fee: None,
            suggestion: Some("fix the request shape and resubmit".into()),
            checks,
        });
    }

    match ctx.executor.simulate(&request).await {
        Ok(SimulationOutcome::Ok) => Json(SimulateResponse {
            would_pass: true,
            decoded_error: None,
            estimated_fee: request.fee().map(|f| f.to_string()),
            suggestion: None,
            checks,
        }),
        Ok(SimulationOutcome::Reverted(revert)) => Json(SimulateResponse {
            would_pass: false,
            decoded_error: Some(revert.to_string()),
            estimated_fee: None,
            suggestion: Some("the pool contract rejected the call; see decodedError".into()),
            checks,
        }),
        Err(e) => Json(SimulateResponse {
            would_pass: false,
            decoded_error: Some(e.to_string()),
            estimated_fee: None,
            suggestion: None,
            checks,
        }),
    }
}

/// dry-runs any of the six relay operations, discriminated by the body's
/// `operation` tag (spec.md §6).
pub async fn simulate<C: ChainClient>(
    State(ctx): State<Arc<AppContext<C>>>,
    Json(dto): Json<SimulateRequestDto>,
) -> Result<Json<SimulateResponse>, ApiError> {
    Ok(run_simulation(&ctx, dto.into_domain()?).await)
}

macro_rules! submit_route {
    ($name:ident, $dto:ty) => {
        pub async fn $name<C: ChainClient>(
            State(ctx): State<Arc<AppContext<C>>>,
            Json(dto): Json<$dto>,
        ) -> Result<Json<SubmitResponse>, ApiError> {
            let request = dto.into_domain()?;
            let outcome = ctx.executor.submit(request).await?;
            Ok(Json(SubmitResponse {
                tx_hash: outcome.tx_hash,
                leaf_indices: outcome.leaf_indices,
                receipt_seen: outcome.receipt_seen,
                duplicate: outcome.duplicate,
                individual_txs: outcome.individual_txs,
                fallback: outcome.fallback,
            }))
        }
    };
}

submit_route!(submit_unshield, UnshieldRequestDto);
submit_route!(submit_transfer, TransferRequestDto);
submit_route!(submit_transfer_multi, TransferMultiRequestDto);
submit_route!(submit_swap, SwapRequestDto);
submit_route!(submit_batch_transfer, BatchTransferRequestDto);
submit_route!(submit_batch_unshield, BatchUnshieldRequestDto);
