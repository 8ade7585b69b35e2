//! Domain-agnostic bulk-operation engine (§4.6). A `BulkAdapter` supplies
//! the per-tool fetch/execute primitives; this module enforces the turn
//! budget (one list-page call, one batch call) and the placeholder
//! bookkeeping that keeps `processed + remaining == total`.

pub mod presenter;

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use orchestrator_services::error::{ErrorKind, ServiceError};

pub const MIN_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 20;
pub const MAX_TOTAL_ITEMS: u64 = 200;

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// Everything an adapter computed about a request before any network call.
/// `query` must be deterministic to build: its construction never itself
/// issues a network call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedContext {
    pub tool_name: String,
    pub action: String,
    pub query: String,
    pub action_params: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
    pub id: String,
    pub display_name: String,
    pub raw_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub item_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Zero-sized stand-in for an item not yet fetched. Its only role is to
/// make `total - processed == remaining_items.len()` hold without the
/// state needing to hold every real identifier up front.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Placeholder;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkState {
    pub op_id: String,
    pub domain: String,
    pub action: String,
    pub batch_size: usize,
    pub total: u64,
    pub processed: u64,
    pub remaining_items: Vec<Placeholder>,
    pub metadata: Value,
    pub buffer: VecDeque<BulkItem>,
}

impl BulkState {
    pub fn remaining(&self) -> u64 {
        self.remaining_items.len() as u64
    }
}

/// Per-tool capability set a bulk operation drives. `next_batch`'s `offset`
/// is advisory; a paginated adapter (mail) ignores it in favor of a cursor
/// carried in `ctx.metadata`.
#[async_trait]
pub trait BulkAdapter: Send + Sync {
    type Params: Send + Sync;

    async fn prepare(&self, params: &Self::Params) -> Result<PreparedContext>;
    async fn total_count(&self, ctx: &PreparedContext) -> Result<u64>;
    async fn next_batch(&self, ctx: &mut PreparedContext, size: usize) -> Result<Vec<BulkItem>>;
    async fn execute_batch(&self, items: &[BulkItem], ctx: &mut PreparedContext) -> Result<Vec<BulkItemResult>>;
}

#[derive(Debug)]
pub enum StartOutcome {
    Started { state: BulkState, ctx: PreparedContext },
    TooMany { estimate: u64 },
    Empty,
}

/// Start a bulk operation: `prepare` (no network), then exactly one
/// `next_batch` call to learn the estimate. No items are processed here.
pub async fn start<A: BulkAdapter>(
    adapter: &A,
    params: &A::Params,
    domain: &str,
    action: &str,
    op_id: String,
    requested_batch_size: usize,
) -> Result<StartOutcome> {
    let mut ctx = adapter.prepare(params).await?;
    let first_page = adapter.next_batch(&mut ctx, clamp_batch_size(requested_batch_size)).await?;
    let estimate = adapter.total_count(&ctx).await?;

    if estimate > MAX_TOTAL_ITEMS {
        return Ok(StartOutcome::TooMany { estimate });
    }
    if estimate == 0 {
        return Ok(StartOutcome::Empty);
    }

    let state = BulkState {
        op_id,
        domain: domain.to_string(),
        action: action.to_string(),
        batch_size: clamp_batch_size(requested_batch_size),
        total: estimate,
        processed: 0,
        remaining_items: vec![Placeholder; estimate as usize],
        metadata: ctx.metadata.clone(),
        buffer: first_page.into(),
    };
    Ok(StartOutcome::Started { state, ctx })
}

#[derive(Debug)]
pub enum ContinueOutcome {
    Progressed { state: BulkState, results: Vec<BulkItemResult> },
    Completed { state: BulkState, results: Vec<BulkItemResult> },
    PermissionDenied(String),
}

/// Advance exactly one batch: at most one list-page call (only if the
/// buffer is short) and exactly one execute-batch call.
pub async fn continue_batch<A: BulkAdapter>(
    adapter: &A,
    mut state: BulkState,
    mut ctx: PreparedContext,
) -> Result<ContinueOutcome> {
    if state.buffer.len() < state.batch_size {
        let needed = state.batch_size - state.buffer.len();
        let fetched = adapter.next_batch(&mut ctx, needed).await?;
        state.buffer.extend(fetched);
    }

    let take = state.batch_size.min(state.buffer.len());
    let items: Vec<BulkItem> = (0..take).filter_map(|_| state.buffer.pop_front()).collect();

    let results = match adapter.execute_batch(&items, &mut ctx).await {
        Ok(results) => results,
        Err(err) => {
            if let Some(service_err) = err.downcast_ref::<ServiceError>() {
                if service_err.kind() == ErrorKind::Auth {
                    return Ok(ContinueOutcome::PermissionDenied(service_err.to_string()));
                }
            }
            return Err(err);
        }
    };

    state.processed += take as u64;
    let new_len = state.remaining_items.len().saturating_sub(take);
    state.remaining_items.truncate(new_len);
    state.metadata = ctx.metadata.clone();

    if state.remaining() == 0 {
        Ok(ContinueOutcome::Completed { state, results })
    } else {
        Ok(ContinueOutcome::Progressed { state, results })
    }
}
