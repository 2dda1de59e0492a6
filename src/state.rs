use crate::auction::engine::AuctionEngine;
use crate::realtime::RealtimeHub;
use crate::scheduler::SettlementScheduler;
use std::sync::Arc;

/// Shared handles given to every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuctionEngine>,
    pub scheduler: Arc<SettlementScheduler>,
    pub hub: Arc<RealtimeHub>,
}
