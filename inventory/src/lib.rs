// ============================================================================
// PIPESTOCK - INVENTORY CORE
// ============================================================================
// Module: inventory/src/lib.rs
// Description: Aggregate inventory engine for HDPE rolls and sprinkler
//              bundles: stock, pieces, the seven operations, revert, queries
// ============================================================================

pub mod models;
pub mod services;

pub use models::*;
pub use services::{
    DispatchService, ProductionService, QueryService, ReturnService, RevertService, ScrapService,
    StockFilter, TimelineFilter, TransformService,
};
