// ============================================================================
// PIPESTOCK - DOMAIN MODELS
// ============================================================================
// Module: inventory/src/models/mod.rs
// Description: Entity and request/response models for the inventory core
// ============================================================================

pub mod batch;
pub mod dispatch;
pub mod pieces;
pub mod requests;
pub mod returns;
pub mod scrap;
pub mod stock;
pub mod transactions;

pub use batch::{Batch, Brand, Customer, ProductCategory, ProductType, ProductVariant};
pub use dispatch::{Dispatch, DispatchItem, DispatchItemType, DispatchStatus};
pub use pieces::{HdpeCutPiece, PieceKind, PieceStatus, SprinklerSparePiece};
pub use requests::*;
pub use returns::{Return, ReturnBundle, ReturnItem, ReturnItemType, ReturnRoll, ReturnStatus};
pub use scrap::{Scrap, ScrapItem, ScrapPiece, ScrapStatus};
pub use stock::{InventoryStock, StockStatus, StockType};
pub use transactions::{
    CutPieceDetail, InventoryTransaction, StockSnapshotEntry, TransactionHandle, TransactionType,
};
