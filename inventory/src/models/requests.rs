// ============================================================================
// PIPESTOCK - OPERATION REQUEST/RESPONSE MODELS
// ============================================================================
// Module: inventory/src/models/requests.rs
// Description: Inputs and results for the seven inventory operations
// ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use super::dispatch::DispatchItemType;
use super::returns::ReturnItemType;
use super::stock::StockType;
use super::transactions::TransactionHandle;

/// The three production shapes of a batch. Cut rolls are HDPE only; bundles
/// are sprinkler only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RollConfiguration {
    /// N whole rolls of a standard length.
    StandardRolls {
        number_of_rolls: i32,
        length_per_roll: Decimal,
    },
    /// Pre-cut HDPE pieces, one entry per piece.
    CutRolls { cut_lengths: Vec<Decimal> },
    /// Sprinkler bundles plus optional loose spare groups.
    Bundles {
        number_of_bundles: i32,
        bundle_size: i32,
        piece_length_meters: Decimal,
        #[serde(default)]
        spare_groups: Vec<i32>,
    },
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct ProduceBatchRequest {
    pub product_type_id: Uuid,
    pub brand_id: Uuid,
    pub parameters: BTreeMap<String, String>,
    pub production_date: NaiveDate,
    pub batch_no: Option<String>,
    pub batch_code: Option<String>,
    pub configuration: RollConfiguration,
    pub weight_per_meter: Option<Decimal>,
    pub total_weight: Option<Decimal>,
    pub attachment_ref: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProduceBatchResult {
    pub batch_id: Uuid,
    pub batch_code: String,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct CutRollRequest {
    /// FULL_ROLL source, or the CUT_ROLL stock when re-cutting a piece.
    pub stock_id: Uuid,
    /// Required when re-cutting an existing cut piece.
    pub piece_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub cut_lengths: Vec<Decimal>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutRollResult {
    pub cut_stock_id: Uuid,
    pub piece_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct SplitBundleRequest {
    pub stock_id: Uuid,
    #[validate(length(min = 1))]
    pub pieces_to_split: Vec<i32>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitBundleResult {
    pub spare_stock_id: Uuid,
    pub piece_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct CombineSparesRequest {
    #[validate(length(min = 1))]
    pub spare_piece_ids: Vec<Uuid>,
    #[validate(range(min = 1))]
    pub bundle_size: i32,
    #[validate(range(min = 1))]
    pub number_of_bundles: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineSparesResult {
    pub bundle_stock_id: Uuid,
    pub remainder_piece_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchItemRequest {
    pub item_type: DispatchItemType,
    pub stock_id: Uuid,
    pub quantity: i32,
    /// CUT_PIECE: the specific piece being dispatched.
    pub cut_piece_id: Option<Uuid>,
    pub length_meters: Option<Decimal>,
    /// SPARE_PIECES: group ids; repeating an id N times consumes N physical
    /// pieces from that group.
    #[serde(default)]
    pub spare_piece_ids: Vec<Uuid>,
    pub piece_count: Option<i32>,
    pub piece_length_meters: Option<Decimal>,
    pub bundle_size: Option<i32>,
    pub pieces_per_bundle: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub customer_id: Uuid,
    pub bill_to_id: Option<Uuid>,
    pub transport_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    /// Backdated dispatches carry an explicit timezone offset.
    pub dispatch_date: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<DispatchItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub dispatch_id: Uuid,
    pub dispatch_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnedRoll {
    pub length_meters: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnedBundle {
    pub bundle_size: i32,
    pub piece_length_meters: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItemRequest {
    pub product_type_id: Uuid,
    pub brand_id: Uuid,
    pub parameters: BTreeMap<String, String>,
    pub item_type: ReturnItemType,
    #[serde(default)]
    pub rolls: Vec<ReturnedRoll>,
    #[serde(default)]
    pub bundles: Vec<ReturnedBundle>,
    pub piece_count: Option<i32>,
    pub piece_length_meters: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub customer_id: Uuid,
    pub return_date: NaiveDate,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<ReturnItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnResult {
    pub return_id: Uuid,
    pub return_number: String,
    pub transaction_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapItemRequest {
    pub stock_id: Uuid,
    pub item_type: StockType,
    pub quantity_to_scrap: i32,
    /// CUT_ROLL / SPARE: the piece (group) ids being scrapped.
    #[serde(default)]
    pub piece_ids: Vec<Uuid>,
    pub estimated_value: Option<Decimal>,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct ScrapRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub scrap_date: NaiveDate,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<ScrapItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapResult {
    pub scrap_id: Uuid,
    pub scrap_number: String,
    pub total_quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertOutcome {
    pub handle: TransactionHandle,
    pub details: String,
}
