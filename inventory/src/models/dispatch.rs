// ============================================================================
// PIPESTOCK - DISPATCH MODELS
// ============================================================================
// Module: inventory/src/models/dispatch.rs
// Description: Outbound dispatch documents and their line items
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    Dispatched,
    Reverted,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Dispatched => "DISPATCHED",
            DispatchStatus::Reverted => "REVERTED",
        }
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DISPATCHED" => Ok(DispatchStatus::Dispatched),
            "REVERTED" => Ok(DispatchStatus::Reverted),
            other => Err(format!("unknown dispatch status: {other}")),
        }
    }
}

impl TryFrom<String> for DispatchStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What a dispatch line consumes. CUT_PIECE names one specific piece;
/// CUT_ROLL consumes N pieces in insertion order; SPARE_PIECES consumes
/// physical pieces out of named spare groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchItemType {
    FullRoll,
    CutRoll,
    CutPiece,
    Bundle,
    SparePieces,
}

impl DispatchItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchItemType::FullRoll => "FULL_ROLL",
            DispatchItemType::CutRoll => "CUT_ROLL",
            DispatchItemType::CutPiece => "CUT_PIECE",
            DispatchItemType::Bundle => "BUNDLE",
            DispatchItemType::SparePieces => "SPARE_PIECES",
        }
    }
}

impl std::str::FromStr for DispatchItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL_ROLL" => Ok(DispatchItemType::FullRoll),
            "CUT_ROLL" => Ok(DispatchItemType::CutRoll),
            "CUT_PIECE" => Ok(DispatchItemType::CutPiece),
            "BUNDLE" => Ok(DispatchItemType::Bundle),
            "SPARE_PIECES" => Ok(DispatchItemType::SparePieces),
            other => Err(format!("unknown dispatch item type: {other}")),
        }
    }
}

impl TryFrom<String> for DispatchItemType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for DispatchItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dispatch {
    pub id: Uuid,
    pub dispatch_number: String,
    pub customer_id: Uuid,
    pub bill_to_id: Option<Uuid>,
    pub transport_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: DispatchStatus,
    pub dispatch_date: DateTime<Utc>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DispatchItem {
    pub id: Uuid,
    pub dispatch_id: Uuid,
    pub stock_id: Uuid,
    pub product_variant_id: Uuid,
    #[sqlx(try_from = "String")]
    pub item_type: DispatchItemType,
    pub quantity: i32,
    pub length_meters: Option<Decimal>,
    pub cut_piece_id: Option<Uuid>,
    pub spare_piece_ids: Option<Vec<Uuid>>,
    pub piece_count: Option<i32>,
    pub piece_length_meters: Option<Decimal>,
    pub bundle_size: Option<i32>,
    pub pieces_per_bundle: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
