// ============================================================================
// PIPESTOCK - RETURN MODELS
// ============================================================================
// Module: inventory/src/models/returns.rs
// Description: Customer return documents; each return creates fresh batches
// ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnStatus {
    Received,
    Reverted,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Received => "RECEIVED",
            ReturnStatus::Reverted => "REVERTED",
        }
    }
}

impl std::str::FromStr for ReturnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(ReturnStatus::Received),
            "REVERTED" => Ok(ReturnStatus::Reverted),
            other => Err(format!("unknown return status: {other}")),
        }
    }
}

impl TryFrom<String> for ReturnStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of returned goods on a single return line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnItemType {
    FullRoll,
    CutRoll,
    Bundle,
    SparePieces,
}

impl ReturnItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnItemType::FullRoll => "FULL_ROLL",
            ReturnItemType::CutRoll => "CUT_ROLL",
            ReturnItemType::Bundle => "BUNDLE",
            ReturnItemType::SparePieces => "SPARE_PIECES",
        }
    }
}

impl std::str::FromStr for ReturnItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL_ROLL" => Ok(ReturnItemType::FullRoll),
            "CUT_ROLL" => Ok(ReturnItemType::CutRoll),
            "BUNDLE" => Ok(ReturnItemType::Bundle),
            "SPARE_PIECES" => Ok(ReturnItemType::SparePieces),
            other => Err(format!("unknown return item type: {other}")),
        }
    }
}

impl TryFrom<String> for ReturnItemType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Return {
    pub id: Uuid,
    pub return_number: String,
    pub customer_id: Uuid,
    pub return_date: NaiveDate,
    pub notes: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ReturnStatus,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReturnItem {
    pub id: Uuid,
    pub return_id: Uuid,
    pub product_variant_id: Uuid,
    pub batch_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub item_type: ReturnItemType,
    pub quantity: i32,
    pub piece_count: Option<i32>,
    pub piece_length_meters: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One returned roll (full or cut); points at the stock row it landed in.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReturnRoll {
    pub id: Uuid,
    pub return_item_id: Uuid,
    pub stock_id: Option<Uuid>,
    pub length_meters: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One returned bundle; points at the stock row it landed in.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReturnBundle {
    pub id: Uuid,
    pub return_item_id: Uuid,
    pub stock_id: Option<Uuid>,
    pub bundle_size: i32,
    pub piece_length_meters: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}
