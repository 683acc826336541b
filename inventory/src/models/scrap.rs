// ============================================================================
// PIPESTOCK - SCRAP MODELS
// ============================================================================
// Module: inventory/src/models/scrap.rs
// Description: Scrap documents with per-item and per-piece snapshots
// ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pieces::PieceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrapStatus {
    Scrapped,
    Cancelled,
}

impl ScrapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapStatus::Scrapped => "SCRAPPED",
            ScrapStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for ScrapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCRAPPED" => Ok(ScrapStatus::Scrapped),
            "CANCELLED" => Ok(ScrapStatus::Cancelled),
            other => Err(format!("unknown scrap status: {other}")),
        }
    }
}

impl TryFrom<String> for ScrapStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Scrap {
    pub id: Uuid,
    pub scrap_number: String,
    pub scrap_date: NaiveDate,
    pub reason: String,
    #[sqlx(try_from = "String")]
    pub status: ScrapStatus,
    pub total_quantity: i32,
    pub estimated_loss: Option<Decimal>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Snapshot of the stock row at scrap time; revert restores from this.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScrapItem {
    pub id: Uuid,
    pub scrap_id: Uuid,
    pub stock_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub product_variant_id: Option<Uuid>,
    pub item_type: String,
    pub quantity_scrapped: i32,
    pub original_quantity: i32,
    pub original_status: String,
    pub length_per_unit: Option<Decimal>,
    pub piece_length_meters: Option<Decimal>,
    pub estimated_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// One scrapped piece, keyed by `original_piece_id` so revert can flip the
/// exact rows back to IN_STOCK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapPiece {
    pub id: Uuid,
    pub scrap_item_id: Uuid,
    pub original_piece_id: Uuid,
    pub piece_type: PieceKind,
    pub length_meters: Option<Decimal>,
    pub piece_count: Option<i32>,
    pub created_at: DateTime<Utc>,
}
