// ============================================================================
// PIPESTOCK - AGGREGATE STOCK MODELS
// ============================================================================
// Module: inventory/src/models/stock.rs
// Description: Aggregate inventory stock rows and their kind/status enums
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of an aggregate stock row. FULL_ROLL and BUNDLE quantities are
/// maintained directly by operation code; CUT_ROLL and SPARE quantities are
/// derived from their piece tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockType {
    FullRoll,
    CutRoll,
    Bundle,
    Spare,
}

impl StockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockType::FullRoll => "FULL_ROLL",
            StockType::CutRoll => "CUT_ROLL",
            StockType::Bundle => "BUNDLE",
            StockType::Spare => "SPARE",
        }
    }

    /// Whether this kind's aggregate quantity is derived from piece records.
    pub fn is_piece_backed(&self) -> bool {
        matches!(self, StockType::CutRoll | StockType::Spare)
    }
}

impl std::str::FromStr for StockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL_ROLL" => Ok(StockType::FullRoll),
            "CUT_ROLL" => Ok(StockType::CutRoll),
            "BUNDLE" => Ok(StockType::Bundle),
            "SPARE" => Ok(StockType::Spare),
            other => Err(format!("unknown stock type: {other}")),
        }
    }
}

impl TryFrom<String> for StockType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for StockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    SoldOut,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "IN_STOCK",
            StockStatus::SoldOut => "SOLD_OUT",
        }
    }
}

impl std::str::FromStr for StockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_STOCK" => Ok(StockStatus::InStock),
            "SOLD_OUT" => Ok(StockStatus::SoldOut),
            other => Err(format!("unknown stock status: {other}")),
        }
    }
}

impl TryFrom<String> for StockStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregate row per (batch, variant, stock kind, shape). `quantity` is
/// authoritative only while the row is locked inside an operation; outside a
/// transaction it is advisory.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryStock {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub product_variant_id: Uuid,
    #[sqlx(try_from = "String")]
    pub stock_type: StockType,
    pub quantity: i32,
    #[sqlx(try_from = "String")]
    pub status: StockStatus,
    pub length_per_unit: Option<Decimal>,
    pub pieces_per_bundle: Option<i32>,
    pub piece_length_meters: Option<Decimal>,
    pub parent_stock_id: Option<Uuid>,
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_transaction_id: Option<Uuid>,
}

impl InventoryStock {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_type_round_trip() {
        for ty in [
            StockType::FullRoll,
            StockType::CutRoll,
            StockType::Bundle,
            StockType::Spare,
        ] {
            assert_eq!(ty.as_str().parse::<StockType>().unwrap(), ty);
        }
    }

    #[test]
    fn piece_backed_kinds() {
        assert!(StockType::CutRoll.is_piece_backed());
        assert!(StockType::Spare.is_piece_backed());
        assert!(!StockType::FullRoll.is_piece_backed());
        assert!(!StockType::Bundle.is_piece_backed());
    }
}
