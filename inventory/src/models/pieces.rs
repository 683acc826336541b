// ============================================================================
// PIPESTOCK - PIECE MODELS
// ============================================================================
// Module: inventory/src/models/pieces.rs
// Description: Individually tracked HDPE cut pieces and sprinkler spare
//              piece groups, with immutable lineage fields
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Piece status. Transitions are forward-only (IN_STOCK to DISPATCHED /
/// SCRAPPED / SOLD_OUT) except via an explicit revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceStatus {
    InStock,
    Dispatched,
    Scrapped,
    SoldOut,
}

impl PieceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PieceStatus::InStock => "IN_STOCK",
            PieceStatus::Dispatched => "DISPATCHED",
            PieceStatus::Scrapped => "SCRAPPED",
            PieceStatus::SoldOut => "SOLD_OUT",
        }
    }
}

impl std::str::FromStr for PieceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_STOCK" => Ok(PieceStatus::InStock),
            "DISPATCHED" => Ok(PieceStatus::Dispatched),
            "SCRAPPED" => Ok(PieceStatus::Scrapped),
            "SOLD_OUT" => Ok(PieceStatus::SoldOut),
            other => Err(format!("unknown piece status: {other}")),
        }
    }
}

impl TryFrom<String> for PieceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for PieceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which piece table a piece id refers to, for audit-trail lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceKind {
    Hdpe,
    Sprinkler,
}

impl PieceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PieceKind::Hdpe => "HDPE",
            PieceKind::Sprinkler => "SPRINKLER",
        }
    }
}

/// A single cut length of HDPE pipe. `created_by_transaction_id` and
/// `original_stock_id` are immutable after insert; the DAO exposes no setters
/// for them and the data layer rejects mutation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HdpeCutPiece {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub length_meters: Decimal,
    #[sqlx(try_from = "String")]
    pub status: PieceStatus,
    pub dispatch_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by_transaction_id: Uuid,
    pub original_stock_id: Uuid,
    pub deleted_by_transaction_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A group of `piece_count` indistinguishable sprinkler pieces. Dispatching
/// fewer pieces than the group holds splits the group; the split-off portion
/// becomes one singleton row per physical piece.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SprinklerSparePiece {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub piece_count: i32,
    pub piece_length_meters: Option<Decimal>,
    #[sqlx(try_from = "String")]
    pub status: PieceStatus,
    pub dispatch_id: Option<Uuid>,
    pub reserved_by_transaction_id: Option<Uuid>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by_transaction_id: Uuid,
    pub original_stock_id: Uuid,
    pub deleted_by_transaction_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_status_round_trip() {
        for status in [
            PieceStatus::InStock,
            PieceStatus::Dispatched,
            PieceStatus::Scrapped,
            PieceStatus::SoldOut,
        ] {
            assert_eq!(status.as_str().parse::<PieceStatus>().unwrap(), status);
        }
    }
}
