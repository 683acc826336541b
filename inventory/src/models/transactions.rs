// ============================================================================
// PIPESTOCK - TRANSACTION LOG MODELS
// ============================================================================
// Module: inventory/src/models/transactions.rs
// Description: Append-only inventory transaction log entries, the PRODUCTION
//              stock snapshot payload, and the timeline handle encoding
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Production,
    CutRoll,
    SplitBundle,
    CombineSpares,
    Dispatch,
    Return,
    Scrap,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Production => "PRODUCTION",
            TransactionType::CutRoll => "CUT_ROLL",
            TransactionType::SplitBundle => "SPLIT_BUNDLE",
            TransactionType::CombineSpares => "COMBINE_SPARES",
            TransactionType::Dispatch => "DISPATCH",
            TransactionType::Return => "RETURN",
            TransactionType::Scrap => "SCRAP",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRODUCTION" => Ok(TransactionType::Production),
            "CUT_ROLL" => Ok(TransactionType::CutRoll),
            "SPLIT_BUNDLE" => Ok(TransactionType::SplitBundle),
            "COMBINE_SPARES" => Ok(TransactionType::CombineSpares),
            "DISPATCH" => Ok(TransactionType::Dispatch),
            "RETURN" => Ok(TransactionType::Return),
            "SCRAP" => Ok(TransactionType::Scrap),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

impl TryFrom<String> for TransactionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `cut_piece_details` on a CUT_ROLL transaction: the pieces the
/// transaction created, recorded on the log row after the pieces exist (one
/// side of the piece/log cycle stays JSON, no FK cycle is persisted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPieceDetail {
    pub length: Decimal,
    pub piece_id: Uuid,
}

/// One entry of the PRODUCTION transaction's `stock_snapshot`: the ground
/// truth of the batch's initial composition for the history view and for
/// fallback revert reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshotEntry {
    pub stock_id: Uuid,
    pub stock_type: String,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_per_unit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pieces_per_bundle: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_length_meters: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_lengths: Option<Vec<Decimal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spare_groups: Option<Vec<i32>>,
}

/// Append-only log entry. `reverted_at` is the only field that changes after
/// insert, and only once.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryTransaction {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub transaction_type: TransactionType,
    pub from_stock_id: Option<Uuid>,
    pub from_quantity: Option<i32>,
    pub from_length: Option<Decimal>,
    pub from_pieces: Option<i32>,
    pub to_stock_id: Option<Uuid>,
    pub to_quantity: Option<i32>,
    pub to_pieces: Option<i32>,
    pub batch_id: Option<Uuid>,
    pub dispatch_id: Option<Uuid>,
    pub dispatch_item_id: Option<Uuid>,
    pub cut_piece_details: Option<serde_json::Value>,
    pub stock_snapshot: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by: Option<Uuid>,
}

impl InventoryTransaction {
    pub fn is_reverted(&self) -> bool {
        self.reverted_at.is_some()
    }

    pub fn cut_piece_details(&self) -> Vec<CutPieceDetail> {
        self.cut_piece_details
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Typed handle for the unified timeline and the revert API: `{kind}_{uuid}`
/// where kind selects the table the uuid lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionHandle {
    /// A plain inventory transaction (CUT_ROLL, SPLIT_BUNDLE, COMBINE_SPARES...).
    Txn(Uuid),
    /// Same table, rows surfaced from the reverted-transactions sub-query.
    Inv(Uuid),
    Dispatch(Uuid),
    Return(Uuid),
    Scrap(Uuid),
}

impl TransactionHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            TransactionHandle::Txn(_) => "txn",
            TransactionHandle::Inv(_) => "inv",
            TransactionHandle::Dispatch(_) => "dispatch",
            TransactionHandle::Return(_) => "return",
            TransactionHandle::Scrap(_) => "scrap",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            TransactionHandle::Txn(id)
            | TransactionHandle::Inv(id)
            | TransactionHandle::Dispatch(id)
            | TransactionHandle::Return(id)
            | TransactionHandle::Scrap(id) => *id,
        }
    }
}

impl std::fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.kind(), self.id())
    }
}

impl std::str::FromStr for TransactionHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, raw_id) = s
            .split_once('_')
            .ok_or_else(|| format!("malformed transaction handle: {s}"))?;
        let id: Uuid = raw_id
            .parse()
            .map_err(|_| format!("malformed uuid in transaction handle: {s}"))?;
        match kind {
            "txn" => Ok(TransactionHandle::Txn(id)),
            "inv" => Ok(TransactionHandle::Inv(id)),
            "dispatch" => Ok(TransactionHandle::Dispatch(id)),
            "return" => Ok(TransactionHandle::Return(id)),
            "scrap" => Ok(TransactionHandle::Scrap(id)),
            other => Err(format!("unknown transaction handle kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn handle_round_trip() {
        let id = Uuid::new_v4();
        for handle in [
            TransactionHandle::Txn(id),
            TransactionHandle::Inv(id),
            TransactionHandle::Dispatch(id),
            TransactionHandle::Return(id),
            TransactionHandle::Scrap(id),
        ] {
            let encoded = handle.to_string();
            assert_eq!(encoded.parse::<TransactionHandle>().unwrap(), handle);
        }
    }

    #[test]
    fn handle_rejects_garbage() {
        assert!("nope".parse::<TransactionHandle>().is_err());
        assert!("txn_not-a-uuid".parse::<TransactionHandle>().is_err());
        assert!(format!("order_{}", Uuid::new_v4())
            .parse::<TransactionHandle>()
            .is_err());
    }

    #[test]
    fn snapshot_omits_absent_fields() {
        let entry = StockSnapshotEntry {
            stock_id: Uuid::new_v4(),
            stock_type: "FULL_ROLL".to_string(),
            quantity: 4,
            length_per_unit: Some(Decimal::new(5000, 1)),
            pieces_per_bundle: None,
            piece_length_meters: None,
            piece_lengths: None,
            spare_groups: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("pieces_per_bundle").is_none());
        assert_eq!(json["quantity"], 4);
    }
}
