// ============================================================================
// PIPESTOCK - TRANSACTION LOG ACCESS
// ============================================================================
// Module: inventory/src/services/txlog.rs
// Description: Append and annotate inventory transaction log entries
// ============================================================================
//
// The log row is inserted BEFORE the pieces it creates, so pieces can carry
// its id in their immutable lineage. The row's `cut_piece_details` is then
// updated with the created piece ids; that side of the cycle stays JSON.

use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use pipestock_shared::{Error, Result};

use crate::models::{CutPieceDetail, InventoryTransaction, TransactionType};

/// Field set for a new log entry; unset fields stay NULL.
#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
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
    pub stock_snapshot: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

pub async fn append(
    conn: &mut PgConnection,
    transaction_type: TransactionType,
    new: NewTransaction,
) -> Result<Uuid> {
    append_with_id(conn, Uuid::new_v4(), transaction_type, new).await
}

/// Append with a caller-chosen id. CombineSpares generates its id up front so
/// the reservation token and the log row share one identifier.
pub async fn append_with_id(
    conn: &mut PgConnection,
    id: Uuid,
    transaction_type: TransactionType,
    new: NewTransaction,
) -> Result<Uuid> {
    let row = sqlx::query(
        "INSERT INTO inventory_transactions (
             id, transaction_type, from_stock_id, from_quantity, from_length,
             from_pieces, to_stock_id, to_quantity, to_pieces, batch_id,
             dispatch_id, dispatch_item_id, stock_snapshot, notes, created_by
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         RETURNING id",
    )
    .bind(id)
    .bind(transaction_type.as_str())
    .bind(new.from_stock_id)
    .bind(new.from_quantity)
    .bind(new.from_length)
    .bind(new.from_pieces)
    .bind(new.to_stock_id)
    .bind(new.to_quantity)
    .bind(new.to_pieces)
    .bind(new.batch_id)
    .bind(new.dispatch_id)
    .bind(new.dispatch_item_id)
    .bind(new.stock_snapshot)
    .bind(new.notes)
    .bind(new.created_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("id"))
}

/// Record the pieces a CUT_ROLL transaction created, after they exist.
pub async fn set_cut_piece_details(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    details: &[CutPieceDetail],
) -> Result<()> {
    sqlx::query("UPDATE inventory_transactions SET cut_piece_details = $2 WHERE id = $1")
        .bind(transaction_id)
        .bind(serde_json::to_value(details)?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fetch(conn: &mut PgConnection, transaction_id: Uuid) -> Result<InventoryTransaction> {
    sqlx::query_as::<_, InventoryTransaction>(
        "SELECT * FROM inventory_transactions WHERE id = $1",
    )
    .bind(transaction_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("transaction {transaction_id}")))
}

/// Stamp a transaction reverted. Refuses double reverts at the data layer:
/// the guarded UPDATE affects zero rows when `reverted_at` is already set.
pub async fn mark_reverted(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    reverted_by: Option<Uuid>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE inventory_transactions
         SET reverted_at = NOW(), reverted_by = $2
         WHERE id = $1 AND reverted_at IS NULL",
    )
    .bind(transaction_id)
    .bind(reverted_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::AlreadyReverted(format!(
            "transaction {transaction_id}"
        )));
    }
    Ok(())
}
