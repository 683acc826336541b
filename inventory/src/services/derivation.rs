// ============================================================================
// PIPESTOCK - DERIVATION ENGINE
// ============================================================================
// Module: inventory/src/services/derivation.rs
// Description: Rule A (piece counts -> aggregate stock quantity) and Rule B
//              (aggregate stock -> batch current_quantity) recomputation
// ============================================================================
//
// Both rules are full recomputations, never incremental adjustments, and must
// run inside the same transaction as the operation that triggered them,
// before the log entry commits.

use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use pipestock_shared::{Error, Result};

use crate::models::StockType;

/// Rule A: recompute a piece-backed stock row's quantity from its IN_STOCK
/// piece records. Zero quantity soft-deletes the row; a positive quantity
/// restores a previously soft-deleted row.
///
/// FULL_ROLL and BUNDLE rows are maintained directly by operation code via
/// [`apply_direct_quantity`]; calling this on them is an error.
pub async fn sync_stock_quantity(conn: &mut PgConnection, stock_id: Uuid) -> Result<i32> {
    let row = sqlx::query("SELECT stock_type FROM inventory_stock WHERE id = $1")
        .bind(stock_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock {stock_id}")))?;

    let stock_type: StockType = row
        .get::<String, _>("stock_type")
        .parse()
        .map_err(Error::Internal)?;

    let count_sql = match stock_type {
        StockType::CutRoll => {
            "SELECT COUNT(*) AS n FROM hdpe_cut_pieces
             WHERE stock_id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL"
        }
        StockType::Spare => {
            "SELECT COUNT(*) AS n FROM sprinkler_spare_pieces
             WHERE stock_id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL"
        }
        other => {
            return Err(Error::Internal(format!(
                "sync_stock_quantity called on non-piece-backed stock kind {other}"
            )))
        }
    };

    let quantity: i64 = sqlx::query(count_sql)
        .bind(stock_id)
        .fetch_one(&mut *conn)
        .await?
        .get("n");
    let quantity = quantity as i32;

    apply_direct_quantity(conn, stock_id, quantity).await?;

    debug!(%stock_id, quantity, "recomputed stock quantity from pieces");
    Ok(quantity)
}

/// Write an absolute quantity to a stock row, maintaining the
/// quantity/status/soft-delete invariant: zero means SOLD_OUT and
/// soft-deleted, positive means IN_STOCK and live.
pub async fn apply_direct_quantity(
    conn: &mut PgConnection,
    stock_id: Uuid,
    quantity: i32,
) -> Result<()> {
    if quantity < 0 {
        return Err(Error::Internal(format!(
            "attempted to set negative quantity {quantity} on stock {stock_id}"
        )));
    }

    sqlx::query(
        "UPDATE inventory_stock
         SET quantity = $2,
             status = CASE WHEN $2 = 0 THEN 'SOLD_OUT' ELSE 'IN_STOCK' END,
             deleted_at = CASE WHEN $2 = 0 THEN COALESCE(deleted_at, NOW()) ELSE NULL END,
             deleted_by_transaction_id = CASE WHEN $2 = 0 THEN deleted_by_transaction_id ELSE NULL END,
             version = version + 1,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(stock_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rule B: recompute a batch's `current_quantity` from its live stock rows.
/// FULL_ROLL contributes rolls, CUT_ROLL contributes IN_STOCK piece count,
/// BUNDLE contributes bundles x pieces_per_bundle, SPARE contributes the sum
/// of piece_count over IN_STOCK groups.
pub async fn sync_batch_quantity(conn: &mut PgConnection, batch_id: Uuid) -> Result<i32> {
    let row = sqlx::query(
        "UPDATE batches b
         SET current_quantity = (
             SELECT COALESCE(SUM(CASE
                 WHEN s.stock_type = 'FULL_ROLL' THEN s.quantity
                 WHEN s.stock_type = 'CUT_ROLL' THEN (
                     SELECT COUNT(*)
                     FROM hdpe_cut_pieces cp
                     WHERE cp.stock_id = s.id
                       AND cp.status = 'IN_STOCK'
                       AND cp.deleted_at IS NULL
                 )
                 WHEN s.stock_type = 'BUNDLE' THEN s.quantity * s.pieces_per_bundle
                 WHEN s.stock_type = 'SPARE' THEN (
                     SELECT COALESCE(SUM(sp.piece_count), 0)
                     FROM sprinkler_spare_pieces sp
                     WHERE sp.stock_id = s.id
                       AND sp.status = 'IN_STOCK'
                       AND sp.deleted_at IS NULL
                 )
                 ELSE 0
             END), 0)
             FROM inventory_stock s
             WHERE s.batch_id = b.id AND s.deleted_at IS NULL
         ),
         updated_at = NOW()
         WHERE id = $1
         RETURNING current_quantity",
    )
    .bind(batch_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))?;

    let current_quantity: i32 = row.get("current_quantity");
    debug!(%batch_id, current_quantity, "recomputed batch quantity from stock");
    Ok(current_quantity)
}

/// Soft-delete a batch once nothing remains in it: computed quantity zero and
/// no live stock rows. Used by the post-dispatch sweep.
pub async fn sweep_batch_if_empty(conn: &mut PgConnection, batch_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE batches b
         SET deleted_at = NOW(), updated_at = NOW()
         WHERE b.id = $1
           AND b.deleted_at IS NULL
           AND b.current_quantity = 0
           AND NOT EXISTS (
               SELECT 1 FROM inventory_stock s
               WHERE s.batch_id = b.id AND s.deleted_at IS NULL AND s.quantity > 0
           )",
    )
    .bind(batch_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Clear a batch's soft-delete marker; revert paths must tolerate operating
/// on soft-deleted entities.
pub async fn restore_batch(conn: &mut PgConnection, batch_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE batches SET deleted_at = NULL, updated_at = NOW()
         WHERE id = $1 AND deleted_at IS NOT NULL",
    )
    .bind(batch_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// A stock row whose stored quantity disagrees with its derived piece count.
#[derive(Debug, Clone)]
pub struct QuantityMismatch {
    pub stock_id: Uuid,
    pub stock_type: StockType,
    pub recorded: i32,
    pub derived: i64,
}

/// Validation probe over every piece-backed stock row. Returns mismatches;
/// empty means Rule A holds everywhere.
pub async fn validate_stock_quantities(pool: &PgPool) -> Result<Vec<QuantityMismatch>> {
    let rows = sqlx::query(
        "SELECT s.id, s.stock_type, s.quantity,
                CASE s.stock_type
                    WHEN 'CUT_ROLL' THEN (
                        SELECT COUNT(*) FROM hdpe_cut_pieces cp
                        WHERE cp.stock_id = s.id
                          AND cp.status = 'IN_STOCK'
                          AND cp.deleted_at IS NULL
                    )
                    ELSE (
                        SELECT COUNT(*) FROM sprinkler_spare_pieces sp
                        WHERE sp.stock_id = s.id
                          AND sp.status = 'IN_STOCK'
                          AND sp.deleted_at IS NULL
                    )
                END AS derived
         FROM inventory_stock s
         WHERE s.stock_type IN ('CUT_ROLL', 'SPARE')
           AND s.deleted_at IS NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut mismatches = Vec::new();
    for row in rows {
        let recorded: i32 = row.get("quantity");
        let derived: i64 = row.get("derived");
        if i64::from(recorded) != derived {
            mismatches.push(QuantityMismatch {
                stock_id: row.get("id"),
                stock_type: row
                    .get::<String, _>("stock_type")
                    .parse()
                    .map_err(Error::Internal)?,
                recorded,
                derived,
            });
        }
    }

    Ok(mismatches)
}
