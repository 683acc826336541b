// ============================================================================
// PIPESTOCK - REVERT ENGINE
// ============================================================================
// Module: inventory/src/services/revert.rs
// Description: Compensating procedures that undo a prior operation using the
//              immutable lineage on pieces and log entries
// ============================================================================
//
// Revert queries must NOT exclude soft-deleted rows: restoring state often
// means operating on exactly the rows an earlier operation soft-deleted.

use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use pipestock_shared::{begin_serializable, Error, Result};

use crate::models::{
    InventoryTransaction, RevertOutcome, StockType, TransactionHandle, TransactionType,
};
use crate::services::{derivation, stocks, txlog};

#[derive(Clone)]
pub struct RevertService {
    pool: PgPool,
}

impl RevertService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Revert by timeline handle (`{kind}_{uuid}`); dispatches on the kind
    /// prefix.
    pub async fn revert_handle(&self, handle: &str, user_id: Uuid) -> Result<RevertOutcome> {
        let handle: TransactionHandle = handle.parse().map_err(Error::Validation)?;
        self.revert_transaction(handle, user_id).await
    }

    pub async fn revert_transaction(
        &self,
        handle: TransactionHandle,
        user_id: Uuid,
    ) -> Result<RevertOutcome> {
        let mut tx = begin_serializable(&self.pool).await?;

        let details = match handle {
            TransactionHandle::Txn(id) | TransactionHandle::Inv(id) => {
                let txn = txlog::fetch(&mut tx, id).await?;
                if txn.is_reverted() {
                    return Err(Error::AlreadyReverted(format!("transaction {id}")));
                }
                match txn.transaction_type {
                    TransactionType::CutRoll => revert_cut_roll(&mut tx, &txn, user_id).await?,
                    TransactionType::SplitBundle => {
                        revert_split_bundle(&mut tx, &txn, user_id).await?
                    }
                    TransactionType::CombineSpares => {
                        revert_combine_spares(&mut tx, &txn, user_id).await?
                    }
                    TransactionType::Production => {
                        return Err(Error::CannotRevert(
                            "production transactions are not revertible".into(),
                        ))
                    }
                    TransactionType::Dispatch => match txn.dispatch_id {
                        Some(dispatch_id) => revert_dispatch(&mut tx, dispatch_id, user_id).await?,
                        None => {
                            return Err(Error::CannotRevert(
                                "dispatch transaction carries no dispatch reference".into(),
                            ))
                        }
                    },
                    TransactionType::Return => {
                        return Err(Error::CannotRevert(
                            "revert the return document, not its transaction rows".into(),
                        ))
                    }
                    TransactionType::Scrap => {
                        return Err(Error::CannotRevert(
                            "revert the scrap document, not its transaction rows".into(),
                        ))
                    }
                }
            }
            TransactionHandle::Dispatch(id) => revert_dispatch(&mut tx, id, user_id).await?,
            TransactionHandle::Return(id) => revert_return(&mut tx, id, user_id).await?,
            TransactionHandle::Scrap(id) => revert_scrap(&mut tx, id, user_id).await?,
        };

        tx.commit().await?;

        info!(%handle, "reverted");
        Ok(RevertOutcome { handle, details })
    }
}

/// Undo a cut: soft-delete the pieces the cut created and give the source
/// roll back.
async fn revert_cut_roll(
    conn: &mut PgConnection,
    txn: &InventoryTransaction,
    user_id: Uuid,
) -> Result<String> {
    let dispatched: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM hdpe_cut_pieces
         WHERE created_by_transaction_id = $1
           AND status = 'DISPATCHED'
           AND deleted_at IS NULL",
    )
    .bind(txn.id)
    .fetch_one(&mut *conn)
    .await?
    .get("n");
    if dispatched > 0 {
        return Err(Error::CannotRevert(format!(
            "{dispatched} pieces from this cut are already dispatched"
        )));
    }

    let result = sqlx::query(
        "UPDATE hdpe_cut_pieces
         SET status = 'SOLD_OUT',
             deleted_at = NOW(),
             deleted_by_transaction_id = $1,
             version = version + 1,
             updated_at = NOW()
         WHERE created_by_transaction_id = $1
           AND status = 'IN_STOCK'
           AND deleted_at IS NULL",
    )
    .bind(txn.id)
    .execute(&mut *conn)
    .await?;
    let reverted_pieces = result.rows_affected();
    if reverted_pieces == 0 {
        return Err(Error::CannotRevert("no pieces found to revert".into()));
    }

    let source_id = txn
        .from_stock_id
        .ok_or_else(|| Error::CannotRevert("cut transaction has no source stock".into()))?;
    let source = stocks::lock_stock_any(conn, source_id).await?;

    match source.stock_type {
        StockType::FullRoll => {
            stocks::restore_stock_quantity(conn, source_id, 1).await?;
        }
        StockType::CutRoll => {
            // Re-cut: restore the subsumed source piece. It is the DISPATCHED
            // piece on the source stock with no dispatch reference and the
            // recorded source length.
            sqlx::query(
                "UPDATE hdpe_cut_pieces
                 SET status = 'IN_STOCK', version = version + 1, updated_at = NOW()
                 WHERE id = (
                     SELECT id FROM hdpe_cut_pieces
                     WHERE stock_id = $1
                       AND status = 'DISPATCHED'
                       AND dispatch_id IS NULL
                       AND length_meters IS NOT DISTINCT FROM $2
                       AND deleted_at IS NULL
                     ORDER BY updated_at DESC
                     LIMIT 1
                 )",
            )
            .bind(source_id)
            .bind(txn.from_length)
            .execute(&mut *conn)
            .await?;
            derivation::sync_stock_quantity(conn, source_id).await?;
        }
        other => {
            return Err(Error::CannotRevert(format!(
                "cut source has unexpected stock kind {other}"
            )))
        }
    }

    if let Some(cut_stock_id) = txn.to_stock_id {
        derivation::sync_stock_quantity(conn, cut_stock_id).await?;
    }
    if let Some(batch_id) = txn.batch_id {
        derivation::restore_batch(conn, batch_id).await?;
        derivation::sync_batch_quantity(conn, batch_id).await?;
    }

    txlog::mark_reverted(conn, txn.id, Some(user_id)).await?;

    Ok(format!("reverted {reverted_pieces} cut pieces"))
}

/// Undo a split: soft-delete the spare groups the split created and give the
/// source bundle back.
async fn revert_split_bundle(
    conn: &mut PgConnection,
    txn: &InventoryTransaction,
    user_id: Uuid,
) -> Result<String> {
    let dispatched: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM sprinkler_spare_pieces
         WHERE created_by_transaction_id = $1
           AND status = 'DISPATCHED'
           AND deleted_at IS NULL",
    )
    .bind(txn.id)
    .fetch_one(&mut *conn)
    .await?
    .get("n");
    if dispatched > 0 {
        return Err(Error::CannotRevert(format!(
            "{dispatched} spare groups from this split are already dispatched"
        )));
    }

    let result = sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET status = 'SOLD_OUT',
             deleted_at = NOW(),
             deleted_by_transaction_id = $1,
             version = version + 1,
             updated_at = NOW()
         WHERE created_by_transaction_id = $1
           AND status = 'IN_STOCK'
           AND deleted_at IS NULL",
    )
    .bind(txn.id)
    .execute(&mut *conn)
    .await?;
    let reverted_groups = result.rows_affected();
    if reverted_groups == 0 {
        return Err(Error::CannotRevert("no spare groups found to revert".into()));
    }

    let source_id = txn
        .from_stock_id
        .ok_or_else(|| Error::CannotRevert("split transaction has no source stock".into()))?;
    stocks::lock_stock_any(conn, source_id).await?;
    stocks::restore_stock_quantity(conn, source_id, 1).await?;

    if let Some(spare_stock_id) = txn.to_stock_id {
        derivation::sync_stock_quantity(conn, spare_stock_id).await?;
    }
    if let Some(batch_id) = txn.batch_id {
        derivation::restore_batch(conn, batch_id).await?;
        derivation::sync_batch_quantity(conn, batch_id).await?;
    }

    txlog::mark_reverted(conn, txn.id, Some(user_id)).await?;

    Ok(format!("reverted {reverted_groups} spare groups"))
}

/// Undo a combine: restore the consumed spare groups (their original
/// `created_by_transaction_id` is untouched, so restoring is a pure status
/// flip), drop the remainder group, and take the bundles back out.
async fn revert_combine_spares(
    conn: &mut PgConnection,
    txn: &InventoryTransaction,
    user_id: Uuid,
) -> Result<String> {
    let bundle_stock_id = txn
        .to_stock_id
        .ok_or_else(|| Error::CannotRevert("combine transaction has no bundle stock".into()))?;
    let bundles_added = txn.to_quantity.unwrap_or(0);

    let bundle_stock = stocks::lock_stock_any(conn, bundle_stock_id).await?;
    if bundle_stock.quantity < bundles_added {
        return Err(Error::CannotRevert(
            "bundles from this combine were already dispatched or transformed".into(),
        ));
    }

    // Remainder groups created by this combine; refuse if any were consumed.
    let remainder_dispatched: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM sprinkler_spare_pieces
         WHERE created_by_transaction_id = $1 AND status = 'DISPATCHED'",
    )
    .bind(txn.id)
    .fetch_one(&mut *conn)
    .await?
    .get("n");
    if remainder_dispatched > 0 {
        return Err(Error::CannotRevert(
            "remainder pieces from this combine are already dispatched".into(),
        ));
    }

    let restored = sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET status = 'IN_STOCK',
             deleted_at = NULL,
             deleted_by_transaction_id = NULL,
             version = version + 1,
             updated_at = NOW()
         WHERE deleted_by_transaction_id = $1
           AND status = 'SOLD_OUT'",
    )
    .bind(txn.id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET status = 'SOLD_OUT',
             deleted_at = NOW(),
             deleted_by_transaction_id = $1,
             version = version + 1,
             updated_at = NOW()
         WHERE created_by_transaction_id = $1
           AND status = 'IN_STOCK'
           AND deleted_at IS NULL",
    )
    .bind(txn.id)
    .execute(&mut *conn)
    .await?;

    // Take the bundles back; an emptied bundle row soft-deletes.
    let new_quantity = bundle_stock.quantity - bundles_added;
    derivation::apply_direct_quantity(conn, bundle_stock_id, new_quantity).await?;

    if let Some(spare_stock_id) = txn.from_stock_id {
        // Restore the spare stock if this combine emptied it, then let Rule A
        // settle the quantity from the restored groups.
        sqlx::query(
            "UPDATE inventory_stock
             SET deleted_at = NULL,
                 deleted_by_transaction_id = NULL,
                 status = 'IN_STOCK',
                 updated_at = NOW()
             WHERE id = $1 AND deleted_by_transaction_id = $2",
        )
        .bind(spare_stock_id)
        .bind(txn.id)
        .execute(&mut *conn)
        .await?;
        derivation::sync_stock_quantity(conn, spare_stock_id).await?;
    }

    if let Some(batch_id) = txn.batch_id {
        derivation::restore_batch(conn, batch_id).await?;
        derivation::sync_batch_quantity(conn, batch_id).await?;
    }

    txlog::mark_reverted(conn, txn.id, Some(user_id)).await?;

    Ok(format!("restored {restored} spare groups"))
}

/// Undo a dispatch: pieces flip back by their `dispatch_id` stamp, direct
/// quantities come back by the recorded item quantity, and every touched
/// batch is restored and re-derived.
async fn revert_dispatch(
    conn: &mut PgConnection,
    dispatch_id: Uuid,
    user_id: Uuid,
) -> Result<String> {
    let dispatch = sqlx::query(
        "SELECT dispatch_number, reverted_at FROM dispatches
         WHERE id = $1 AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(dispatch_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("dispatch {dispatch_id}")))?;

    if dispatch
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("reverted_at")
        .is_some()
    {
        let number: String = dispatch.get("dispatch_number");
        return Err(Error::AlreadyReverted(format!("dispatch {number}")));
    }

    let items = sqlx::query(
        "SELECT stock_id, item_type, quantity FROM dispatch_items WHERE dispatch_id = $1",
    )
    .bind(dispatch_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut affected_batches: Vec<Uuid> = Vec::new();
    for item in &items {
        let stock_id: Uuid = item.get("stock_id");
        let item_type: String = item.get("item_type");
        let quantity: i32 = item.get("quantity");

        let stock = stocks::lock_stock_any(conn, stock_id).await?;

        match item_type.as_str() {
            "CUT_PIECE" | "CUT_ROLL" => {
                sqlx::query(
                    "UPDATE hdpe_cut_pieces
                     SET status = 'IN_STOCK', dispatch_id = NULL,
                         version = version + 1, updated_at = NOW()
                     WHERE stock_id = $1 AND dispatch_id = $2",
                )
                .bind(stock_id)
                .bind(dispatch_id)
                .execute(&mut *conn)
                .await?;
                derivation::sync_stock_quantity(conn, stock_id).await?;
            }
            "SPARE_PIECES" => {
                // Restores full-group dispatches and the per-piece singleton
                // records split off for partial dispatches alike.
                sqlx::query(
                    "UPDATE sprinkler_spare_pieces
                     SET status = 'IN_STOCK', dispatch_id = NULL,
                         version = version + 1, updated_at = NOW()
                     WHERE stock_id = $1 AND dispatch_id = $2",
                )
                .bind(stock_id)
                .bind(dispatch_id)
                .execute(&mut *conn)
                .await?;
                derivation::sync_stock_quantity(conn, stock_id).await?;
            }
            _ => {
                stocks::restore_stock_quantity(conn, stock_id, quantity).await?;
            }
        }

        if !affected_batches.contains(&stock.batch_id) {
            affected_batches.push(stock.batch_id);
        }
    }

    for batch_id in &affected_batches {
        derivation::restore_batch(conn, *batch_id).await?;
        derivation::sync_batch_quantity(conn, *batch_id).await?;
    }

    // The dispatch's own log rows flip to reverted alongside the document.
    sqlx::query(
        "UPDATE inventory_transactions
         SET reverted_at = NOW(), reverted_by = $2
         WHERE dispatch_id = $1 AND reverted_at IS NULL",
    )
    .bind(dispatch_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    // If the recorded creator no longer exists, drop the reference before
    // writing the revert stamp.
    sqlx::query(
        "UPDATE dispatches d
         SET created_by = NULL
         WHERE d.id = $1
           AND d.created_by IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM users u WHERE u.id = d.created_by)",
    )
    .bind(dispatch_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE dispatches
         SET status = 'REVERTED', reverted_at = NOW(), reverted_by = $2, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(dispatch_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(format!("reverted {} dispatch items", items.len()))
}

/// Undo a return: soft-delete every stock row (and its pieces) the return
/// created.
async fn revert_return(conn: &mut PgConnection, return_id: Uuid, user_id: Uuid) -> Result<String> {
    let return_row = sqlx::query(
        "SELECT return_number, reverted_at FROM returns
         WHERE id = $1 AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(return_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("return {return_id}")))?;

    if return_row
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("reverted_at")
        .is_some()
    {
        let number: String = return_row.get("return_number");
        return Err(Error::AlreadyReverted(format!("return {number}")));
    }

    let batch_ids: Vec<Uuid> = sqlx::query(
        "SELECT DISTINCT batch_id FROM return_items
         WHERE return_id = $1 AND batch_id IS NOT NULL",
    )
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|r| r.get("batch_id"))
    .collect();

    // Stock rows created by this return: linked rolls and bundles, plus any
    // spare stock whose pieces were created by the return's transactions.
    let stock_ids: Vec<Uuid> = sqlx::query(
        "SELECT DISTINCT stock_id FROM (
             SELECT rr.stock_id
             FROM return_rolls rr
             JOIN return_items ri ON rr.return_item_id = ri.id
             WHERE ri.return_id = $1 AND rr.stock_id IS NOT NULL
             UNION
             SELECT rb.stock_id
             FROM return_bundles rb
             JOIN return_items ri ON rb.return_item_id = ri.id
             WHERE ri.return_id = $1 AND rb.stock_id IS NOT NULL
             UNION
             SELECT sp.stock_id
             FROM sprinkler_spare_pieces sp
             WHERE sp.created_by_transaction_id IN (
                 SELECT t.id FROM inventory_transactions t
                 WHERE t.transaction_type = 'RETURN' AND t.batch_id = ANY($2)
             )
         ) AS source_stock",
    )
    .bind(return_id)
    .bind(&batch_ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|r| r.get("stock_id"))
    .collect();

    if stock_ids.is_empty() {
        return Err(Error::CannotRevert("no stock found for this return".into()));
    }

    // Anything already dispatched out of the returned stock blocks revert.
    let downstream: i64 = sqlx::query(
        "SELECT COUNT(*) AS n
         FROM dispatch_items di
         JOIN dispatches d ON di.dispatch_id = d.id
         WHERE di.stock_id = ANY($1) AND d.reverted_at IS NULL",
    )
    .bind(&stock_ids)
    .fetch_one(&mut *conn)
    .await?
    .get("n");
    if downstream > 0 {
        return Err(Error::CannotRevert(
            "stock from this return was already dispatched".into(),
        ));
    }

    sqlx::query(
        "UPDATE hdpe_cut_pieces
         SET status = 'SOLD_OUT', deleted_at = NOW(),
             version = version + 1, updated_at = NOW()
         WHERE stock_id = ANY($1) AND deleted_at IS NULL",
    )
    .bind(&stock_ids)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET status = 'SOLD_OUT', deleted_at = NOW(),
             version = version + 1, updated_at = NOW()
         WHERE stock_id = ANY($1) AND deleted_at IS NULL",
    )
    .bind(&stock_ids)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE inventory_stock
         SET status = 'SOLD_OUT', deleted_at = NOW(),
             version = version + 1, updated_at = NOW()
         WHERE id = ANY($1) AND deleted_at IS NULL",
    )
    .bind(&stock_ids)
    .execute(&mut *conn)
    .await?;

    for batch_id in &batch_ids {
        derivation::sync_batch_quantity(conn, *batch_id).await?;
        derivation::sweep_batch_if_empty(conn, *batch_id).await?;
    }

    sqlx::query(
        "UPDATE inventory_transactions
         SET reverted_at = NOW(), reverted_by = $2
         WHERE transaction_type = 'RETURN' AND batch_id = ANY($1) AND reverted_at IS NULL",
    )
    .bind(&batch_ids)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE returns
         SET status = 'REVERTED', reverted_at = NOW(), reverted_by = $2
         WHERE id = $1",
    )
    .bind(return_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(format!("soft-deleted {} stock rows", stock_ids.len()))
}

/// Undo a scrap: restore quantities from the per-item snapshots and flip the
/// recorded pieces back from SCRAPPED.
async fn revert_scrap(conn: &mut PgConnection, scrap_id: Uuid, _user_id: Uuid) -> Result<String> {
    let scrap = sqlx::query(
        "SELECT scrap_number, status FROM scraps
         WHERE id = $1 AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(scrap_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("scrap {scrap_id}")))?;

    if scrap.get::<String, _>("status") != "SCRAPPED" {
        let number: String = scrap.get("scrap_number");
        return Err(Error::AlreadyReverted(format!("scrap {number}")));
    }

    let items = sqlx::query(
        "SELECT id, stock_id, batch_id, item_type, quantity_scrapped
         FROM scrap_items WHERE scrap_id = $1",
    )
    .bind(scrap_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut affected_batches: Vec<Uuid> = Vec::new();
    for item in &items {
        let scrap_item_id: Uuid = item.get("id");
        let stock_id: Uuid = item.get("stock_id");
        let item_type: String = item.get("item_type");
        let quantity_scrapped: i32 = item.get("quantity_scrapped");

        stocks::lock_stock_any(conn, stock_id).await?;

        match item_type.as_str() {
            "FULL_ROLL" | "BUNDLE" => {
                stocks::restore_stock_quantity(conn, stock_id, quantity_scrapped).await?;
            }
            "CUT_ROLL" => {
                sqlx::query(
                    "UPDATE hdpe_cut_pieces
                     SET status = 'IN_STOCK', deleted_at = NULL,
                         version = version + 1, updated_at = NOW()
                     WHERE status = 'SCRAPPED'
                       AND id IN (
                           SELECT original_piece_id FROM scrap_pieces
                           WHERE scrap_item_id = $1
                       )",
                )
                .bind(scrap_item_id)
                .execute(&mut *conn)
                .await?;
                derivation::sync_stock_quantity(conn, stock_id).await?;
            }
            _ => {
                sqlx::query(
                    "UPDATE sprinkler_spare_pieces
                     SET status = 'IN_STOCK', deleted_at = NULL,
                         version = version + 1, updated_at = NOW()
                     WHERE status = 'SCRAPPED'
                       AND id IN (
                           SELECT original_piece_id FROM scrap_pieces
                           WHERE scrap_item_id = $1
                       )",
                )
                .bind(scrap_item_id)
                .execute(&mut *conn)
                .await?;
                derivation::sync_stock_quantity(conn, stock_id).await?;
            }
        }

        if let Some(batch_id) = item.get::<Option<Uuid>, _>("batch_id") {
            if !affected_batches.contains(&batch_id) {
                affected_batches.push(batch_id);
            }
        }
    }

    for batch_id in &affected_batches {
        derivation::restore_batch(conn, *batch_id).await?;
        derivation::sync_batch_quantity(conn, *batch_id).await?;
    }

    let result = sqlx::query(
        "UPDATE scraps SET status = 'CANCELLED' WHERE id = $1 AND status = 'SCRAPPED'",
    )
    .bind(scrap_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::AlreadyReverted(format!("scrap {scrap_id}")));
    }

    Ok(format!("cancelled scrap with {} items", items.len()))
}
