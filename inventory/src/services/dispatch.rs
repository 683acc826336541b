// ============================================================================
// PIPESTOCK - DISPATCH SERVICE
// ============================================================================
// Module: inventory/src/services/dispatch.rs
// Description: CreateDispatch, binding piece-based and quantity-based
//              inventory into one atomic outbound document
// ============================================================================

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use pipestock_shared::{begin_serializable, Error, Result};

use crate::models::{
    DispatchItemRequest, DispatchItemType, DispatchRequest, DispatchResult, InventoryStock,
    StockStatus, StockType, TransactionType,
};
use crate::services::{derivation, numbering, stocks, txlog};

#[derive(Clone)]
pub struct DispatchService {
    pool: PgPool,
}

impl DispatchService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a dispatch. Phase I validates every item before anything is
    /// written; the first failing item aborts the whole request. Phase II
    /// numbers the dispatch, consumes stock and pieces, and logs one DISPATCH
    /// transaction per item.
    pub async fn create_dispatch(
        &self,
        request: DispatchRequest,
        user_id: Uuid,
    ) -> Result<DispatchResult> {
        request
            .validate()
            .map_err(|e| Error::InvalidDispatch(e.to_string()))?;

        let mut tx = begin_serializable(&self.pool).await?;

        // Phase I: read-only pre-validation over ALL items.
        for (idx, item) in request.items.iter().enumerate() {
            validate_item(&mut tx, idx, item).await?;
        }

        // Phase II: create the dispatch.
        let dispatch_date = request.dispatch_date.unwrap_or_else(Utc::now);
        let dispatch_number =
            numbering::next_dispatch_number(&mut tx, dispatch_date.year()).await?;

        let dispatch_row = sqlx::query(
            "INSERT INTO dispatches (
                 dispatch_number, customer_id, bill_to_id, transport_id,
                 vehicle_id, invoice_number, notes, status, dispatch_date,
                 created_by
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'DISPATCHED', $8, $9)
             RETURNING id",
        )
        .bind(&dispatch_number)
        .bind(request.customer_id)
        .bind(request.bill_to_id)
        .bind(request.transport_id)
        .bind(request.vehicle_id)
        .bind(request.invoice_number.as_deref())
        .bind(request.notes.as_deref())
        .bind(dispatch_date)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let dispatch_id: Uuid = dispatch_row.get("id");

        let mut affected_batches = Vec::new();
        for (idx, item) in request.items.iter().enumerate() {
            let stock = stocks::lock_live_stock(&mut tx, item.stock_id)
                .await
                .map_err(|e| Error::dispatch_item(idx, e))?;

            let applied = apply_item(&mut tx, idx, item, &stock, dispatch_id).await?;

            let item_row = sqlx::query(
                "INSERT INTO dispatch_items (
                     dispatch_id, stock_id, product_variant_id, item_type,
                     quantity, length_meters, cut_piece_id, spare_piece_ids,
                     piece_count, piece_length_meters, bundle_size,
                     pieces_per_bundle, notes
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 RETURNING id",
            )
            .bind(dispatch_id)
            .bind(stock.id)
            .bind(stock.product_variant_id)
            .bind(item.item_type.as_str())
            .bind(item.quantity)
            .bind(applied.length_meters)
            .bind(item.cut_piece_id)
            .bind(if item.spare_piece_ids.is_empty() {
                None
            } else {
                Some(&item.spare_piece_ids)
            })
            .bind(applied.piece_count)
            .bind(item.piece_length_meters.or(stock.piece_length_meters))
            .bind(item.bundle_size.or(stock.pieces_per_bundle))
            .bind(item.pieces_per_bundle.or(stock.pieces_per_bundle))
            .bind(item.notes.as_deref())
            .fetch_one(&mut *tx)
            .await?;
            let dispatch_item_id: Uuid = item_row.get("id");

            txlog::append(
                &mut tx,
                TransactionType::Dispatch,
                txlog::NewTransaction {
                    from_stock_id: Some(stock.id),
                    from_quantity: Some(item.quantity),
                    from_length: applied.length_meters,
                    from_pieces: applied.piece_count,
                    batch_id: Some(stock.batch_id),
                    dispatch_id: Some(dispatch_id),
                    dispatch_item_id: Some(dispatch_item_id),
                    notes: Some(applied.note),
                    created_by: Some(user_id),
                    ..Default::default()
                },
            )
            .await?;

            if !affected_batches.contains(&stock.batch_id) {
                affected_batches.push(stock.batch_id);
            }
        }

        for batch_id in &affected_batches {
            derivation::sync_batch_quantity(&mut tx, *batch_id).await?;
            derivation::sweep_batch_if_empty(&mut tx, *batch_id).await?;
        }

        tx.commit().await?;

        info!(%dispatch_id, %dispatch_number, items = request.items.len(), "created dispatch");
        Ok(DispatchResult {
            dispatch_id,
            dispatch_number,
        })
    }
}

fn expected_stock_type(item_type: DispatchItemType) -> StockType {
    match item_type {
        DispatchItemType::FullRoll => StockType::FullRoll,
        DispatchItemType::CutRoll | DispatchItemType::CutPiece => StockType::CutRoll,
        DispatchItemType::Bundle => StockType::Bundle,
        DispatchItemType::SparePieces => StockType::Spare,
    }
}

/// Requested physical pieces per spare group: repeating a group id N times in
/// the request consumes N pieces from that group.
fn spare_request_counts(spare_piece_ids: &[Uuid]) -> BTreeMap<Uuid, i32> {
    let mut counts = BTreeMap::new();
    for id in spare_piece_ids {
        *counts.entry(*id).or_insert(0) += 1;
    }
    counts
}

async fn validate_item(
    conn: &mut PgConnection,
    idx: usize,
    item: &DispatchItemRequest,
) -> Result<()> {
    let stock = sqlx::query_as::<_, InventoryStock>(
        "SELECT * FROM inventory_stock WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(item.stock_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::dispatch_item(idx, format!("stock {} not found", item.stock_id)))?;

    if stock.status != StockStatus::InStock {
        return Err(Error::dispatch_item(
            idx,
            format!("stock {} is not in stock", stock.id),
        ));
    }

    let expected = expected_stock_type(item.item_type);
    if stock.stock_type != expected {
        return Err(Error::dispatch_item(
            idx,
            format!(
                "stock {} is {} but item is {}",
                stock.id, stock.stock_type, item.item_type
            ),
        ));
    }

    match item.item_type {
        DispatchItemType::FullRoll | DispatchItemType::Bundle => {
            if item.quantity <= 0 {
                return Err(Error::dispatch_item(idx, "quantity must be positive"));
            }
            if stock.quantity < item.quantity {
                return Err(Error::dispatch_item(
                    idx,
                    format!(
                        "insufficient quantity: available {}, requested {}",
                        stock.quantity, item.quantity
                    ),
                ));
            }
        }
        DispatchItemType::CutPiece => {
            if item.quantity != 1 {
                return Err(Error::dispatch_item(
                    idx,
                    "cut piece items always have quantity 1",
                ));
            }
            let piece_id = item
                .cut_piece_id
                .ok_or_else(|| Error::dispatch_item(idx, "cut_piece_id required"))?;
            let piece = sqlx::query(
                "SELECT status FROM hdpe_cut_pieces
                 WHERE id = $1 AND stock_id = $2 AND deleted_at IS NULL",
            )
            .bind(piece_id)
            .bind(stock.id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                Error::dispatch_item(idx, format!("cut piece {piece_id} not found"))
            })?;
            if piece.get::<String, _>("status") != "IN_STOCK" {
                return Err(Error::dispatch_item(
                    idx,
                    format!("cut piece {piece_id} is not in stock"),
                ));
            }
        }
        DispatchItemType::CutRoll => {
            if item.quantity <= 0 {
                return Err(Error::dispatch_item(idx, "quantity must be positive"));
            }
            let available: i64 = sqlx::query(
                "SELECT COUNT(*) AS n FROM hdpe_cut_pieces
                 WHERE stock_id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL",
            )
            .bind(stock.id)
            .fetch_one(&mut *conn)
            .await?
            .get("n");
            if available < i64::from(item.quantity) {
                return Err(Error::dispatch_item(
                    idx,
                    format!(
                        "insufficient cut pieces: available {available}, requested {}",
                        item.quantity
                    ),
                ));
            }
        }
        DispatchItemType::SparePieces => {
            if item.spare_piece_ids.is_empty() {
                return Err(Error::dispatch_item(
                    idx,
                    "spare_piece_ids required for SPARE_PIECES",
                ));
            }
            if let Some(count) = item.piece_count {
                if count != item.spare_piece_ids.len() as i32 {
                    return Err(Error::dispatch_item(
                        idx,
                        format!(
                            "piece_count {count} does not match {} requested pieces",
                            item.spare_piece_ids.len()
                        ),
                    ));
                }
            }
            for (group_id, requested) in spare_request_counts(&item.spare_piece_ids) {
                let group = sqlx::query(
                    "SELECT piece_count, status FROM sprinkler_spare_pieces
                     WHERE id = $1 AND stock_id = $2 AND deleted_at IS NULL",
                )
                .bind(group_id)
                .bind(stock.id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| {
                    Error::dispatch_item(idx, format!("spare group {group_id} not found"))
                })?;
                if group.get::<String, _>("status") != "IN_STOCK" {
                    return Err(Error::dispatch_item(
                        idx,
                        format!("spare group {group_id} is not in stock"),
                    ));
                }
                let available: i32 = group.get("piece_count");
                if available < requested {
                    return Err(Error::dispatch_item(
                        idx,
                        format!(
                            "not enough pieces in spare group {group_id}: available {available}, requested {requested}"
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

struct AppliedItem {
    length_meters: Option<Decimal>,
    piece_count: Option<i32>,
    note: String,
}

async fn apply_item(
    conn: &mut PgConnection,
    idx: usize,
    item: &DispatchItemRequest,
    stock: &InventoryStock,
    dispatch_id: Uuid,
) -> Result<AppliedItem> {
    match item.item_type {
        DispatchItemType::FullRoll => {
            stocks::decrement_stock_checked(conn, stock, item.quantity).await?;
            Ok(AppliedItem {
                length_meters: stock.length_per_unit,
                piece_count: None,
                note: format!("Full rolls dispatched: {}", item.quantity),
            })
        }
        DispatchItemType::Bundle => {
            stocks::decrement_stock_checked(conn, stock, item.quantity).await?;
            let pieces = stock.pieces_per_bundle.map(|ppb| ppb * item.quantity);
            Ok(AppliedItem {
                length_meters: None,
                piece_count: pieces,
                note: format!("Bundles dispatched: {}", item.quantity),
            })
        }
        DispatchItemType::CutPiece => {
            let piece_id = item
                .cut_piece_id
                .ok_or_else(|| Error::dispatch_item(idx, "cut_piece_id required"))?;
            let row = sqlx::query(
                "UPDATE hdpe_cut_pieces
                 SET status = 'DISPATCHED', dispatch_id = $2,
                     version = version + 1, updated_at = NOW()
                 WHERE id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL
                 RETURNING length_meters",
            )
            .bind(piece_id)
            .bind(dispatch_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                Error::Concurrent(format!("cut piece {piece_id} was consumed concurrently"))
            })?;
            let length: Decimal = row.get("length_meters");

            derivation::sync_stock_quantity(conn, stock.id).await?;
            Ok(AppliedItem {
                length_meters: Some(length),
                piece_count: None,
                note: format!("Cut piece dispatched: {length}m"),
            })
        }
        DispatchItemType::CutRoll => {
            // Consume the oldest IN_STOCK pieces first.
            let result = sqlx::query(
                "UPDATE hdpe_cut_pieces
                 SET status = 'DISPATCHED', dispatch_id = $2,
                     version = version + 1, updated_at = NOW()
                 WHERE id IN (
                     SELECT id FROM hdpe_cut_pieces
                     WHERE stock_id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL
                     ORDER BY created_at, id
                     LIMIT $3
                     FOR UPDATE
                 )",
            )
            .bind(stock.id)
            .bind(dispatch_id)
            .bind(i64::from(item.quantity))
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() < item.quantity as u64 {
                return Err(Error::dispatch_item(
                    idx,
                    format!(
                        "insufficient cut pieces: consumed {}, requested {}",
                        result.rows_affected(),
                        item.quantity
                    ),
                ));
            }

            derivation::sync_stock_quantity(conn, stock.id).await?;
            Ok(AppliedItem {
                length_meters: None,
                piece_count: None,
                note: format!("Cut rolls dispatched: {}", item.quantity),
            })
        }
        DispatchItemType::SparePieces => {
            let mut total_pieces = 0;
            for (group_id, requested) in spare_request_counts(&item.spare_piece_ids) {
                total_pieces += requested;
                dispatch_from_spare_group(conn, idx, group_id, requested, dispatch_id).await?;
            }

            derivation::sync_stock_quantity(conn, stock.id).await?;
            Ok(AppliedItem {
                length_meters: None,
                piece_count: Some(total_pieces),
                note: format!("Spare pieces dispatched: {total_pieces} pcs"),
            })
        }
    }
}

/// Consume `requested` physical pieces from one spare group. A full-group
/// request dispatches the group row itself; a partial request shrinks the
/// group and materializes one DISPATCHED singleton per consumed piece,
/// copying the group's immutable lineage.
async fn dispatch_from_spare_group(
    conn: &mut PgConnection,
    idx: usize,
    group_id: Uuid,
    requested: i32,
    dispatch_id: Uuid,
) -> Result<()> {
    let group = sqlx::query(
        "SELECT piece_count FROM sprinkler_spare_pieces
         WHERE id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(group_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::dispatch_item(idx, format!("spare group {group_id} not found")))?;
    let available: i32 = group.get("piece_count");

    if requested > available {
        return Err(Error::dispatch_item(
            idx,
            format!(
                "not enough pieces in spare group {group_id}: available {available}, requested {requested}"
            ),
        ));
    }

    if requested == available {
        sqlx::query(
            "UPDATE sprinkler_spare_pieces
             SET status = 'DISPATCHED', dispatch_id = $2,
                 version = version + 1, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(group_id)
        .bind(dispatch_id)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            "UPDATE sprinkler_spare_pieces
             SET piece_count = piece_count - $2,
                 version = version + 1, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(group_id)
        .bind(requested)
        .execute(&mut *conn)
        .await?;

        // One record per physical piece is the canonical representation for
        // dispatched spares.
        sqlx::query(
            "INSERT INTO sprinkler_spare_pieces (
                 stock_id, piece_count, piece_length_meters, status,
                 dispatch_id, created_by_transaction_id, original_stock_id
             )
             SELECT sp.stock_id, 1, sp.piece_length_meters, 'DISPATCHED',
                    $2, sp.created_by_transaction_id, sp.original_stock_id
             FROM sprinkler_spare_pieces sp, generate_series(1, $3)
             WHERE sp.id = $1",
        )
        .bind(group_id)
        .bind(dispatch_id)
        .bind(requested)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spare_counts_accumulate_repeats() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let counts = spare_request_counts(&[a, b, a, a]);
        assert_eq!(counts[&a], 3);
        assert_eq!(counts[&b], 1);
    }

    #[test]
    fn item_types_map_to_stock_kinds() {
        assert_eq!(
            expected_stock_type(DispatchItemType::CutPiece),
            StockType::CutRoll
        );
        assert_eq!(
            expected_stock_type(DispatchItemType::SparePieces),
            StockType::Spare
        );
    }
}
