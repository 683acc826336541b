// ============================================================================
// PIPESTOCK - SCRAP SERVICE
// ============================================================================
// Module: inventory/src/services/scrap.rs
// Description: CreateScrap; one scrap covers a single product category and a
//              single stock kind
// ============================================================================

use chrono::Datelike;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use pipestock_shared::{begin_serializable, Error, Result};

use crate::models::{
    InventoryStock, PieceKind, ScrapItemRequest, ScrapRequest, ScrapResult, StockType,
};
use crate::services::{derivation, numbering, stocks, variants};

#[derive(Clone)]
pub struct ScrapService {
    pool: PgPool,
}

impl ScrapService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Scrap stock or individual pieces. Scraps carry no inventory
    /// transaction rows; the unified timeline reads the scrap documents
    /// directly.
    pub async fn create_scrap(&self, request: ScrapRequest, user_id: Uuid) -> Result<ScrapResult> {
        request
            .validate()
            .map_err(|e| Error::InvalidScrap(e.to_string()))?;

        let mut tx = begin_serializable(&self.pool).await?;

        // Load and lock every stock up front; the single-kind and
        // single-category rules apply across the whole document.
        let mut loaded: Vec<InventoryStock> = Vec::with_capacity(request.items.len());
        for (idx, item) in request.items.iter().enumerate() {
            let stock = stocks::lock_live_stock(&mut tx, item.stock_id)
                .await
                .map_err(|e| Error::scrap_item(idx, e))?;
            if stock.stock_type != item.item_type {
                return Err(Error::scrap_item(
                    idx,
                    format!(
                        "stock {} is {} but item says {}",
                        stock.id, stock.stock_type, item.item_type
                    ),
                ));
            }
            loaded.push(stock);
        }

        let first_type = loaded[0].stock_type;
        if loaded.iter().any(|s| s.stock_type != first_type) {
            return Err(Error::MixedScrapForbidden(
                "all items in one scrap must share a single stock type".into(),
            ));
        }

        let first_category =
            variants::category_for_variant(&mut tx, loaded[0].product_variant_id).await?;
        for stock in &loaded[1..] {
            let category =
                variants::category_for_variant(&mut tx, stock.product_variant_id).await?;
            if category != first_category {
                return Err(Error::MixedScrapForbidden(
                    "all items in one scrap must share a single product category".into(),
                ));
            }
        }

        let total_quantity: i32 = request.items.iter().map(|i| i.quantity_to_scrap).sum();
        let estimated_loss = request
            .items
            .iter()
            .filter_map(|i| i.estimated_value)
            .reduce(|a, b| a + b);

        let year = request.scrap_date.year();
        let scrap_number = numbering::next_scrap_number(&mut tx, year).await?;

        let scrap_row = sqlx::query(
            "INSERT INTO scraps (
                 scrap_number, scrap_date, reason, status, total_quantity,
                 estimated_loss, notes, created_by
             ) VALUES ($1, $2, $3, 'SCRAPPED', $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&scrap_number)
        .bind(request.scrap_date)
        .bind(&request.reason)
        .bind(total_quantity)
        .bind(estimated_loss)
        .bind(request.notes.as_deref())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let scrap_id: Uuid = scrap_row.get("id");

        let mut affected_batches = Vec::new();
        for (idx, (item, stock)) in request.items.iter().zip(&loaded).enumerate() {
            apply_scrap_item(&mut tx, scrap_id, idx, item, stock).await?;
            if !affected_batches.contains(&stock.batch_id) {
                affected_batches.push(stock.batch_id);
            }
        }

        for batch_id in &affected_batches {
            derivation::sync_batch_quantity(&mut tx, *batch_id).await?;
        }

        tx.commit().await?;

        info!(%scrap_id, %scrap_number, total_quantity, "created scrap");
        Ok(ScrapResult {
            scrap_id,
            scrap_number,
            total_quantity,
        })
    }
}

async fn apply_scrap_item(
    conn: &mut PgConnection,
    scrap_id: Uuid,
    idx: usize,
    item: &ScrapItemRequest,
    stock: &InventoryStock,
) -> Result<()> {
    if item.quantity_to_scrap <= 0 {
        return Err(Error::scrap_item(idx, "quantity to scrap must be positive"));
    }

    let item_row = sqlx::query(
        "INSERT INTO scrap_items (
             scrap_id, stock_id, batch_id, product_variant_id, item_type,
             quantity_scrapped, original_quantity, original_status,
             length_per_unit, piece_length_meters, estimated_value
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id",
    )
    .bind(scrap_id)
    .bind(stock.id)
    .bind(stock.batch_id)
    .bind(stock.product_variant_id)
    .bind(stock.stock_type.as_str())
    .bind(item.quantity_to_scrap)
    .bind(stock.quantity)
    .bind(stock.status.as_str())
    .bind(stock.length_per_unit)
    .bind(stock.piece_length_meters)
    .bind(item.estimated_value)
    .fetch_one(&mut *conn)
    .await?;
    let scrap_item_id: Uuid = item_row.get("id");

    match stock.stock_type {
        StockType::FullRoll | StockType::Bundle => {
            if !item.piece_ids.is_empty() {
                return Err(Error::scrap_item(
                    idx,
                    "piece_ids are only valid for piece-backed stock",
                ));
            }
            if stock.quantity < item.quantity_to_scrap {
                return Err(Error::scrap_item(
                    idx,
                    format!(
                        "insufficient quantity: available {}, requested {}",
                        stock.quantity, item.quantity_to_scrap
                    ),
                ));
            }
            stocks::decrement_stock_checked(conn, stock, item.quantity_to_scrap).await?;
        }
        StockType::CutRoll => {
            if item.piece_ids.len() as i32 != item.quantity_to_scrap {
                return Err(Error::scrap_item(
                    idx,
                    "quantity_to_scrap must match the number of piece ids",
                ));
            }
            for piece_id in &item.piece_ids {
                let row = sqlx::query(
                    "UPDATE hdpe_cut_pieces
                     SET status = 'SCRAPPED', version = version + 1, updated_at = NOW()
                     WHERE id = $1 AND stock_id = $2
                       AND status = 'IN_STOCK' AND deleted_at IS NULL
                     RETURNING length_meters",
                )
                .bind(piece_id)
                .bind(stock.id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| {
                    Error::scrap_item(idx, format!("cut piece {piece_id} not available"))
                })?;

                sqlx::query(
                    "INSERT INTO scrap_pieces (
                         scrap_item_id, original_piece_id, piece_type, length_meters
                     ) VALUES ($1, $2, $3, $4)",
                )
                .bind(scrap_item_id)
                .bind(piece_id)
                .bind(PieceKind::Hdpe.as_str())
                .bind(row.get::<rust_decimal::Decimal, _>("length_meters"))
                .execute(&mut *conn)
                .await?;
            }
            derivation::sync_stock_quantity(conn, stock.id).await?;
        }
        StockType::Spare => {
            if item.piece_ids.is_empty() {
                return Err(Error::scrap_item(idx, "piece_ids required for SPARE scrap"));
            }
            for piece_id in &item.piece_ids {
                let row = sqlx::query(
                    "UPDATE sprinkler_spare_pieces
                     SET status = 'SCRAPPED', version = version + 1, updated_at = NOW()
                     WHERE id = $1 AND stock_id = $2
                       AND status = 'IN_STOCK' AND deleted_at IS NULL
                     RETURNING piece_count",
                )
                .bind(piece_id)
                .bind(stock.id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| {
                    Error::scrap_item(idx, format!("spare group {piece_id} not available"))
                })?;

                sqlx::query(
                    "INSERT INTO scrap_pieces (
                         scrap_item_id, original_piece_id, piece_type, piece_count
                     ) VALUES ($1, $2, $3, $4)",
                )
                .bind(scrap_item_id)
                .bind(piece_id)
                .bind(PieceKind::Sprinkler.as_str())
                .bind(row.get::<i32, _>("piece_count"))
                .execute(&mut *conn)
                .await?;
            }
            derivation::sync_stock_quantity(conn, stock.id).await?;
        }
    }

    Ok(())
}
