// ============================================================================
// PIPESTOCK - RETURN SERVICE
// ============================================================================
// Module: inventory/src/services/returns.rs
// Description: CreateReturn; returned goods always land in fresh batches so
//              the audit trail stays independent of production lots
// ============================================================================

use chrono::Datelike;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use pipestock_shared::{begin_serializable, Error, Result};

use crate::models::{
    ProductCategory, ReturnItemRequest, ReturnItemType, ReturnRequest, ReturnResult,
    TransactionType,
};
use crate::services::{derivation, numbering, pieces, stocks, txlog, variants};

#[derive(Clone)]
pub struct ReturnService {
    pool: PgPool,
}

impl ReturnService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a return. Items resolve to product variants (created on demand,
    /// with parameter normalization applied to both sides of the lookup);
    /// each distinct variant gets a brand-new batch coded
    /// `{return_number}-{NN}` and one RETURN transaction.
    pub async fn create_return(
        &self,
        request: ReturnRequest,
        user_id: Uuid,
    ) -> Result<ReturnResult> {
        request
            .validate()
            .map_err(|e| Error::InvalidReturn(e.to_string()))?;
        for (idx, item) in request.items.iter().enumerate() {
            validate_item(idx, item)?;
        }

        let mut tx = begin_serializable(&self.pool).await?;

        let year = request.return_date.year();
        let return_number = numbering::next_return_number(&mut tx, year).await?;

        let return_row = sqlx::query(
            "INSERT INTO returns (
                 return_number, customer_id, return_date, notes, status, created_by
             ) VALUES ($1, $2, $3, $4, 'RECEIVED', $5)
             RETURNING id",
        )
        .bind(&return_number)
        .bind(request.customer_id)
        .bind(request.return_date)
        .bind(request.notes.as_deref())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let return_id: Uuid = return_row.get("id");

        // Resolve variants up front and group items, preserving first-seen
        // variant order for batch numbering.
        let mut groups: Vec<(Uuid, ProductCategory, Vec<&ReturnItemRequest>)> = Vec::new();
        for (idx, item) in request.items.iter().enumerate() {
            let variant_id = variants::find_or_create_variant(
                &mut tx,
                item.product_type_id,
                item.brand_id,
                &item.parameters,
            )
            .await?;
            let category = variants::category_for_variant(&mut tx, variant_id).await?;
            check_item_category(idx, item, category)?;

            match groups.iter_mut().find(|(v, _, _)| *v == variant_id) {
                Some((_, _, items)) => items.push(item),
                None => groups.push((variant_id, category, vec![item])),
            }
        }

        let mut transaction_ids = Vec::with_capacity(groups.len());
        for (seq, (variant_id, category, items)) in groups.iter().enumerate() {
            let txn_id = create_variant_return(
                &mut tx,
                return_id,
                &return_number,
                seq + 1,
                *variant_id,
                *category,
                items,
                &request,
                user_id,
            )
            .await?;
            transaction_ids.push(txn_id);
        }

        tx.commit().await?;

        info!(%return_id, %return_number, variants = transaction_ids.len(), "created return");
        Ok(ReturnResult {
            return_id,
            return_number,
            transaction_ids,
        })
    }
}

fn validate_item(idx: usize, item: &ReturnItemRequest) -> Result<()> {
    match item.item_type {
        ReturnItemType::FullRoll | ReturnItemType::CutRoll => {
            if item.rolls.is_empty() {
                return Err(Error::return_item(idx, "rolls required for roll returns"));
            }
            if item.rolls.iter().any(|r| r.length_meters <= Decimal::ZERO) {
                return Err(Error::return_item(idx, "roll lengths must be positive"));
            }
        }
        ReturnItemType::Bundle => {
            if item.bundles.is_empty() {
                return Err(Error::return_item(idx, "bundles required for bundle returns"));
            }
            if item.bundles.iter().any(|b| b.bundle_size <= 0) {
                return Err(Error::return_item(idx, "bundle sizes must be positive"));
            }
        }
        ReturnItemType::SparePieces => {
            let count = item
                .piece_count
                .ok_or_else(|| Error::return_item(idx, "piece_count required"))?;
            if count <= 0 {
                return Err(Error::return_item(idx, "piece_count must be positive"));
            }
        }
    }
    Ok(())
}

fn check_item_category(
    idx: usize,
    item: &ReturnItemRequest,
    category: ProductCategory,
) -> Result<()> {
    let ok = match item.item_type {
        ReturnItemType::FullRoll | ReturnItemType::CutRoll => category == ProductCategory::Hdpe,
        ReturnItemType::Bundle => category == ProductCategory::Sprinkler,
        // Spare pieces exist in both families: sprinkler spares are piece
        // groups, HDPE spares are loose cut lengths.
        ReturnItemType::SparePieces => {
            !(category == ProductCategory::Hdpe && item.piece_length_meters.is_none())
        }
    };
    if ok {
        Ok(())
    } else {
        Err(Error::return_item(
            idx,
            format!(
                "item type {} does not fit product category {category:?}",
                item.item_type.as_str()
            ),
        ))
    }
}

/// Native-unit quantity of one return item (rolls/pieces).
fn item_quantity(item: &ReturnItemRequest) -> i32 {
    match item.item_type {
        ReturnItemType::FullRoll | ReturnItemType::CutRoll => item.rolls.len() as i32,
        ReturnItemType::Bundle => item.bundles.iter().map(|b| b.bundle_size).sum(),
        ReturnItemType::SparePieces => item.piece_count.unwrap_or(0),
    }
}

/// Breakdown string for the RETURN transaction notes:
/// `{N}R + {N}C + {N}B + {N}S`, omitting zero components.
fn breakdown_note(items: &[&ReturnItemRequest]) -> String {
    let mut full_rolls = 0usize;
    let mut cut_rolls = 0usize;
    let mut bundles = 0usize;
    let mut spares = 0i32;
    for item in items {
        match item.item_type {
            ReturnItemType::FullRoll => full_rolls += item.rolls.len(),
            ReturnItemType::CutRoll => cut_rolls += item.rolls.len(),
            ReturnItemType::Bundle => bundles += item.bundles.len(),
            ReturnItemType::SparePieces => spares += item.piece_count.unwrap_or(0),
        }
    }

    let mut parts = Vec::new();
    if full_rolls > 0 {
        parts.push(format!("{full_rolls}R"));
    }
    if cut_rolls > 0 {
        parts.push(format!("{cut_rolls}C"));
    }
    if bundles > 0 {
        parts.push(format!("{bundles}B"));
    }
    if spares > 0 {
        parts.push(format!("{spares}S"));
    }
    if parts.is_empty() {
        "0".to_string()
    } else {
        parts.join(" + ")
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_variant_return(
    conn: &mut PgConnection,
    return_id: Uuid,
    return_number: &str,
    sequence: usize,
    variant_id: Uuid,
    category: ProductCategory,
    items: &[&ReturnItemRequest],
    request: &ReturnRequest,
    user_id: Uuid,
) -> Result<Uuid> {
    let total_quantity: i32 = items.iter().map(|i| item_quantity(i)).sum();
    let batch_code = format!("{return_number}-{sequence:02}");

    let batch_row = sqlx::query(
        "INSERT INTO batches (
             batch_code, batch_no, product_variant_id, production_date,
             initial_quantity, current_quantity, notes, created_by
         ) VALUES ($1, $1, $2, $3, $4, $4, $5, $6)
         RETURNING id",
    )
    .bind(&batch_code)
    .bind(variant_id)
    .bind(request.return_date)
    .bind(total_quantity)
    .bind(format!("Return {return_number}"))
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    let batch_id: Uuid = batch_row.get("id");

    let txn_id = txlog::append(
        conn,
        TransactionType::Return,
        txlog::NewTransaction {
            to_quantity: Some(total_quantity),
            batch_id: Some(batch_id),
            notes: Some(breakdown_note(items)),
            created_by: Some(user_id),
            ..Default::default()
        },
    )
    .await?;

    let mut first_stock_id: Option<Uuid> = None;
    for item in items {
        let return_item_row = sqlx::query(
            "INSERT INTO return_items (
                 return_id, product_variant_id, batch_id, item_type,
                 quantity, piece_count, piece_length_meters, notes
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(return_id)
        .bind(variant_id)
        .bind(batch_id)
        .bind(item.item_type.as_str())
        .bind(item_quantity(item))
        .bind(item.piece_count)
        .bind(item.piece_length_meters)
        .bind(item.notes.as_deref())
        .fetch_one(&mut *conn)
        .await?;
        let return_item_id: Uuid = return_item_row.get("id");

        let stock_id =
            create_item_stock(conn, batch_id, variant_id, category, item, return_item_id, txn_id)
                .await?;
        first_stock_id.get_or_insert(stock_id);
    }

    // The log row predates the stock rows; point it at the first one now.
    if let Some(stock_id) = first_stock_id {
        sqlx::query("UPDATE inventory_transactions SET to_stock_id = $2 WHERE id = $1")
            .bind(txn_id)
            .bind(stock_id)
            .execute(&mut *conn)
            .await?;
    }

    derivation::sync_batch_quantity(conn, batch_id).await?;

    Ok(txn_id)
}

/// Create the stock (and pieces) for one return item; returns the first stock
/// row created.
async fn create_item_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    variant_id: Uuid,
    category: ProductCategory,
    item: &ReturnItemRequest,
    return_item_id: Uuid,
    txn_id: Uuid,
) -> Result<Uuid> {
    match item.item_type {
        ReturnItemType::FullRoll => {
            // One stock per distinct roll length.
            let mut by_length: Vec<(Decimal, i32)> = Vec::new();
            for roll in &item.rolls {
                match by_length.iter_mut().find(|(l, _)| *l == roll.length_meters) {
                    Some((_, n)) => *n += 1,
                    None => by_length.push((roll.length_meters, 1)),
                }
            }

            let mut first = None;
            for (length, count) in by_length {
                let stock_id = stocks::create_full_roll_stock(
                    conn, batch_id, variant_id, count, length, None,
                )
                .await?;
                first.get_or_insert(stock_id);

                for roll in item.rolls.iter().filter(|r| r.length_meters == length) {
                    record_return_roll(conn, return_item_id, stock_id, roll.length_meters).await?;
                }
            }
            first.ok_or_else(|| Error::Internal("no roll stock created".into()))
        }
        ReturnItemType::CutRoll => {
            let mut by_length: Vec<Decimal> = Vec::new();
            for roll in &item.rolls {
                if !by_length.contains(&roll.length_meters) {
                    by_length.push(roll.length_meters);
                }
            }

            let mut first = None;
            for length in by_length {
                let stock_id = stocks::create_piece_backed_stock(
                    conn, batch_id, variant_id, "CUT_ROLL", None, None, None,
                )
                .await?;
                first.get_or_insert(stock_id);

                for roll in item.rolls.iter().filter(|r| r.length_meters == length) {
                    pieces::create_cut_piece(conn, stock_id, txn_id, roll.length_meters, None)
                        .await?;
                    record_return_roll(conn, return_item_id, stock_id, roll.length_meters).await?;
                }
                derivation::sync_stock_quantity(conn, stock_id).await?;
            }
            first.ok_or_else(|| Error::Internal("no cut stock created".into()))
        }
        ReturnItemType::Bundle => {
            // One stock per distinct (bundle size, piece length).
            let mut shapes: Vec<(i32, Option<Decimal>, i32)> = Vec::new();
            for bundle in &item.bundles {
                let key = (bundle.bundle_size, bundle.piece_length_meters);
                match shapes
                    .iter_mut()
                    .find(|(s, l, _)| (*s, *l) == key)
                {
                    Some((_, _, n)) => *n += 1,
                    None => shapes.push((key.0, key.1, 1)),
                }
            }

            let mut first = None;
            for (bundle_size, piece_length, count) in shapes {
                let stock_id = stocks::create_bundle_stock(
                    conn,
                    batch_id,
                    variant_id,
                    count,
                    bundle_size,
                    piece_length,
                    None,
                )
                .await?;
                first.get_or_insert(stock_id);

                for bundle in item
                    .bundles
                    .iter()
                    .filter(|b| b.bundle_size == bundle_size && b.piece_length_meters == piece_length)
                {
                    sqlx::query(
                        "INSERT INTO return_bundles (
                             return_item_id, stock_id, bundle_size, piece_length_meters
                         ) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(return_item_id)
                    .bind(stock_id)
                    .bind(bundle.bundle_size)
                    .bind(bundle.piece_length_meters)
                    .execute(&mut *conn)
                    .await?;
                }
            }
            first.ok_or_else(|| Error::Internal("no bundle stock created".into()))
        }
        ReturnItemType::SparePieces => {
            let count = item.piece_count.unwrap_or(0);
            match category {
                ProductCategory::Sprinkler => {
                    let stock_id = stocks::create_piece_backed_stock(
                        conn,
                        batch_id,
                        variant_id,
                        "SPARE",
                        item.piece_length_meters,
                        None,
                        None,
                    )
                    .await?;
                    for _ in 0..count {
                        pieces::create_spare_group(
                            conn,
                            stock_id,
                            txn_id,
                            1,
                            item.piece_length_meters,
                            None,
                        )
                        .await?;
                    }
                    derivation::sync_stock_quantity(conn, stock_id).await?;
                    Ok(stock_id)
                }
                ProductCategory::Hdpe => {
                    let length = item.piece_length_meters.ok_or_else(|| {
                        Error::InvalidReturn("piece_length_meters required for HDPE spares".into())
                    })?;
                    let stock_id = stocks::create_piece_backed_stock(
                        conn, batch_id, variant_id, "CUT_ROLL", None, None, None,
                    )
                    .await?;
                    for _ in 0..count {
                        pieces::create_cut_piece(conn, stock_id, txn_id, length, None).await?;
                        record_return_roll(conn, return_item_id, stock_id, length).await?;
                    }
                    derivation::sync_stock_quantity(conn, stock_id).await?;
                    Ok(stock_id)
                }
            }
        }
    }
}

async fn record_return_roll(
    conn: &mut PgConnection,
    return_item_id: Uuid,
    stock_id: Uuid,
    length_meters: Decimal,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO return_rolls (return_item_id, stock_id, length_meters)
         VALUES ($1, $2, $3)",
    )
    .bind(return_item_id)
    .bind(stock_id)
    .bind(length_meters)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
