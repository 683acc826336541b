// ============================================================================
// PIPESTOCK - AGGREGATE STOCK DATA ACCESS
// ============================================================================
// Module: inventory/src/services/stocks.rs
// Description: Row locking, find-or-create, and guarded quantity adjustments
//              for aggregate inventory stock
// ============================================================================

use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use pipestock_shared::{Error, Result};

use crate::models::InventoryStock;

/// Lock a live stock row for the duration of the enclosing transaction.
pub async fn lock_live_stock(conn: &mut PgConnection, stock_id: Uuid) -> Result<InventoryStock> {
    sqlx::query_as::<_, InventoryStock>(
        "SELECT * FROM inventory_stock
         WHERE id = $1 AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(stock_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("stock {stock_id} not found or deleted")))
}

/// Lock a stock row whether or not it is soft-deleted. Revert paths must be
/// able to reconstruct state on deleted rows.
pub async fn lock_stock_any(conn: &mut PgConnection, stock_id: Uuid) -> Result<InventoryStock> {
    sqlx::query_as::<_, InventoryStock>("SELECT * FROM inventory_stock WHERE id = $1 FOR UPDATE")
        .bind(stock_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock {stock_id}")))
}

pub async fn create_full_roll_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    product_variant_id: Uuid,
    quantity: i32,
    length_per_unit: Decimal,
    notes: Option<&str>,
) -> Result<Uuid> {
    let row = sqlx::query(
        "INSERT INTO inventory_stock (
             batch_id, product_variant_id, stock_type, quantity,
             status, length_per_unit, notes
         ) VALUES ($1, $2, 'FULL_ROLL', $3, 'IN_STOCK', $4, $5)
         RETURNING id",
    )
    .bind(batch_id)
    .bind(product_variant_id)
    .bind(quantity)
    .bind(length_per_unit)
    .bind(notes)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("id"))
}

pub async fn create_bundle_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    product_variant_id: Uuid,
    quantity: i32,
    pieces_per_bundle: i32,
    piece_length_meters: Option<Decimal>,
    notes: Option<&str>,
) -> Result<Uuid> {
    let row = sqlx::query(
        "INSERT INTO inventory_stock (
             batch_id, product_variant_id, stock_type, quantity,
             status, pieces_per_bundle, piece_length_meters, notes
         ) VALUES ($1, $2, 'BUNDLE', $3, 'IN_STOCK', $4, $5, $6)
         RETURNING id",
    )
    .bind(batch_id)
    .bind(product_variant_id)
    .bind(quantity)
    .bind(pieces_per_bundle)
    .bind(piece_length_meters)
    .bind(notes)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("id"))
}

/// Piece-backed stock rows start at quantity 0; Rule A fills them in once
/// their pieces exist.
pub async fn create_piece_backed_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    product_variant_id: Uuid,
    stock_type: &str,
    piece_length_meters: Option<Decimal>,
    parent_stock_id: Option<Uuid>,
    notes: Option<&str>,
) -> Result<Uuid> {
    let row = sqlx::query(
        "INSERT INTO inventory_stock (
             batch_id, product_variant_id, stock_type, quantity,
             status, piece_length_meters, parent_stock_id, notes
         ) VALUES ($1, $2, $3, 0, 'IN_STOCK', $4, $5, $6)
         RETURNING id",
    )
    .bind(batch_id)
    .bind(product_variant_id)
    .bind(stock_type)
    .bind(piece_length_meters)
    .bind(parent_stock_id)
    .bind(notes)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("id"))
}

/// Destination CUT_ROLL stock for a cut, keyed by the source roll.
pub async fn find_or_create_cut_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    product_variant_id: Uuid,
    parent_stock_id: Uuid,
    notes: Option<&str>,
) -> Result<Uuid> {
    let existing = sqlx::query(
        "SELECT id FROM inventory_stock
         WHERE batch_id = $1
           AND product_variant_id = $2
           AND stock_type = 'CUT_ROLL'
           AND parent_stock_id = $3
           AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(batch_id)
    .bind(product_variant_id)
    .bind(parent_stock_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = existing {
        return Ok(row.get("id"));
    }

    create_piece_backed_stock(
        conn,
        batch_id,
        product_variant_id,
        "CUT_ROLL",
        None,
        Some(parent_stock_id),
        notes,
    )
    .await
}

/// Destination SPARE stock for a split, keyed by piece length.
pub async fn find_or_create_spare_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    product_variant_id: Uuid,
    piece_length_meters: Option<Decimal>,
    parent_stock_id: Option<Uuid>,
    notes: Option<&str>,
) -> Result<Uuid> {
    let existing = sqlx::query(
        "SELECT id FROM inventory_stock
         WHERE batch_id = $1
           AND product_variant_id = $2
           AND stock_type = 'SPARE'
           AND piece_length_meters IS NOT DISTINCT FROM $3
           AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(batch_id)
    .bind(product_variant_id)
    .bind(piece_length_meters)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = existing {
        return Ok(row.get("id"));
    }

    create_piece_backed_stock(
        conn,
        batch_id,
        product_variant_id,
        "SPARE",
        piece_length_meters,
        parent_stock_id,
        notes,
    )
    .await
}

/// Locate and lock a live BUNDLE stock matching (batch, variant, bundle size,
/// piece length), if one exists.
pub async fn find_bundle_stock_for_update(
    conn: &mut PgConnection,
    batch_id: Uuid,
    product_variant_id: Uuid,
    pieces_per_bundle: i32,
    piece_length_meters: Option<Decimal>,
) -> Result<Option<InventoryStock>> {
    let stock = sqlx::query_as::<_, InventoryStock>(
        "SELECT * FROM inventory_stock
         WHERE batch_id = $1
           AND product_variant_id = $2
           AND stock_type = 'BUNDLE'
           AND pieces_per_bundle = $3
           AND piece_length_meters IS NOT DISTINCT FROM $4
           AND deleted_at IS NULL
         FOR UPDATE",
    )
    .bind(batch_id)
    .bind(product_variant_id)
    .bind(pieces_per_bundle)
    .bind(piece_length_meters)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(stock)
}

/// Version-guarded decrement for directly-maintained quantities (FULL_ROLL,
/// BUNDLE). Hitting zero soft-deletes the row. An insufficient quantity or a
/// version that moved underneath us affects zero rows and surfaces as
/// `Concurrent`.
pub async fn decrement_stock_checked(
    conn: &mut PgConnection,
    stock: &InventoryStock,
    by: i32,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE inventory_stock
         SET quantity = quantity - $2,
             status = CASE WHEN quantity - $2 = 0 THEN 'SOLD_OUT' ELSE status END,
             deleted_at = CASE WHEN quantity - $2 = 0 THEN NOW() ELSE deleted_at END,
             version = version + 1,
             updated_at = NOW()
         WHERE id = $1
           AND version = $3
           AND quantity >= $2",
    )
    .bind(stock.id)
    .bind(by)
    .bind(stock.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Concurrent(format!(
            "stock {} was modified concurrently",
            stock.id
        )));
    }
    Ok(())
}

/// Version-guarded increment; restores the row to live/IN_STOCK.
pub async fn increment_stock_checked(
    conn: &mut PgConnection,
    stock: &InventoryStock,
    by: i32,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE inventory_stock
         SET quantity = quantity + $2,
             status = 'IN_STOCK',
             deleted_at = NULL,
             deleted_by_transaction_id = NULL,
             version = version + 1,
             updated_at = NOW()
         WHERE id = $1
           AND version = $3",
    )
    .bind(stock.id)
    .bind(by)
    .bind(stock.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Concurrent(format!(
            "stock {} was modified concurrently",
            stock.id
        )));
    }
    Ok(())
}

/// Unguarded restore for revert paths, which hold the row lock and operate on
/// possibly soft-deleted rows.
pub async fn restore_stock_quantity(
    conn: &mut PgConnection,
    stock_id: Uuid,
    by: i32,
) -> Result<()> {
    sqlx::query(
        "UPDATE inventory_stock
         SET quantity = quantity + $2,
             status = 'IN_STOCK',
             deleted_at = NULL,
             deleted_by_transaction_id = NULL,
             version = version + 1,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(stock_id)
    .bind(by)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
