// ============================================================================
// PIPESTOCK - PIECE DATA ACCESS
// ============================================================================
// Module: inventory/src/services/pieces.rs
// Description: Piece creation with immutable lineage, and the spare-group
//              reservation protocol
// ============================================================================
//
// Lineage fields (`created_by_transaction_id`, `original_stock_id`) are set
// exactly once at insert. Nothing in this module, or anywhere else in the
// crate, updates them afterwards; the data layer rejects such updates too.

use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};
use tracing::debug;
use uuid::Uuid;

use pipestock_shared::{Error, Result};

/// Insert one HDPE cut piece. The creating transaction id must already exist
/// in the log (the log row is written first to obtain it).
pub async fn create_cut_piece(
    conn: &mut PgConnection,
    stock_id: Uuid,
    transaction_id: Uuid,
    length_meters: Decimal,
    notes: Option<&str>,
) -> Result<Uuid> {
    if length_meters <= Decimal::ZERO {
        return Err(Error::Validation(format!(
            "invalid cut piece length: {length_meters}"
        )));
    }

    let row = sqlx::query(
        "INSERT INTO hdpe_cut_pieces (
             stock_id, length_meters, status, notes,
             created_by_transaction_id, original_stock_id
         ) VALUES ($1, $2, 'IN_STOCK', $3, $4, $5)
         RETURNING id",
    )
    .bind(stock_id)
    .bind(length_meters)
    .bind(notes)
    .bind(transaction_id)
    .bind(stock_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("id"))
}

/// Insert one sprinkler spare group of `piece_count` physical pieces.
pub async fn create_spare_group(
    conn: &mut PgConnection,
    stock_id: Uuid,
    transaction_id: Uuid,
    piece_count: i32,
    piece_length_meters: Option<Decimal>,
    notes: Option<&str>,
) -> Result<Uuid> {
    if piece_count < 1 {
        return Err(Error::Validation(format!(
            "invalid spare group piece count: {piece_count}"
        )));
    }

    let row = sqlx::query(
        "INSERT INTO sprinkler_spare_pieces (
             stock_id, piece_count, piece_length_meters, status, notes,
             created_by_transaction_id, original_stock_id
         ) VALUES ($1, $2, $3, 'IN_STOCK', $4, $5, $6)
         RETURNING id",
    )
    .bind(stock_id)
    .bind(piece_count)
    .bind(piece_length_meters)
    .bind(notes)
    .bind(transaction_id)
    .bind(stock_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("id"))
}

/// A spare group locked and reserved for a combine operation.
#[derive(Debug, Clone)]
pub struct ReservedGroup {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub piece_count: i32,
    pub version: i32,
}

/// Reserve spare groups for a combine (pessimistic lock, then versioned
/// reservation write).
///
/// Stale reservations are garbage-collected first. Locking uses FOR UPDATE
/// NOWAIT so a group held by a concurrent session surfaces immediately as
/// `PiecesLocked`. A version mismatch between lock and write surfaces as
/// `Concurrent`.
pub async fn reserve_spare_groups(
    conn: &mut PgConnection,
    piece_ids: &[Uuid],
    transaction_id: Uuid,
    timeout_minutes: i64,
) -> Result<Vec<ReservedGroup>> {
    release_stale_reservations(conn, timeout_minutes).await?;

    let rows = sqlx::query(
        "SELECT id, stock_id, piece_count, status, version, reserved_by_transaction_id
         FROM sprinkler_spare_pieces
         WHERE id = ANY($1)
           AND deleted_at IS NULL
         FOR UPDATE NOWAIT",
    )
    .bind(piece_ids)
    .fetch_all(&mut *conn)
    .await?;

    if rows.len() != piece_ids.len() {
        let found: std::collections::HashSet<Uuid> =
            rows.iter().map(|r| r.get::<Uuid, _>("id")).collect();
        let missing: Vec<String> = piece_ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(ToString::to_string)
            .collect();
        return Err(Error::NotFound(format!(
            "spare pieces not found: {}",
            missing.join(", ")
        )));
    }

    let already_reserved = rows
        .iter()
        .filter(|r| {
            r.get::<Option<Uuid>, _>("reserved_by_transaction_id")
                .is_some_and(|t| t != transaction_id)
        })
        .count();
    if already_reserved > 0 {
        return Err(Error::PiecesLocked);
    }

    let not_available = rows
        .iter()
        .filter(|r| r.get::<String, _>("status") != "IN_STOCK")
        .count();
    if not_available > 0 {
        return Err(Error::Validation(format!(
            "{not_available} spare pieces not IN_STOCK"
        )));
    }

    let mut reserved = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: Uuid = row.get("id");
        let version: i32 = row.get("version");

        let result = sqlx::query(
            "UPDATE sprinkler_spare_pieces
             SET reserved_by_transaction_id = $1,
                 reserved_at = NOW(),
                 version = version + 1,
                 updated_at = NOW()
             WHERE id = $2 AND version = $3",
        )
        .bind(transaction_id)
        .bind(id)
        .bind(version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Concurrent(format!(
                "spare piece {id} was modified by another transaction"
            )));
        }

        reserved.push(ReservedGroup {
            id,
            stock_id: row.get("stock_id"),
            piece_count: row.get("piece_count"),
            version: version + 1,
        });
    }

    debug!(count = reserved.len(), %transaction_id, "reserved spare groups");
    Ok(reserved)
}

/// Release reservations held by a transaction.
pub async fn release_spare_reservations(
    conn: &mut PgConnection,
    piece_ids: &[Uuid],
    transaction_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET reserved_by_transaction_id = NULL,
             reserved_at = NULL,
             updated_at = NOW()
         WHERE id = ANY($1)
           AND reserved_by_transaction_id = $2",
    )
    .bind(piece_ids)
    .bind(transaction_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Clear reservations older than the timeout. Run before each reservation
/// attempt; abandoned sessions release their holds this way.
pub async fn release_stale_reservations(
    conn: &mut PgConnection,
    timeout_minutes: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET reserved_by_transaction_id = NULL,
             reserved_at = NULL,
             updated_at = NOW()
         WHERE reserved_at < NOW() - ($1 * INTERVAL '1 minute')",
    )
    .bind(timeout_minutes)
    .execute(&mut *conn)
    .await?;

    let released = result.rows_affected();
    if released > 0 {
        debug!(released, "released stale spare reservations");
    }
    Ok(released)
}

/// Consume reserved spare groups: SOLD_OUT, soft-deleted, stamped with the
/// deleting transaction. Lineage fields are not touched.
pub async fn consume_spare_groups(
    conn: &mut PgConnection,
    piece_ids: &[Uuid],
    transaction_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE sprinkler_spare_pieces
         SET status = 'SOLD_OUT',
             deleted_at = NOW(),
             deleted_by_transaction_id = $1,
             reserved_by_transaction_id = NULL,
             reserved_at = NULL,
             version = version + 1,
             updated_at = NOW()
         WHERE id = ANY($2)",
    )
    .bind(transaction_id)
    .bind(piece_ids)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
