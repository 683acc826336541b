// ============================================================================
// PIPESTOCK - QUERY SURFACE
// ============================================================================
// Module: inventory/src/services/queries.rs
// Description: Read-only projections: available stock, batch history, piece
//              audit trails, and the unified transaction timeline
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use pipestock_shared::{Error, Result};

use crate::models::{
    HdpeCutPiece, InventoryTransaction, PieceKind, ProductCategory, SprinklerSparePiece,
    StockType, TransactionHandle,
};

/// Filters for `list_available_stock`. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub product_variant_id: Option<Uuid>,
    pub stock_type: Option<StockType>,
    pub category: Option<ProductCategory>,
}

/// One available stock row with its catalog context.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableStock {
    pub stock_id: Uuid,
    pub batch_id: Uuid,
    pub batch_code: String,
    pub product_variant_id: Uuid,
    pub product_type: String,
    pub brand: String,
    pub product_category: Option<ProductCategory>,
    pub stock_type: StockType,
    pub quantity: i32,
    pub length_per_unit: Option<Decimal>,
    pub pieces_per_bundle: Option<i32>,
    pub piece_length_meters: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// A batch with its full transaction history, newest first. The PRODUCTION
/// entry's `stock_snapshot` is the ground truth for the batch's original
/// composition.
#[derive(Debug, Clone, Serialize)]
pub struct BatchHistory {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub batch_no: String,
    pub initial_quantity: i32,
    pub current_quantity: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub transactions: Vec<InventoryTransaction>,
}

/// One event in a piece's life.
#[derive(Debug, Clone, Serialize)]
pub struct PieceAuditEvent {
    pub event: String,
    pub occurred_at: DateTime<Utc>,
    pub transaction_id: Option<Uuid>,
    pub dispatch_id: Option<Uuid>,
}

/// One row of the unified timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub handle: TransactionHandle,
    pub description: String,
    pub quantity_change: i64,
    pub occurred_at: DateTime<Utc>,
    pub reverted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct QueryService {
    pool: PgPool,
}

impl QueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Live, in-stock aggregate rows joined with their catalog context.
    pub async fn list_available_stock(&self, filter: StockFilter) -> Result<Vec<AvailableStock>> {
        let mut query = sqlx::QueryBuilder::new(
            "SELECT s.id AS stock_id, s.batch_id, b.batch_code,
                    s.product_variant_id, pt.name AS product_type, br.name AS brand,
                    s.stock_type, s.quantity, s.length_per_unit,
                    s.pieces_per_bundle, s.piece_length_meters, s.created_at
             FROM inventory_stock s
             JOIN batches b ON s.batch_id = b.id
             JOIN product_variants pv ON s.product_variant_id = pv.id
             JOIN product_types pt ON pv.product_type_id = pt.id
             JOIN brands br ON pv.brand_id = br.id
             WHERE s.status = 'IN_STOCK' AND s.deleted_at IS NULL",
        );

        if let Some(variant_id) = filter.product_variant_id {
            query.push(" AND s.product_variant_id = ");
            query.push_bind(variant_id);
        }
        if let Some(stock_type) = filter.stock_type {
            query.push(" AND s.stock_type = ");
            query.push_bind(stock_type.as_str());
        }

        query.push(" ORDER BY s.created_at DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let product_type: String = row.get("product_type");
            let category = ProductCategory::from_type_name(&product_type);
            if let Some(wanted) = filter.category {
                if category != Some(wanted) {
                    continue;
                }
            }
            result.push(AvailableStock {
                stock_id: row.get("stock_id"),
                batch_id: row.get("batch_id"),
                batch_code: row.get("batch_code"),
                product_variant_id: row.get("product_variant_id"),
                product_category: category,
                product_type,
                brand: row.get("brand"),
                stock_type: row
                    .get::<String, _>("stock_type")
                    .parse()
                    .map_err(Error::Internal)?,
                quantity: row.get("quantity"),
                length_per_unit: row.get("length_per_unit"),
                pieces_per_bundle: row.get("pieces_per_bundle"),
                piece_length_meters: row.get("piece_length_meters"),
                created_at: row.get("created_at"),
            });
        }

        Ok(result)
    }

    /// IN_STOCK cut pieces for a stock row, longest first.
    pub async fn cut_pieces_for_stock(&self, stock_id: Uuid) -> Result<Vec<HdpeCutPiece>> {
        let rows = sqlx::query_as::<_, HdpeCutPiece>(
            "SELECT * FROM hdpe_cut_pieces
             WHERE stock_id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL
             ORDER BY length_meters DESC",
        )
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// IN_STOCK spare groups for a stock row, largest first.
    pub async fn spare_groups_for_stock(
        &self,
        stock_id: Uuid,
    ) -> Result<Vec<SprinklerSparePiece>> {
        let rows = sqlx::query_as::<_, SprinklerSparePiece>(
            "SELECT * FROM sprinkler_spare_pieces
             WHERE stock_id = $1 AND status = 'IN_STOCK' AND deleted_at IS NULL
             ORDER BY piece_count DESC",
        )
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// A batch and every transaction that touched it, newest first. Includes
    /// soft-deleted batches: history outlives the stock.
    pub async fn get_batch_history(&self, batch_id: Uuid) -> Result<BatchHistory> {
        let batch = sqlx::query(
            "SELECT id, batch_code, batch_no, initial_quantity, current_quantity, deleted_at
             FROM batches WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))?;

        let transactions = sqlx::query_as::<_, InventoryTransaction>(
            "SELECT t.* FROM inventory_transactions t
             WHERE t.batch_id = $1
                OR t.from_stock_id IN (SELECT id FROM inventory_stock WHERE batch_id = $1)
                OR t.to_stock_id IN (SELECT id FROM inventory_stock WHERE batch_id = $1)
             ORDER BY t.created_at DESC, t.id DESC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(BatchHistory {
            batch_id: batch.get("id"),
            batch_code: batch.get("batch_code"),
            batch_no: batch.get("batch_no"),
            initial_quantity: batch.get("initial_quantity"),
            current_quantity: batch.get("current_quantity"),
            deleted_at: batch.get("deleted_at"),
            transactions,
        })
    }

    /// Chronological lifecycle of one piece: creation, dispatch, scrap,
    /// soft-delete, as recorded by its lineage and status fields.
    pub async fn get_piece_audit_trail(
        &self,
        piece_id: Uuid,
        kind: PieceKind,
    ) -> Result<Vec<PieceAuditEvent>> {
        let table = match kind {
            PieceKind::Hdpe => "hdpe_cut_pieces",
            PieceKind::Sprinkler => "sprinkler_spare_pieces",
        };
        let sql = format!(
            "SELECT status, dispatch_id, created_by_transaction_id,
                    deleted_by_transaction_id, created_at, updated_at, deleted_at
             FROM {table} WHERE id = $1"
        );

        let piece = sqlx::query(&sql)
            .bind(piece_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("piece {piece_id}")))?;

        let mut events = vec![PieceAuditEvent {
            event: "CREATED".to_string(),
            occurred_at: piece.get("created_at"),
            transaction_id: Some(piece.get("created_by_transaction_id")),
            dispatch_id: None,
        }];

        let status: String = piece.get("status");
        let dispatch_id: Option<Uuid> = piece.get("dispatch_id");
        if let Some(dispatch_id) = dispatch_id {
            events.push(PieceAuditEvent {
                event: "DISPATCHED".to_string(),
                occurred_at: piece.get("updated_at"),
                transaction_id: None,
                dispatch_id: Some(dispatch_id),
            });
        }
        if status == "SCRAPPED" {
            events.push(PieceAuditEvent {
                event: "SCRAPPED".to_string(),
                occurred_at: piece.get("updated_at"),
                transaction_id: None,
                dispatch_id: None,
            });
        }
        if let Some(deleted_at) = piece.get::<Option<DateTime<Utc>>, _>("deleted_at") {
            events.push(PieceAuditEvent {
                event: "DELETED".to_string(),
                occurred_at: deleted_at,
                transaction_id: piece.get("deleted_by_transaction_id"),
                dispatch_id: None,
            });
        }

        Ok(events)
    }

    /// The unified timeline: inventory transactions plus dispatch, return and
    /// scrap documents, ordered newest first. Ties within one commit
    /// timestamp break on id.
    pub async fn get_transaction_timeline(
        &self,
        filter: TimelineFilter,
    ) -> Result<Vec<TimelineEntry>> {
        let mut entries = Vec::new();

        // Dispatch-linked rows are summarized by their dispatch document;
        // RETURN rows by their return document.
        let txns = sqlx::query(
            "SELECT id, transaction_type, to_quantity, from_quantity, notes,
                    created_at, reverted_at
             FROM inventory_transactions
             WHERE dispatch_id IS NULL
               AND transaction_type NOT IN ('RETURN')
               AND ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at <= $2)",
        )
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;
        for row in txns {
            let transaction_type: String = row.get("transaction_type");
            let notes: Option<String> = row.get("notes");
            let quantity_change = row
                .get::<Option<i32>, _>("to_quantity")
                .or_else(|| row.get::<Option<i32>, _>("from_quantity"))
                .unwrap_or(0);
            entries.push(TimelineEntry {
                handle: TransactionHandle::Inv(row.get("id")),
                description: match notes {
                    Some(notes) => format!("{transaction_type}: {notes}"),
                    None => transaction_type,
                },
                quantity_change: i64::from(quantity_change),
                occurred_at: row.get("created_at"),
                reverted: row.get::<Option<DateTime<Utc>>, _>("reverted_at").is_some(),
            });
        }

        let dispatches = sqlx::query(
            "SELECT d.id, d.dispatch_number, d.dispatch_date, d.reverted_at,
                    COALESCE(SUM(di.quantity), 0) AS quantity
             FROM dispatches d
             LEFT JOIN dispatch_items di ON di.dispatch_id = d.id
             WHERE d.deleted_at IS NULL
               AND ($1::timestamptz IS NULL OR d.dispatch_date >= $1)
               AND ($2::timestamptz IS NULL OR d.dispatch_date <= $2)
             GROUP BY d.id",
        )
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;
        for row in dispatches {
            let number: String = row.get("dispatch_number");
            let reverted = row.get::<Option<DateTime<Utc>>, _>("reverted_at").is_some();
            entries.push(TimelineEntry {
                handle: TransactionHandle::Dispatch(row.get("id")),
                description: if reverted {
                    format!("Dispatch: {number} [REVERTED]")
                } else {
                    format!("Dispatch: {number}")
                },
                quantity_change: -row.get::<i64, _>("quantity"),
                occurred_at: row.get("dispatch_date"),
                reverted,
            });
        }

        let returns = sqlx::query(
            "SELECT r.id, r.return_number, r.created_at, r.reverted_at,
                    COALESCE((SELECT SUM(ri.quantity) FROM return_items ri
                              WHERE ri.return_id = r.id), 0) AS quantity
             FROM returns r
             WHERE r.deleted_at IS NULL
               AND ($1::timestamptz IS NULL OR r.created_at >= $1)
               AND ($2::timestamptz IS NULL OR r.created_at <= $2)",
        )
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;
        for row in returns {
            let number: String = row.get("return_number");
            let reverted = row.get::<Option<DateTime<Utc>>, _>("reverted_at").is_some();
            entries.push(TimelineEntry {
                handle: TransactionHandle::Return(row.get("id")),
                description: if reverted {
                    format!("Return: {number} [REVERTED]")
                } else {
                    format!("Return: {number}")
                },
                quantity_change: row.get::<i64, _>("quantity"),
                occurred_at: row.get("created_at"),
                reverted,
            });
        }

        let scraps = sqlx::query(
            "SELECT id, scrap_number, reason, status, total_quantity, created_at
             FROM scraps
             WHERE deleted_at IS NULL
               AND ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at <= $2)",
        )
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;
        for row in scraps {
            let number: String = row.get("scrap_number");
            let reason: String = row.get("reason");
            let cancelled = row.get::<String, _>("status") == "CANCELLED";
            entries.push(TimelineEntry {
                handle: TransactionHandle::Scrap(row.get("id")),
                description: format!("Scrap: {number} - {reason}"),
                quantity_change: -i64::from(row.get::<i32, _>("total_quantity")),
                occurred_at: row.get("created_at"),
                reverted: cancelled,
            });
        }

        entries.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.handle.id().cmp(&a.handle.id()))
        });
        Ok(entries)
    }

    /// Simple count of live, non-empty batches.
    pub async fn count_live_batches(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM batches WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
