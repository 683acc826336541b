// ============================================================================
// PIPESTOCK - STOCK TRANSFORMATION SERVICE
// ============================================================================
// Module: inventory/src/services/transform.rs
// Description: CutRoll, SplitBundle and CombineSpares, the operations that
//              convert between aggregate and piece-tracked stock
// ============================================================================

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use pipestock_shared::{begin_serializable, Error, Result};

use crate::models::{
    CombineSparesRequest, CombineSparesResult, CutPieceDetail, CutRollRequest, CutRollResult,
    SplitBundleRequest, SplitBundleResult, StockType, TransactionType,
};
use crate::services::{derivation, pieces, stocks, txlog};

#[derive(Clone)]
pub struct TransformService {
    pool: PgPool,
    reservation_timeout_minutes: i64,
}

impl TransformService {
    pub fn new(pool: PgPool, reservation_timeout_minutes: i64) -> Self {
        Self {
            pool,
            reservation_timeout_minutes,
        }
    }

    /// Cut one HDPE roll (or re-cut one existing cut piece) into pieces.
    /// Creates a remainder piece for any leftover length.
    pub async fn cut_roll(&self, request: CutRollRequest, user_id: Uuid) -> Result<CutRollResult> {
        request
            .validate()
            .map_err(|e| Error::InvalidCut(e.to_string()))?;
        if request.cut_lengths.iter().any(|l| *l <= Decimal::ZERO) {
            return Err(Error::InvalidCut("cut lengths must be positive".into()));
        }
        let cut_total: Decimal = request.cut_lengths.iter().copied().sum();

        let mut tx = begin_serializable(&self.pool).await?;

        let source = stocks::lock_live_stock(&mut tx, request.stock_id).await?;

        // Source length and consumption differ by source kind: a FULL_ROLL
        // gives up one whole roll, a CUT_ROLL gives up one named piece.
        let available_length = match (source.stock_type, request.piece_id) {
            (StockType::FullRoll, None) => {
                if source.quantity < 1 {
                    return Err(Error::InvalidCut("no rolls available to cut".into()));
                }
                source.length_per_unit.ok_or_else(|| {
                    Error::InvalidCut("source roll has no length per unit".into())
                })?
            }
            (StockType::CutRoll, Some(piece_id)) => {
                let row = sqlx::query(
                    "SELECT length_meters FROM hdpe_cut_pieces
                     WHERE id = $1
                       AND stock_id = $2
                       AND status = 'IN_STOCK'
                       AND deleted_at IS NULL
                     FOR UPDATE",
                )
                .bind(piece_id)
                .bind(source.id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    Error::InvalidCut(format!("cut piece {piece_id} not found or not in stock"))
                })?;
                row.get("length_meters")
            }
            (StockType::FullRoll, Some(_)) => {
                return Err(Error::InvalidCut(
                    "piece_id is only valid when re-cutting a CUT_ROLL piece".into(),
                ))
            }
            _ => {
                return Err(Error::InvalidCut(
                    "source must be a FULL_ROLL stock or a CUT_ROLL piece".into(),
                ))
            }
        };

        if cut_total > available_length {
            return Err(Error::InvalidCut(format!(
                "cut lengths total {cut_total}m exceeds available {available_length}m"
            )));
        }

        match request.piece_id {
            None => stocks::decrement_stock_checked(&mut tx, &source, 1).await?,
            Some(piece_id) => {
                // The consumed piece is subsumed by its own cuts; DISPATCHED
                // doubles as the consumed-by-re-cut marker.
                let result = sqlx::query(
                    "UPDATE hdpe_cut_pieces
                     SET status = 'DISPATCHED', version = version + 1, updated_at = NOW()
                     WHERE id = $1 AND status = 'IN_STOCK'",
                )
                .bind(piece_id)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(Error::Concurrent(format!(
                        "cut piece {piece_id} was consumed concurrently"
                    )));
                }
            }
        }

        let cut_stock_id = stocks::find_or_create_cut_stock(
            &mut tx,
            source.batch_id,
            source.product_variant_id,
            source.id,
            request.notes.as_deref(),
        )
        .await?;

        let txn_id = txlog::append(
            &mut tx,
            TransactionType::CutRoll,
            txlog::NewTransaction {
                from_stock_id: Some(source.id),
                from_quantity: Some(1),
                from_length: Some(available_length),
                to_stock_id: Some(cut_stock_id),
                to_quantity: Some(request.cut_lengths.len() as i32),
                batch_id: Some(source.batch_id),
                notes: request.notes.clone(),
                created_by: Some(user_id),
                ..Default::default()
            },
        )
        .await?;

        let mut piece_ids = Vec::with_capacity(request.cut_lengths.len() + 1);
        let mut details = Vec::with_capacity(request.cut_lengths.len() + 1);
        for length in &request.cut_lengths {
            let piece_id =
                pieces::create_cut_piece(&mut tx, cut_stock_id, txn_id, *length, None).await?;
            piece_ids.push(piece_id);
            details.push(CutPieceDetail {
                length: *length,
                piece_id,
            });
        }

        let remainder = available_length - cut_total;
        if remainder > Decimal::ZERO {
            let note = format!("Remainder: {remainder}m");
            let piece_id =
                pieces::create_cut_piece(&mut tx, cut_stock_id, txn_id, remainder, Some(&note))
                    .await?;
            piece_ids.push(piece_id);
            details.push(CutPieceDetail {
                length: remainder,
                piece_id,
            });
        }

        txlog::set_cut_piece_details(&mut tx, txn_id, &details).await?;

        derivation::sync_stock_quantity(&mut tx, cut_stock_id).await?;
        if request.piece_id.is_some() {
            derivation::sync_stock_quantity(&mut tx, source.id).await?;
        }
        derivation::sync_batch_quantity(&mut tx, source.batch_id).await?;

        tx.commit().await?;

        info!(
            source_stock = %source.id,
            cut_stock = %cut_stock_id,
            pieces = piece_ids.len(),
            "cut roll"
        );
        Ok(CutRollResult {
            cut_stock_id,
            piece_ids,
        })
    }

    /// Split one bundle into spare piece groups. Any pieces not named in the
    /// split become a remainder group.
    pub async fn split_bundle(
        &self,
        request: SplitBundleRequest,
        user_id: Uuid,
    ) -> Result<SplitBundleResult> {
        request
            .validate()
            .map_err(|e| Error::InvalidSplit(e.to_string()))?;
        if request.pieces_to_split.iter().any(|c| *c <= 0) {
            return Err(Error::InvalidSplit(
                "split piece counts must be positive".into(),
            ));
        }
        let split_total: i32 = request.pieces_to_split.iter().sum();

        let mut tx = begin_serializable(&self.pool).await?;

        let source = stocks::lock_live_stock(&mut tx, request.stock_id).await?;
        if source.stock_type != StockType::Bundle {
            return Err(Error::InvalidSplit(format!(
                "stock {} is not a BUNDLE",
                source.id
            )));
        }
        if source.quantity < 1 {
            return Err(Error::InvalidSplit("no bundles available to split".into()));
        }
        let pieces_per_bundle = source
            .pieces_per_bundle
            .ok_or_else(|| Error::InvalidSplit("bundle stock has no pieces_per_bundle".into()))?;
        if split_total > pieces_per_bundle {
            return Err(Error::InvalidSplit(format!(
                "cannot split {split_total} pieces from a bundle of {pieces_per_bundle}"
            )));
        }

        stocks::decrement_stock_checked(&mut tx, &source, 1).await?;

        let spare_stock_id = stocks::find_or_create_spare_stock(
            &mut tx,
            source.batch_id,
            source.product_variant_id,
            source.piece_length_meters,
            Some(source.id),
            request.notes.as_deref(),
        )
        .await?;

        let txn_id = txlog::append(
            &mut tx,
            TransactionType::SplitBundle,
            txlog::NewTransaction {
                from_stock_id: Some(source.id),
                from_quantity: Some(1),
                from_pieces: Some(pieces_per_bundle),
                to_stock_id: Some(spare_stock_id),
                to_quantity: Some(request.pieces_to_split.len() as i32),
                to_pieces: Some(split_total),
                batch_id: Some(source.batch_id),
                notes: request.notes.clone(),
                created_by: Some(user_id),
                ..Default::default()
            },
        )
        .await?;

        let mut piece_ids = Vec::with_capacity(request.pieces_to_split.len() + 1);
        for count in &request.pieces_to_split {
            let piece_id = pieces::create_spare_group(
                &mut tx,
                spare_stock_id,
                txn_id,
                *count,
                source.piece_length_meters,
                None,
            )
            .await?;
            piece_ids.push(piece_id);
        }

        let remainder = pieces_per_bundle - split_total;
        if remainder > 0 {
            let note = format!("Remainder: {remainder} pieces");
            let piece_id = pieces::create_spare_group(
                &mut tx,
                spare_stock_id,
                txn_id,
                remainder,
                source.piece_length_meters,
                Some(&note),
            )
            .await?;
            piece_ids.push(piece_id);
        }

        derivation::sync_stock_quantity(&mut tx, spare_stock_id).await?;
        derivation::sync_batch_quantity(&mut tx, source.batch_id).await?;

        tx.commit().await?;

        info!(
            source_stock = %source.id,
            spare_stock = %spare_stock_id,
            groups = piece_ids.len(),
            "split bundle"
        );
        Ok(SplitBundleResult {
            spare_stock_id,
            piece_ids,
        })
    }

    /// Combine spare piece groups back into bundles. Two phases inside one
    /// serializable transaction: reserve the named groups (NOWAIT locks),
    /// then consume them and build up the bundle stock. The consumed groups
    /// keep their original `created_by_transaction_id` forever.
    pub async fn combine_spares(
        &self,
        request: CombineSparesRequest,
        user_id: Uuid,
    ) -> Result<CombineSparesResult> {
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        let total_needed = i64::from(request.bundle_size) * i64::from(request.number_of_bundles);

        let mut tx = begin_serializable(&self.pool).await?;

        // The operation id doubles as the reservation token and becomes the
        // COMBINE_SPARES transaction id once the log row is written.
        let op_id = Uuid::new_v4();

        // Phase I: reservation.
        let reserved = pieces::reserve_spare_groups(
            &mut tx,
            &request.spare_piece_ids,
            op_id,
            self.reservation_timeout_minutes,
        )
        .await?;

        let spare_stock_id = reserved[0].stock_id;
        if reserved.iter().any(|g| g.stock_id != spare_stock_id) {
            return Err(Error::Validation(
                "spare pieces must all belong to one stock".into(),
            ));
        }

        let total_pieces: i64 = reserved.iter().map(|g| i64::from(g.piece_count)).sum();
        if total_pieces < total_needed {
            return Err(Error::InsufficientPieces {
                have: total_pieces,
                need: total_needed,
            });
        }

        // Phase II: combine.
        let spare_stock = stocks::lock_stock_any(&mut tx, spare_stock_id).await?;

        let bundle_stock_id = match stocks::find_bundle_stock_for_update(
            &mut tx,
            spare_stock.batch_id,
            spare_stock.product_variant_id,
            request.bundle_size,
            spare_stock.piece_length_meters,
        )
        .await?
        {
            Some(bundle_stock) => {
                stocks::increment_stock_checked(&mut tx, &bundle_stock, request.number_of_bundles)
                    .await?;
                bundle_stock.id
            }
            None => {
                stocks::create_bundle_stock(
                    &mut tx,
                    spare_stock.batch_id,
                    spare_stock.product_variant_id,
                    request.number_of_bundles,
                    request.bundle_size,
                    spare_stock.piece_length_meters,
                    None,
                )
                .await?
            }
        };

        let txn_id = txlog::append_with_id(
            &mut tx,
            op_id,
            TransactionType::CombineSpares,
            txlog::NewTransaction {
                from_stock_id: Some(spare_stock_id),
                from_quantity: Some(reserved.len() as i32),
                from_pieces: Some(total_pieces as i32),
                to_stock_id: Some(bundle_stock_id),
                to_quantity: Some(request.number_of_bundles),
                to_pieces: Some(total_needed as i32),
                batch_id: Some(spare_stock.batch_id),
                created_by: Some(user_id),
                ..Default::default()
            },
        )
        .await?;

        pieces::consume_spare_groups(&mut tx, &request.spare_piece_ids, txn_id).await?;

        let remainder = total_pieces - total_needed;
        let remainder_piece_id = if remainder > 0 {
            let note = format!("Remainder from combining: {remainder} pieces");
            Some(
                pieces::create_spare_group(
                    &mut tx,
                    spare_stock_id,
                    txn_id,
                    remainder as i32,
                    spare_stock.piece_length_meters,
                    Some(&note),
                )
                .await?,
            )
        } else {
            None
        };

        let spare_quantity = derivation::sync_stock_quantity(&mut tx, spare_stock_id).await?;
        if spare_quantity == 0 {
            sqlx::query(
                "UPDATE inventory_stock
                 SET deleted_by_transaction_id = $2
                 WHERE id = $1 AND deleted_at IS NOT NULL",
            )
            .bind(spare_stock_id)
            .bind(txn_id)
            .execute(&mut *tx)
            .await?;
        }

        derivation::sync_batch_quantity(&mut tx, spare_stock.batch_id).await?;

        // Any reservation rows left over (none in the normal path) are
        // released before commit.
        pieces::release_spare_reservations(&mut tx, &request.spare_piece_ids, txn_id).await?;

        tx.commit().await?;

        info!(
            spare_stock = %spare_stock_id,
            bundle_stock = %bundle_stock_id,
            bundles = request.number_of_bundles,
            remainder,
            "combined spares"
        );
        Ok(CombineSparesResult {
            bundle_stock_id,
            remainder_piece_id,
        })
    }
}
