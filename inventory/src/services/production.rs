// ============================================================================
// PIPESTOCK - PRODUCTION SERVICE
// ============================================================================
// Module: inventory/src/services/production.rs
// Description: ProduceBatch, the only operation that creates batches
// ============================================================================

use chrono::Datelike;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use pipestock_shared::{begin_serializable, Error, Result};

use crate::models::{
    ProduceBatchRequest, ProduceBatchResult, ProductCategory, RollConfiguration,
    StockSnapshotEntry, TransactionType,
};
use crate::services::{derivation, numbering, pieces, stocks, txlog, variants};

#[derive(Clone)]
pub struct ProductionService {
    pool: PgPool,
}

impl ProductionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a production batch with its initial stock per the requested
    /// shape. Writes exactly one PRODUCTION transaction carrying a snapshot
    /// of the created stock composition.
    pub async fn produce_batch(
        &self,
        request: ProduceBatchRequest,
        user_id: Uuid,
    ) -> Result<ProduceBatchResult> {
        request
            .validate()
            .map_err(|e| Error::InvalidProduction(e.to_string()))?;
        let total_quantity = validate_configuration(&request.configuration)?;

        let mut tx = begin_serializable(&self.pool).await?;

        let variant_id = variants::find_or_create_variant(
            &mut tx,
            request.product_type_id,
            request.brand_id,
            &request.parameters,
        )
        .await?;

        let category = variants::category_for_variant(&mut tx, variant_id).await?;
        check_configuration_category(&request.configuration, category)?;

        let batch_no = match &request.batch_no {
            Some(no) => {
                ensure_batch_no_free(&mut tx, no).await?;
                no.clone()
            }
            None => numbering::next_batch_no(&mut tx).await?,
        };

        let year = request.production_date.year();
        let batch_code = match &request.batch_code {
            Some(code) => {
                ensure_batch_code_free(&mut tx, code).await?;
                code.clone()
            }
            None => {
                let (type_name, brand_name) = variants::variant_names(&mut tx, variant_id).await?;
                let normalized = variants::normalize_parameters(&request.parameters);
                let code = numbering::generate_batch_code(
                    &type_name,
                    &normalized,
                    &brand_name,
                    year,
                    &batch_no,
                );
                ensure_batch_code_free(&mut tx, &code).await?;
                code
            }
        };

        let piece_length = match &request.configuration {
            RollConfiguration::Bundles {
                piece_length_meters,
                ..
            } => Some(*piece_length_meters),
            _ => None,
        };

        let batch_row = sqlx::query(
            "INSERT INTO batches (
                 batch_code, batch_no, product_variant_id, production_date,
                 initial_quantity, current_quantity, weight_per_meter,
                 total_weight, piece_length, notes, attachment_ref, created_by
             ) VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id",
        )
        .bind(&batch_code)
        .bind(&batch_no)
        .bind(variant_id)
        .bind(request.production_date)
        .bind(total_quantity)
        .bind(request.weight_per_meter)
        .bind(request.total_weight)
        .bind(piece_length)
        .bind(&request.notes)
        .bind(request.attachment_ref.as_deref())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match Error::from(e) {
            Error::AlreadyExists(msg) if msg.contains("batch_code") => {
                Error::DuplicateBatchCode(batch_code.clone())
            }
            Error::AlreadyExists(msg) => Error::InvalidProduction(msg),
            other => other,
        })?;
        let batch_id: Uuid = batch_row.get("id");

        let (snapshot, primary_stock_id, piece_plan) = create_initial_stock(
            &mut tx,
            batch_id,
            variant_id,
            &request.configuration,
            request.notes.as_deref(),
        )
        .await?;

        let txn_id = txlog::append(
            &mut tx,
            TransactionType::Production,
            txlog::NewTransaction {
                to_stock_id: Some(primary_stock_id),
                to_quantity: Some(total_quantity),
                to_pieces: Some(total_quantity),
                batch_id: Some(batch_id),
                stock_snapshot: Some(serde_json::to_value(&snapshot)?),
                notes: Some(production_note(&request.configuration, total_quantity)),
                created_by: Some(user_id),
                ..Default::default()
            },
        )
        .await?;

        for planned in &piece_plan {
            match planned {
                PlannedPieces::Cut { stock_id, lengths } => {
                    for length in lengths {
                        pieces::create_cut_piece(&mut tx, *stock_id, txn_id, *length, None)
                            .await?;
                    }
                    derivation::sync_stock_quantity(&mut tx, *stock_id).await?;
                }
                PlannedPieces::Spare {
                    stock_id,
                    groups,
                    piece_length_meters,
                } => {
                    for count in groups {
                        pieces::create_spare_group(
                            &mut tx,
                            *stock_id,
                            txn_id,
                            *count,
                            Some(*piece_length_meters),
                            None,
                        )
                        .await?;
                    }
                    derivation::sync_stock_quantity(&mut tx, *stock_id).await?;
                }
            }
        }

        let current = derivation::sync_batch_quantity(&mut tx, batch_id).await?;
        if current != total_quantity {
            return Err(Error::Internal(format!(
                "batch {batch_id} derived quantity {current} != produced {total_quantity}"
            )));
        }

        tx.commit().await?;

        info!(%batch_id, %batch_code, total_quantity, "produced batch");
        Ok(ProduceBatchResult {
            batch_id,
            batch_code,
        })
    }
}

enum PlannedPieces {
    Cut {
        stock_id: Uuid,
        lengths: Vec<Decimal>,
    },
    Spare {
        stock_id: Uuid,
        groups: Vec<i32>,
        piece_length_meters: Decimal,
    },
}

/// Returns the total produced quantity in the batch's native unit.
fn validate_configuration(configuration: &RollConfiguration) -> Result<i32> {
    match configuration {
        RollConfiguration::StandardRolls {
            number_of_rolls,
            length_per_roll,
        } => {
            if *number_of_rolls <= 0 {
                return Err(Error::InvalidProduction(
                    "number of rolls must be positive".into(),
                ));
            }
            if *length_per_roll <= Decimal::ZERO {
                return Err(Error::InvalidProduction(
                    "length per roll must be positive".into(),
                ));
            }
            Ok(*number_of_rolls)
        }
        RollConfiguration::CutRolls { cut_lengths } => {
            if cut_lengths.is_empty() {
                return Err(Error::InvalidProduction("no cut lengths given".into()));
            }
            if cut_lengths.iter().any(|l| *l <= Decimal::ZERO) {
                return Err(Error::InvalidProduction(
                    "cut lengths must be positive".into(),
                ));
            }
            Ok(cut_lengths.len() as i32)
        }
        RollConfiguration::Bundles {
            number_of_bundles,
            bundle_size,
            piece_length_meters,
            spare_groups,
        } => {
            if *number_of_bundles <= 0 || *bundle_size <= 0 {
                return Err(Error::InvalidProduction(
                    "bundle count and size must be positive".into(),
                ));
            }
            if *piece_length_meters <= Decimal::ZERO {
                return Err(Error::InvalidProduction(
                    "piece length must be positive".into(),
                ));
            }
            if spare_groups.iter().any(|c| *c <= 0) {
                return Err(Error::InvalidProduction(
                    "spare group counts must be positive".into(),
                ));
            }
            let spare_total: i32 = spare_groups.iter().sum();
            Ok(number_of_bundles * bundle_size + spare_total)
        }
    }
}

fn check_configuration_category(
    configuration: &RollConfiguration,
    category: ProductCategory,
) -> Result<()> {
    let ok = match configuration {
        RollConfiguration::StandardRolls { .. } | RollConfiguration::CutRolls { .. } => {
            category == ProductCategory::Hdpe
        }
        RollConfiguration::Bundles { .. } => category == ProductCategory::Sprinkler,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidProduction(format!(
            "roll configuration does not match product category {category:?}"
        )))
    }
}

async fn ensure_batch_code_free(conn: &mut PgConnection, batch_code: &str) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM batches WHERE batch_code = $1")
        .bind(batch_code)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_some() {
        return Err(Error::DuplicateBatchCode(batch_code.to_string()));
    }
    Ok(())
}

async fn ensure_batch_no_free(conn: &mut PgConnection, batch_no: &str) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM batches WHERE batch_no = $1")
        .bind(batch_no)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_some() {
        return Err(Error::InvalidProduction(format!(
            "batch number {batch_no} already exists"
        )));
    }
    Ok(())
}

async fn create_initial_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    variant_id: Uuid,
    configuration: &RollConfiguration,
    notes: Option<&str>,
) -> Result<(Vec<StockSnapshotEntry>, Uuid, Vec<PlannedPieces>)> {
    let mut snapshot = Vec::new();
    let mut piece_plan = Vec::new();

    let primary_stock_id = match configuration {
        RollConfiguration::StandardRolls {
            number_of_rolls,
            length_per_roll,
        } => {
            let stock_id = stocks::create_full_roll_stock(
                conn,
                batch_id,
                variant_id,
                *number_of_rolls,
                *length_per_roll,
                notes,
            )
            .await?;
            snapshot.push(StockSnapshotEntry {
                stock_id,
                stock_type: "FULL_ROLL".to_string(),
                quantity: *number_of_rolls,
                length_per_unit: Some(*length_per_roll),
                pieces_per_bundle: None,
                piece_length_meters: None,
                piece_lengths: None,
                spare_groups: None,
            });
            stock_id
        }
        RollConfiguration::CutRolls { cut_lengths } => {
            let stock_id = stocks::create_piece_backed_stock(
                conn, batch_id, variant_id, "CUT_ROLL", None, None, notes,
            )
            .await?;
            snapshot.push(StockSnapshotEntry {
                stock_id,
                stock_type: "CUT_ROLL".to_string(),
                quantity: cut_lengths.len() as i32,
                length_per_unit: None,
                pieces_per_bundle: None,
                piece_length_meters: None,
                piece_lengths: Some(cut_lengths.clone()),
                spare_groups: None,
            });
            piece_plan.push(PlannedPieces::Cut {
                stock_id,
                lengths: cut_lengths.clone(),
            });
            stock_id
        }
        RollConfiguration::Bundles {
            number_of_bundles,
            bundle_size,
            piece_length_meters,
            spare_groups,
        } => {
            let bundle_stock_id = stocks::create_bundle_stock(
                conn,
                batch_id,
                variant_id,
                *number_of_bundles,
                *bundle_size,
                Some(*piece_length_meters),
                notes,
            )
            .await?;
            snapshot.push(StockSnapshotEntry {
                stock_id: bundle_stock_id,
                stock_type: "BUNDLE".to_string(),
                quantity: *number_of_bundles,
                length_per_unit: None,
                pieces_per_bundle: Some(*bundle_size),
                piece_length_meters: Some(*piece_length_meters),
                piece_lengths: None,
                spare_groups: None,
            });

            if !spare_groups.is_empty() {
                let spare_stock_id = stocks::create_piece_backed_stock(
                    conn,
                    batch_id,
                    variant_id,
                    "SPARE",
                    Some(*piece_length_meters),
                    None,
                    notes,
                )
                .await?;
                snapshot.push(StockSnapshotEntry {
                    stock_id: spare_stock_id,
                    stock_type: "SPARE".to_string(),
                    quantity: spare_groups.len() as i32,
                    length_per_unit: None,
                    pieces_per_bundle: None,
                    piece_length_meters: Some(*piece_length_meters),
                    piece_lengths: None,
                    spare_groups: Some(spare_groups.clone()),
                });
                piece_plan.push(PlannedPieces::Spare {
                    stock_id: spare_stock_id,
                    groups: spare_groups.clone(),
                    piece_length_meters: *piece_length_meters,
                });
            }

            bundle_stock_id
        }
    };

    Ok((snapshot, primary_stock_id, piece_plan))
}

fn production_note(configuration: &RollConfiguration, total_quantity: i32) -> String {
    match configuration {
        RollConfiguration::StandardRolls {
            number_of_rolls,
            length_per_roll,
        } => format!("Produced {number_of_rolls} rolls of {length_per_roll}m"),
        RollConfiguration::CutRolls { cut_lengths } => {
            format!("Produced {} cut pieces", cut_lengths.len())
        }
        RollConfiguration::Bundles {
            number_of_bundles,
            bundle_size,
            spare_groups,
            ..
        } => {
            if spare_groups.is_empty() {
                format!(
                    "Produced {number_of_bundles} bundles of {bundle_size} ({total_quantity} pieces total)"
                )
            } else {
                format!(
                    "Produced {number_of_bundles} bundles of {bundle_size} and {} spare groups ({total_quantity} pieces total)",
                    spare_groups.len()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(rolls: i32, length: i64) -> RollConfiguration {
        RollConfiguration::StandardRolls {
            number_of_rolls: rolls,
            length_per_roll: Decimal::from(length),
        }
    }

    #[test]
    fn standard_roll_quantity_is_roll_count() {
        assert_eq!(validate_configuration(&standard(4, 500)).unwrap(), 4);
    }

    #[test]
    fn zero_rolls_rejected() {
        assert!(matches!(
            validate_configuration(&standard(0, 500)),
            Err(Error::InvalidProduction(_))
        ));
    }

    #[test]
    fn bundle_quantity_includes_spares() {
        let config = RollConfiguration::Bundles {
            number_of_bundles: 5,
            bundle_size: 50,
            piece_length_meters: Decimal::from(6),
            spare_groups: vec![3, 7],
        };
        assert_eq!(validate_configuration(&config).unwrap(), 260);
    }

    #[test]
    fn cut_configuration_is_hdpe_only() {
        let config = RollConfiguration::CutRolls {
            cut_lengths: vec![Decimal::from(150)],
        };
        assert!(check_configuration_category(&config, ProductCategory::Hdpe).is_ok());
        assert!(check_configuration_category(&config, ProductCategory::Sprinkler).is_err());
    }

    #[test]
    fn bundle_configuration_is_sprinkler_only() {
        let config = RollConfiguration::Bundles {
            number_of_bundles: 1,
            bundle_size: 10,
            piece_length_meters: Decimal::from(6),
            spare_groups: vec![],
        };
        assert!(check_configuration_category(&config, ProductCategory::Sprinkler).is_ok());
        assert!(check_configuration_category(&config, ProductCategory::Hdpe).is_err());
    }
}
