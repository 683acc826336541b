// Production shapes A/B/C: batch creation, initial stock, the PRODUCTION
// snapshot, and duplicate/category rejection.

mod common;

use rust_decimal::Decimal;
use sqlx::PgPool;

use common::*;
use pipestock_inventory::models::{
    PieceStatus, ProduceBatchRequest, RollConfiguration, StockStatus, StockSnapshotEntry,
    StockType, TransactionType,
};
use pipestock_inventory::ProductionService;
use pipestock_shared::Error;

#[sqlx::test(migrations = "../migrations")]
async fn standard_rolls_create_full_roll_stock(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let result = produce_hdpe_rolls(&pool, &catalog, 2, 500).await;

    let batch = fetch_batch(&pool, result.batch_id).await;
    assert_eq!(batch.initial_quantity, 2);
    assert_eq!(batch.current_quantity, 2);
    assert_eq!(batch.batch_code, result.batch_code);

    let stock = stock_for_batch(&pool, batch.id, StockType::FullRoll).await;
    assert_eq!(stock.quantity, 2);
    assert_eq!(stock.status, StockStatus::InStock);
    assert_eq!(stock.length_per_unit, Some(Decimal::from(500)));

    let txns = transactions_for_batch(&pool, batch.id).await;
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].transaction_type, TransactionType::Production);

    let snapshot: Vec<StockSnapshotEntry> =
        serde_json::from_value(txns[0].stock_snapshot.clone().unwrap()).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].stock_type, "FULL_ROLL");
    assert_eq!(snapshot[0].quantity, 2);
}

#[sqlx::test(migrations = "../migrations")]
async fn batch_code_follows_variant_formula(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let result = produce_hdpe_rolls(&pool, &catalog, 1, 300).await;

    let year = chrono::Utc::now().date_naive().format("%Y");
    assert_eq!(result.batch_code, format!("HDPEPipe-size110-Aqualine-{year}-001"));
}

#[sqlx::test(migrations = "../migrations")]
async fn cut_roll_production_derives_quantity_from_pieces(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ProductionService::new(pool.clone());

    let result = service
        .produce_batch(
            ProduceBatchRequest {
                product_type_id: catalog.hdpe_type_id,
                brand_id: catalog.brand_id,
                parameters: hdpe_params(),
                production_date: chrono::Utc::now().date_naive(),
                batch_no: None,
                batch_code: None,
                configuration: RollConfiguration::CutRolls {
                    cut_lengths: vec![
                        Decimal::from(150),
                        Decimal::from(120),
                        Decimal::from(80),
                    ],
                },
                weight_per_meter: None,
                total_weight: None,
                attachment_ref: None,
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let stock = stock_for_batch(&pool, result.batch_id, StockType::CutRoll).await;
    assert_eq!(stock.quantity, 3);

    let txns = transactions_for_batch(&pool, result.batch_id).await;
    assert_eq!(txns.len(), 1);
    let production_txn = &txns[0];

    let pieces = cut_pieces(&pool, stock.id).await;
    assert_eq!(pieces.len(), 3);
    for piece in &pieces {
        assert_eq!(piece.status, PieceStatus::InStock);
        assert_eq!(piece.created_by_transaction_id, production_txn.id);
        assert_eq!(piece.original_stock_id, stock.id);
    }

    let batch = fetch_batch(&pool, result.batch_id).await;
    assert_eq!(batch.current_quantity, 3);
    assert_quantities_consistent(&pool).await;
}

#[sqlx::test(migrations = "../migrations")]
async fn sprinkler_production_creates_bundles_and_spares(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let result = produce_sprinkler(&pool, &catalog, 5, 50, 6, vec![3, 7]).await;

    let batch = fetch_batch(&pool, result.batch_id).await;
    assert_eq!(batch.initial_quantity, 260);
    assert_eq!(batch.current_quantity, 260);

    let bundle_stock = stock_for_batch(&pool, batch.id, StockType::Bundle).await;
    assert_eq!(bundle_stock.quantity, 5);
    assert_eq!(bundle_stock.pieces_per_bundle, Some(50));

    let spare_stock = stock_for_batch(&pool, batch.id, StockType::Spare).await;
    assert_eq!(spare_stock.quantity, 2);

    let groups = spare_groups(&pool, spare_stock.id).await;
    let counts: Vec<i32> = groups.iter().map(|g| g.piece_count).collect();
    assert_eq!(counts, vec![3, 7]);
    assert_quantities_consistent(&pool).await;
}

#[sqlx::test(migrations = "../migrations")]
async fn duplicate_batch_code_is_rejected(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ProductionService::new(pool.clone());

    let request = ProduceBatchRequest {
        product_type_id: catalog.hdpe_type_id,
        brand_id: catalog.brand_id,
        parameters: hdpe_params(),
        production_date: chrono::Utc::now().date_naive(),
        batch_no: Some("900".to_string()),
        batch_code: Some("HAND-CODE-900".to_string()),
        configuration: RollConfiguration::StandardRolls {
            number_of_rolls: 1,
            length_per_roll: Decimal::from(500),
        },
        weight_per_meter: None,
        total_weight: None,
        attachment_ref: None,
        notes: None,
    };

    service.produce_batch(request.clone(), catalog.user_id).await.unwrap();

    let mut duplicate = request;
    duplicate.batch_no = Some("901".to_string());
    let err = service
        .produce_batch(duplicate, catalog.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateBatchCode(_)), "got {err:?}");
}

#[sqlx::test(migrations = "../migrations")]
async fn bundle_configuration_rejected_for_hdpe(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ProductionService::new(pool.clone());

    let err = service
        .produce_batch(
            ProduceBatchRequest {
                product_type_id: catalog.hdpe_type_id,
                brand_id: catalog.brand_id,
                parameters: hdpe_params(),
                production_date: chrono::Utc::now().date_naive(),
                batch_no: None,
                batch_code: None,
                configuration: RollConfiguration::Bundles {
                    number_of_bundles: 2,
                    bundle_size: 10,
                    piece_length_meters: Decimal::from(6),
                    spare_groups: vec![],
                },
                weight_per_meter: None,
                total_weight: None,
                attachment_ref: None,
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidProduction(_)), "got {err:?}");
}

#[sqlx::test(migrations = "../migrations")]
async fn zero_quantity_production_is_rejected(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ProductionService::new(pool.clone());

    let err = service
        .produce_batch(
            ProduceBatchRequest {
                product_type_id: catalog.hdpe_type_id,
                brand_id: catalog.brand_id,
                parameters: hdpe_params(),
                production_date: chrono::Utc::now().date_naive(),
                batch_no: None,
                batch_code: None,
                configuration: RollConfiguration::StandardRolls {
                    number_of_rolls: 0,
                    length_per_roll: Decimal::from(500),
                },
                weight_per_meter: None,
                total_weight: None,
                attachment_ref: None,
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidProduction(_)), "got {err:?}");
}
