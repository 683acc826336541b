// Returns: fresh batches per variant, return-before-production, parameter
// normalization against historical variants, and breakdown notes.

mod common;

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

use common::*;
use pipestock_inventory::models::{
    PieceStatus, ReturnItemRequest, ReturnItemType, ReturnRequest, ReturnedBundle, ReturnedRoll,
    StockType, TransactionType,
};
use pipestock_inventory::ReturnService;
use pipestock_shared::Error;

fn base_request(customer_id: uuid::Uuid, items: Vec<ReturnItemRequest>) -> ReturnRequest {
    ReturnRequest {
        customer_id,
        return_date: chrono::Utc::now().date_naive(),
        notes: None,
        items,
    }
}

fn full_roll_item(
    catalog: &Catalog,
    params: BTreeMap<String, String>,
    lengths: &[i64],
) -> ReturnItemRequest {
    ReturnItemRequest {
        product_type_id: catalog.hdpe_type_id,
        brand_id: catalog.brand_id,
        parameters: params,
        item_type: ReturnItemType::FullRoll,
        rolls: lengths
            .iter()
            .map(|l| ReturnedRoll {
                length_meters: Decimal::from(*l),
            })
            .collect(),
        bundles: vec![],
        piece_count: None,
        piece_length_meters: None,
        notes: None,
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn return_before_production_creates_batch_and_variant(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ReturnService::new(pool.clone());

    let result = service
        .create_return(
            base_request(
                catalog.customer_id,
                vec![full_roll_item(&catalog, hdpe_params(), &[500, 500, 500, 500, 500])],
            ),
            catalog.user_id,
        )
        .await
        .unwrap();

    let year = chrono::Utc::now().format("%Y");
    assert_eq!(result.return_number, format!("RET-{year}-001"));
    assert_eq!(result.transaction_ids.len(), 1);

    // The return created the variant on demand.
    let variants: i64 = sqlx::query("SELECT COUNT(*) AS n FROM product_variants")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
    assert_eq!(variants, 1);

    // And a fresh batch coded off the return number.
    let batch_row = sqlx::query("SELECT * FROM batches WHERE batch_code = $1")
        .bind(format!("{}-01", result.return_number))
        .fetch_one(&pool)
        .await
        .unwrap();
    let batch_id: uuid::Uuid = batch_row.get("id");
    let batch = fetch_batch(&pool, batch_id).await;
    assert_eq!(batch.initial_quantity, 5);
    assert_eq!(batch.current_quantity, 5);

    let stock = stock_for_batch(&pool, batch_id, StockType::FullRoll).await;
    assert_eq!(stock.quantity, 5);
    assert_eq!(stock.length_per_unit, Some(Decimal::from(500)));
}

#[sqlx::test(migrations = "../migrations")]
async fn unit_suffixed_parameters_match_existing_variant(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;

    // Production stored normalized parameters ("110").
    produce_hdpe_rolls(&pool, &catalog, 1, 500).await;

    // The return arrives with the historical unit style ("110mm").
    let mut suffixed = BTreeMap::new();
    suffixed.insert("size".to_string(), "110mm".to_string());

    let service = ReturnService::new(pool.clone());
    service
        .create_return(
            base_request(
                catalog.customer_id,
                vec![full_roll_item(&catalog, suffixed, &[300])],
            ),
            catalog.user_id,
        )
        .await
        .unwrap();

    // Both sides normalized to the same value: no second variant.
    let variants: i64 = sqlx::query("SELECT COUNT(*) AS n FROM product_variants")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
    assert_eq!(variants, 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn returned_cut_rolls_become_tracked_pieces(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ReturnService::new(pool.clone());

    let mut item = full_roll_item(&catalog, hdpe_params(), &[150, 150, 80]);
    item.item_type = ReturnItemType::CutRoll;

    let result = service
        .create_return(base_request(catalog.customer_id, vec![item]), catalog.user_id)
        .await
        .unwrap();

    let batch_row = sqlx::query("SELECT id FROM batches WHERE batch_code = $1")
        .bind(format!("{}-01", result.return_number))
        .fetch_one(&pool)
        .await
        .unwrap();
    let batch_id: uuid::Uuid = batch_row.get("id");

    let batch = fetch_batch(&pool, batch_id).await;
    assert_eq!(batch.current_quantity, 3);

    // One stock per distinct length (150 and 80), derived quantities.
    let stocks: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM inventory_stock WHERE batch_id = $1 AND stock_type = 'CUT_ROLL'",
    )
    .bind(batch_id)
    .fetch_one(&pool)
    .await
    .unwrap()
    .get("n");
    assert_eq!(stocks, 2);
    assert_quantities_consistent(&pool).await;
}

#[sqlx::test(migrations = "../migrations")]
async fn sprinkler_spare_return_creates_singleton_groups(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ReturnService::new(pool.clone());

    let item = ReturnItemRequest {
        product_type_id: catalog.sprinkler_type_id,
        brand_id: catalog.brand_id,
        parameters: sprinkler_params(),
        item_type: ReturnItemType::SparePieces,
        rolls: vec![],
        bundles: vec![],
        piece_count: Some(4),
        piece_length_meters: Some(Decimal::from(6)),
        notes: None,
    };

    let result = service
        .create_return(base_request(catalog.customer_id, vec![item]), catalog.user_id)
        .await
        .unwrap();

    let batch_row = sqlx::query("SELECT id FROM batches WHERE batch_code = $1")
        .bind(format!("{}-01", result.return_number))
        .fetch_one(&pool)
        .await
        .unwrap();
    let batch_id: uuid::Uuid = batch_row.get("id");

    let spare_stock = stock_for_batch(&pool, batch_id, StockType::Spare).await;
    assert_eq!(spare_stock.quantity, 4);

    let groups = spare_groups(&pool, spare_stock.id).await;
    assert_eq!(groups.len(), 4);
    assert!(groups
        .iter()
        .all(|g| g.piece_count == 1 && g.status == PieceStatus::InStock));

    let batch = fetch_batch(&pool, batch_id).await;
    assert_eq!(batch.current_quantity, 4);
}

#[sqlx::test(migrations = "../migrations")]
async fn return_transaction_notes_encode_breakdown(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ReturnService::new(pool.clone());

    let rolls = full_roll_item(&catalog, hdpe_params(), &[500, 500]);
    let mut cuts = full_roll_item(&catalog, hdpe_params(), &[100]);
    cuts.item_type = ReturnItemType::CutRoll;

    let result = service
        .create_return(base_request(catalog.customer_id, vec![rolls, cuts]), catalog.user_id)
        .await
        .unwrap();

    assert_eq!(result.transaction_ids.len(), 1);
    let txn = sqlx::query("SELECT notes FROM inventory_transactions WHERE id = $1")
        .bind(result.transaction_ids[0])
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(txn.get::<Option<String>, _>("notes").unwrap(), "2R + 1C");
}

#[sqlx::test(migrations = "../migrations")]
async fn bundle_return_requires_bundles(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ReturnService::new(pool.clone());

    let item = ReturnItemRequest {
        product_type_id: catalog.sprinkler_type_id,
        brand_id: catalog.brand_id,
        parameters: sprinkler_params(),
        item_type: ReturnItemType::Bundle,
        rolls: vec![],
        bundles: vec![],
        piece_count: None,
        piece_length_meters: None,
        notes: None,
    };

    let err = service
        .create_return(base_request(catalog.customer_id, vec![item]), catalog.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidReturn(_)), "got {err:?}");
}

#[sqlx::test(migrations = "../migrations")]
async fn mixed_variant_return_creates_one_batch_per_variant(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let service = ReturnService::new(pool.clone());

    let hdpe = full_roll_item(&catalog, hdpe_params(), &[500]);
    let sprinkler = ReturnItemRequest {
        product_type_id: catalog.sprinkler_type_id,
        brand_id: catalog.brand_id,
        parameters: sprinkler_params(),
        item_type: ReturnItemType::Bundle,
        rolls: vec![],
        bundles: vec![ReturnedBundle {
            bundle_size: 20,
            piece_length_meters: Some(Decimal::from(6)),
        }],
        piece_count: None,
        piece_length_meters: None,
        notes: None,
    };

    let result = service
        .create_return(
            base_request(catalog.customer_id, vec![hdpe, sprinkler]),
            catalog.user_id,
        )
        .await
        .unwrap();

    assert_eq!(result.transaction_ids.len(), 2);
    for suffix in ["01", "02"] {
        let exists = sqlx::query("SELECT 1 FROM batches WHERE batch_code = $1")
            .bind(format!("{}-{suffix}", result.return_number))
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(exists.is_some(), "missing batch {suffix}");
    }
}
