// Shared fixtures for the integration tests: catalog rows, users, customers,
// and shorthands for producing the two batch families.

#![allow(dead_code)]

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use pipestock_inventory::models::{
    Batch, HdpeCutPiece, InventoryStock, InventoryTransaction, ProduceBatchRequest,
    ProduceBatchResult, RollConfiguration, SprinklerSparePiece, StockType,
};
use pipestock_inventory::services::derivation;
use pipestock_inventory::ProductionService;

pub struct Catalog {
    pub hdpe_type_id: Uuid,
    pub sprinkler_type_id: Uuid,
    pub brand_id: Uuid,
    pub customer_id: Uuid,
    pub user_id: Uuid,
}

pub async fn seed_catalog(pool: &PgPool) -> Catalog {
    let hdpe_type_id = insert_named(pool, "product_types", "HDPE Pipe").await;
    let sprinkler_type_id = insert_named(pool, "product_types", "Sprinkler Pipe").await;
    let brand_id = insert_named(pool, "brands", "Aqualine").await;

    let user_id: Uuid = sqlx::query(
        "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id",
    )
    .bind("Test Operator")
    .bind(format!("operator-{}@example.test", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .unwrap()
    .get("id");

    let customer_id: Uuid = sqlx::query(
        "INSERT INTO customers (name, phone) VALUES ($1, $2) RETURNING id",
    )
    .bind("Test Customer")
    .bind(Uuid::new_v4().to_string())
    .fetch_one(pool)
    .await
    .unwrap()
    .get("id");

    Catalog {
        hdpe_type_id,
        sprinkler_type_id,
        brand_id,
        customer_id,
        user_id,
    }
}

async fn insert_named(pool: &PgPool, table: &str, name: &str) -> Uuid {
    let sql = format!("INSERT INTO {table} (name) VALUES ($1) RETURNING id");
    sqlx::query(&sql)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id")
}

pub fn hdpe_params() -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("size".to_string(), "110".to_string());
    params
}

pub fn sprinkler_params() -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("size".to_string(), "63".to_string());
    params
}

/// Produce an HDPE batch of `rolls` standard rolls of `length` meters.
pub async fn produce_hdpe_rolls(
    pool: &PgPool,
    catalog: &Catalog,
    rolls: i32,
    length: i64,
) -> ProduceBatchResult {
    let service = ProductionService::new(pool.clone());
    service
        .produce_batch(
            ProduceBatchRequest {
                product_type_id: catalog.hdpe_type_id,
                brand_id: catalog.brand_id,
                parameters: hdpe_params(),
                production_date: chrono::Utc::now().date_naive(),
                batch_no: None,
                batch_code: None,
                configuration: RollConfiguration::StandardRolls {
                    number_of_rolls: rolls,
                    length_per_roll: Decimal::from(length),
                },
                weight_per_meter: None,
                total_weight: None,
                attachment_ref: None,
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap()
}

/// Produce a sprinkler batch of bundles plus optional spare groups.
pub async fn produce_sprinkler(
    pool: &PgPool,
    catalog: &Catalog,
    bundles: i32,
    bundle_size: i32,
    piece_length: i64,
    spare_groups: Vec<i32>,
) -> ProduceBatchResult {
    let service = ProductionService::new(pool.clone());
    service
        .produce_batch(
            ProduceBatchRequest {
                product_type_id: catalog.sprinkler_type_id,
                brand_id: catalog.brand_id,
                parameters: sprinkler_params(),
                production_date: chrono::Utc::now().date_naive(),
                batch_no: None,
                batch_code: None,
                configuration: RollConfiguration::Bundles {
                    number_of_bundles: bundles,
                    bundle_size,
                    piece_length_meters: Decimal::from(piece_length),
                    spare_groups,
                },
                weight_per_meter: None,
                total_weight: None,
                attachment_ref: None,
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap()
}

pub async fn fetch_batch(pool: &PgPool, batch_id: Uuid) -> Batch {
    sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE id = $1")
        .bind(batch_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// The batch's single stock row of the given kind, soft-deleted included.
pub async fn stock_for_batch(pool: &PgPool, batch_id: Uuid, kind: StockType) -> InventoryStock {
    sqlx::query_as::<_, InventoryStock>(
        "SELECT * FROM inventory_stock WHERE batch_id = $1 AND stock_type = $2
         ORDER BY created_at
         LIMIT 1",
    )
    .bind(batch_id)
    .bind(kind.as_str())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn fetch_stock(pool: &PgPool, stock_id: Uuid) -> InventoryStock {
    sqlx::query_as::<_, InventoryStock>("SELECT * FROM inventory_stock WHERE id = $1")
        .bind(stock_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn cut_pieces(pool: &PgPool, stock_id: Uuid) -> Vec<HdpeCutPiece> {
    sqlx::query_as::<_, HdpeCutPiece>(
        "SELECT * FROM hdpe_cut_pieces WHERE stock_id = $1 ORDER BY created_at, id",
    )
    .bind(stock_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn spare_groups(pool: &PgPool, stock_id: Uuid) -> Vec<SprinklerSparePiece> {
    sqlx::query_as::<_, SprinklerSparePiece>(
        "SELECT * FROM sprinkler_spare_pieces WHERE stock_id = $1 ORDER BY created_at, id",
    )
    .bind(stock_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn transactions_for_batch(pool: &PgPool, batch_id: Uuid) -> Vec<InventoryTransaction> {
    sqlx::query_as::<_, InventoryTransaction>(
        "SELECT * FROM inventory_transactions WHERE batch_id = $1 ORDER BY created_at, id",
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Assert Rule A holds for every piece-backed stock row.
pub async fn assert_quantities_consistent(pool: &PgPool) {
    let mismatches = derivation::validate_stock_quantities(pool).await.unwrap();
    assert!(
        mismatches.is_empty(),
        "stock quantities diverged from piece counts: {mismatches:?}"
    );
}
