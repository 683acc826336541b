// ============================================================================
// PIPESTOCK - CATALOG & BATCH MODELS
// ============================================================================
// Module: inventory/src/models/batch.rs
// Description: Product catalog references and production batch entities
// ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The two product families the engine tracks. A batch belongs to exactly one
/// family; its quantities are counted in that family's native unit (rolls for
/// HDPE, pieces for sprinkler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCategory {
    Hdpe,
    Sprinkler,
}

impl ProductCategory {
    /// Categories are carried by product-type names ("HDPE Pipe",
    /// "Sprinkler Pipe"); match case-insensitively.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("hdpe") {
            Some(ProductCategory::Hdpe)
        } else if lower.contains("sprinkler") {
            Some(ProductCategory::Sprinkler)
        } else {
            None
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ProductCategory::Hdpe => "rolls",
            ProductCategory::Sprinkler => "pieces",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductType {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A (product type, brand, parameters) combination. Parameters are stored
/// normalized (trimmed, unit suffixes stripped); comparison against historical
/// rows re-normalizes both sides.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_type_id: Uuid,
    pub brand_id: Uuid,
    pub parameters: Json<BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A production lot. `initial_quantity` is set at creation and never mutates;
/// `current_quantity` is derived from the batch's live stock on every touch.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Batch {
    pub id: Uuid,
    pub batch_code: String,
    pub batch_no: String,
    pub product_variant_id: Uuid,
    pub production_date: NaiveDate,
    pub initial_quantity: i32,
    pub current_quantity: i32,
    pub weight_per_meter: Option<Decimal>,
    pub total_weight: Option<Decimal>,
    pub piece_length: Option<Decimal>,
    pub notes: Option<String>,
    pub attachment_ref: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}
