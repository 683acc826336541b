// ============================================================================
// PIPESTOCK - PRODUCT VARIANT RESOLUTION
// ============================================================================
// Module: inventory/src/services/variants.rs
// Description: Parameter normalization and find-or-create variant lookup
// ============================================================================

use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use pipestock_shared::{Error, Result};

use crate::models::ProductCategory;

/// Canonical parameter-value normalization: trim, then strip a trailing "mm"
/// or a trailing single "m" (unit suffixes). Historical rows may carry
/// un-normalized values, so the same function is applied to BOTH sides of
/// every variant-lookup comparison.
pub fn normalize_parameter(value: &str) -> String {
    let trimmed = value.trim();
    let lower = trimmed.to_lowercase();
    if lower.ends_with("mm") {
        trimmed[..trimmed.len() - 2].trim().to_string()
    } else if lower.ends_with('m') && trimmed.len() > 1 {
        trimmed[..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn normalize_parameters(parameters: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    parameters
        .iter()
        .map(|(k, v)| (k.trim().to_string(), normalize_parameter(v)))
        .collect()
}

/// Resolve a (product type, brand, parameters) combination to a variant id,
/// creating the variant when no stored row matches after normalization.
/// Under serializable isolation, concurrent creations of the same combination
/// serialize; the loser retries and finds the winner's row.
pub async fn find_or_create_variant(
    conn: &mut PgConnection,
    product_type_id: Uuid,
    brand_id: Uuid,
    parameters: &BTreeMap<String, String>,
) -> Result<Uuid> {
    let normalized = normalize_parameters(parameters);

    let rows = sqlx::query(
        "SELECT id, parameters FROM product_variants
         WHERE product_type_id = $1 AND brand_id = $2 AND deleted_at IS NULL",
    )
    .bind(product_type_id)
    .bind(brand_id)
    .fetch_all(&mut *conn)
    .await?;

    for row in &rows {
        let stored: Json<BTreeMap<String, String>> = row.get("parameters");
        if normalize_parameters(&stored.0) == normalized {
            return Ok(row.get("id"));
        }
    }

    let row = sqlx::query(
        "INSERT INTO product_variants (product_type_id, brand_id, parameters)
         VALUES ($1, $2, $3)
         RETURNING id",
    )
    .bind(product_type_id)
    .bind(brand_id)
    .bind(Json(&normalized))
    .fetch_one(&mut *conn)
    .await?;

    let id: Uuid = row.get("id");
    debug!(%id, %product_type_id, %brand_id, "created product variant");
    Ok(id)
}

/// Product type and brand display names for a variant.
pub async fn variant_names(
    conn: &mut PgConnection,
    product_variant_id: Uuid,
) -> Result<(String, String)> {
    let row = sqlx::query(
        "SELECT pt.name AS product_type, b.name AS brand
         FROM product_variants pv
         JOIN product_types pt ON pv.product_type_id = pt.id
         JOIN brands b ON pv.brand_id = b.id
         WHERE pv.id = $1",
    )
    .bind(product_variant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("product variant {product_variant_id}")))?;

    Ok((row.get("product_type"), row.get("brand")))
}

/// The product family a variant belongs to.
pub async fn category_for_variant(
    conn: &mut PgConnection,
    product_variant_id: Uuid,
) -> Result<ProductCategory> {
    let (type_name, _) = variant_names(conn, product_variant_id).await?;
    ProductCategory::from_type_name(&type_name).ok_or_else(|| {
        Error::Validation(format!("product type '{type_name}' has no known category"))
    })
}

/// The product family a product type belongs to, by id.
pub async fn category_for_product_type(
    conn: &mut PgConnection,
    product_type_id: Uuid,
) -> Result<ProductCategory> {
    let row = sqlx::query("SELECT name FROM product_types WHERE id = $1")
        .bind(product_type_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("product type {product_type_id}")))?;

    let name: String = row.get("name");
    ProductCategory::from_type_name(&name)
        .ok_or_else(|| Error::Validation(format!("product type '{name}' has no known category")))
}
