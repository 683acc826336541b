// ============================================================================
// PIPESTOCK - DOCUMENT NUMBERING
// ============================================================================
// Module: inventory/src/services/numbering.rs
// Description: Per-calendar-year dispatch/return/scrap sequences and the
//              batch code formula
// ============================================================================
//
// Sequences race under serializable isolation; concurrent generators conflict
// at commit and one side retries. No advisory locks.

use sqlx::{PgConnection, Row};
use std::collections::BTreeMap;

use pipestock_shared::Result;

/// `DISP-YYYY-NNNN`, zero-padded to 4, reset each calendar year.
pub async fn next_dispatch_number(conn: &mut PgConnection, year: i32) -> Result<String> {
    let next = next_in_sequence(conn, "dispatches", "dispatch_number", "DISP", year).await?;
    Ok(format!("DISP-{year}-{next:04}"))
}

/// `RET-YYYY-NNN`, zero-padded to 3, reset each calendar year.
pub async fn next_return_number(conn: &mut PgConnection, year: i32) -> Result<String> {
    let next = next_in_sequence(conn, "returns", "return_number", "RET", year).await?;
    Ok(format!("RET-{year}-{next:03}"))
}

/// `SCR-YYYY-NNN`, zero-padded to 3, reset each calendar year.
pub async fn next_scrap_number(conn: &mut PgConnection, year: i32) -> Result<String> {
    let next = next_in_sequence(conn, "scraps", "scrap_number", "SCR", year).await?;
    Ok(format!("SCR-{year}-{next:03}"))
}

async fn next_in_sequence(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    prefix: &str,
    year: i32,
) -> Result<i64> {
    let sql = format!(
        "SELECT {column} AS last_number FROM {table}
         WHERE {column} LIKE $1
         ORDER BY {column} DESC
         LIMIT 1"
    );

    let row = sqlx::query(&sql)
        .bind(format!("{prefix}-{year}-%"))
        .fetch_optional(&mut *conn)
        .await?;

    let last = row
        .and_then(|r| {
            let number: String = r.get("last_number");
            number.rsplit('-').next().and_then(|n| n.parse::<i64>().ok())
        })
        .unwrap_or(0);

    Ok(last + 1)
}

/// Next numeric batch number: max over existing all-digit batch numbers, plus
/// one. Non-numeric (caller-supplied) batch numbers are ignored.
pub async fn next_batch_no(conn: &mut PgConnection) -> Result<String> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(CAST(batch_no AS INTEGER)), 0) + 1 AS next_no
         FROM batches
         WHERE batch_no ~ '^[0-9]+$'",
    )
    .fetch_one(&mut *conn)
    .await?;

    let next: i32 = row.get("next_no");
    Ok(next.to_string())
}

/// Auto-generated batch code:
/// `{PRODUCT_TYPE}-{PARAM_KV_SORTED}-{BRAND}-{YEAR}-{ZERO_PADDED_BATCH_NO}`.
/// Spaces are removed from the product type name; parameters are joined as
/// `{key}{value}` in key order.
pub fn generate_batch_code(
    product_type: &str,
    parameters: &BTreeMap<String, String>,
    brand: &str,
    year: i32,
    batch_no: &str,
) -> String {
    let param_str = parameters
        .iter()
        .map(|(k, v)| format!("{k}{v}"))
        .collect::<Vec<_>>()
        .join("-");

    format!(
        "{}-{}-{}-{}-{:0>3}",
        product_type.replace(' ', ""),
        param_str,
        brand,
        year,
        batch_no
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("HDPE Pipe", "Aqualine", 2026, "7", "HDPEPipe-size110-Aqualine-2026-007")]
    #[case("Sprinkler Pipe", "RainPro", 2026, "12", "SprinklerPipe-size110-RainPro-2026-012")]
    #[case("HDPE Pipe", "Aqualine", 2026, "1234", "HDPEPipe-size110-Aqualine-2026-1234")]
    fn batch_code_format(
        #[case] product_type: &str,
        #[case] brand: &str,
        #[case] year: i32,
        #[case] batch_no: &str,
        #[case] expected: &str,
    ) {
        let mut params = BTreeMap::new();
        params.insert("size".to_string(), "110".to_string());
        assert_eq!(
            generate_batch_code(product_type, &params, brand, year, batch_no),
            expected
        );
    }

    #[test]
    fn batch_code_sorts_parameters_by_key() {
        let mut params = BTreeMap::new();
        params.insert("size".to_string(), "110".to_string());
        params.insert("grade".to_string(), "PN8".to_string());

        let code = generate_batch_code("HDPE Pipe", &params, "Aqualine", 2026, "3");
        assert_eq!(code, "HDPEPipe-gradePN8-size110-Aqualine-2026-003");
    }
}
