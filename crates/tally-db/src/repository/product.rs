//! # Product Cache Repository
//!
//! The terminal's copy of the store catalog, used to ring up sales while the
//! server is unreachable.
//!
//! ## Wholesale Replacement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  GET /api/stores/{store}/products  ──►  [p1, p2, p3]                    │
//! │                                              │                          │
//! │                  ┌───────────────────────────▼──────────────────────┐   │
//! │                  │  BEGIN                                           │   │
//! │                  │    DELETE FROM cached_products                   │   │
//! │                  │    INSERT p1, INSERT p2, INSERT p3               │   │
//! │                  │  COMMIT                                          │   │
//! │                  └──────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A reader sees the old snapshot or the new one, never a mix.            │
//! │  A failed insert rolls back and the old snapshot survives.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::CachedProduct;

const PRODUCT_COLUMNS: &str = r#"
    product_id, name, brand, category, cost_price_cents,
    selling_price_cents, quantity, unit_name, bulk_quantity,
    bulk_price_cents, last_updated
"#;

/// Repository for the product snapshot.
#[derive(Debug, Clone)]
pub struct ProductCacheRepository {
    pool: SqlitePool,
}

impl ProductCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductCacheRepository { pool }
    }

    /// Swaps the whole snapshot for `products` in one transaction.
    pub async fn replace_all(&self, products: &[CachedProduct]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cached_products")
            .execute(&mut *tx)
            .await?;

        for product in products {
            sqlx::query(
                r#"
                INSERT INTO cached_products (
                    product_id, name, brand, category, cost_price_cents,
                    selling_price_cents, quantity, unit_name, bulk_quantity,
                    bulk_price_cents, last_updated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&product.product_id)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.category)
            .bind(product.cost_price_cents)
            .bind(product.selling_price_cents)
            .bind(product.quantity)
            .bind(&product.unit_name)
            .bind(product.bulk_quantity)
            .bind(product.bulk_price_cents)
            .bind(product.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = products.len(), "Product cache replaced");
        Ok(())
    }

    /// The snapshot in the order it was received.
    pub async fn list(&self) -> DbResult<Vec<CachedProduct>> {
        let products = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM cached_products ORDER BY local_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn get(&self, product_id: &str) -> DbResult<Option<CachedProduct>> {
        let product = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM cached_products WHERE product_id = ?1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Case-insensitive name/brand lookup for the till search box.
    pub async fn search(&self, term: &str, limit: u32) -> DbResult<Vec<CachedProduct>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", term.replace('%', "").replace('_', ""));

        let products = sqlx::query_as(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM cached_products
            WHERE name LIKE ?1 OR brand LIKE ?1
            ORDER BY name ASC
            LIMIT ?2
            "#
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cached_products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use chrono::{DateTime, SubsecRound, Utc};
    use tally_core::CachedProduct;

    fn product(id: &str, name: &str, at: DateTime<Utc>) -> CachedProduct {
        CachedProduct {
            product_id: id.into(),
            name: name.into(),
            brand: Some("Acme".into()),
            category: None,
            cost_price_cents: 60,
            selling_price_cents: 100,
            quantity: 24,
            unit_name: "pcs".into(),
            bulk_quantity: Some(12),
            bulk_price_cents: Some(90),
            last_updated: at,
        }
    }

    #[tokio::test]
    async fn test_replace_all_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let now = Utc::now().trunc_subsecs(6);

        repo.replace_all(&[product("old", "Stale Bread", now)])
            .await
            .unwrap();

        let fresh = vec![
            product("p2", "Zebra Gum", now),
            product("p1", "Apple Juice", now),
        ];
        repo.replace_all(&fresh).await.unwrap();

        assert_eq!(repo.list().await.unwrap(), fresh);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert!(repo.get("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let now = Utc::now();

        repo.replace_all(&[product("p1", "Milk", now)]).await.unwrap();

        let duplicated = vec![product("p9", "Tea", now), product("p9", "Tea", now)];
        let err = repo.replace_all(&duplicated).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Milk".to_string()]);
    }

    #[tokio::test]
    async fn test_search() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let now = Utc::now();
        repo.replace_all(&[
            product("p1", "Coca-Cola 330ml", now),
            product("p2", "Fanta 330ml", now),
        ])
        .await
        .unwrap();

        let hits = repo.search("cola", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product_id, "p1");
        assert_eq!(repo.search("acme", 10).await.unwrap().len(), 2);
        assert!(repo.search("  ", 10).await.unwrap().is_empty());
    }
}
