use crate::domain::repositories::AssetRepository;
use crate::domain::types::Asset;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

pub struct PgAssetRepository {
    pool: PgPool,
}

impl PgAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetRepository for PgAssetRepository {
    async fn find_active(&self) -> Result<Vec<Asset>> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, name, coingecko_id, cmc_id, rank, is_active
            FROM cryptocurrencies
            WHERE is_active = TRUE
            ORDER BY rank ASC NULLS LAST
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch active cryptocurrencies")?;

        let mut assets = Vec::with_capacity(rows.len());
        for row in rows {
            assets.push(Asset {
                id: row.try_get("id")?,
                symbol: row.try_get("symbol")?,
                name: row.try_get("name")?,
                coingecko_id: row.try_get("coingecko_id")?,
                cmc_id: row.try_get("cmc_id")?,
                rank: row.try_get("rank")?,
                is_active: row.try_get("is_active")?,
            });
        }
        Ok(assets)
    }
}
