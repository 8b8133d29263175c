use async_trait::async_trait;
use sqlx::PgPool;

use super::queries;
use crate::models::{ImportRecord, ImportSchema, PricingFields, Product, ShopContext};

/// 持久化边界: 导入批量写入与单条商品定价更新
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 整批写入, 全部成功或全部失败
    async fn insert_batch(
        &self,
        schema: &'static ImportSchema,
        shop: ShopContext,
        records: &[ImportRecord],
    ) -> Result<u64, sqlx::Error>;

    async fn find_product(&self, shop: ShopContext, product_id: i64) -> Result<Option<Product>, sqlx::Error>;

    async fn update_pricing(
        &self,
        shop: ShopContext,
        product_id: i64,
        fields: &PricingFields,
    ) -> Result<bool, sqlx::Error>;
}

/// Postgres 实现
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_batch(
        &self,
        schema: &'static ImportSchema,
        shop: ShopContext,
        records: &[ImportRecord],
    ) -> Result<u64, sqlx::Error> {
        tracing::info!(
            "Shop {}: inserting {} records into {}",
            shop.shop_id, records.len(), schema.table
        );
        queries::insert_records(&self.pool, schema, records).await
    }

    async fn find_product(&self, shop: ShopContext, product_id: i64) -> Result<Option<Product>, sqlx::Error> {
        queries::get_product(&self.pool, shop, product_id).await
    }

    async fn update_pricing(
        &self,
        shop: ShopContext,
        product_id: i64,
        fields: &PricingFields,
    ) -> Result<bool, sqlx::Error> {
        queries::update_product_pricing(&self.pool, shop, product_id, fields).await
    }
}
