use crate::models::{ImportRecord, ImportSchema, KnownCustomer, PricingFields, Product, ShopContext};
use futures::stream::BoxStream;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::{Duration, Instant};

/// 单条 INSERT 的最大行数
const INSERT_CHUNK: usize = 1000;

/// 整批插入超时
const INSERT_TIMEOUT: Duration = Duration::from_secs(30);

/// 按门店查询商品
pub async fn get_product(
    pool: &PgPool,
    shop: ShopContext,
    product_id: i64,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        r#"
        SELECT id, shop_id, name, imei, sku, purchase_price, scheme, scheme_rate, scheme_price
        FROM products
        WHERE id = $1 AND shop_id = $2
        "#
    )
    .bind(product_id)
    .bind(shop.shop_id)
    .fetch_optional(pool)
    .await
}

/// 更新商品定价字段, 返回是否命中
pub async fn update_product_pricing(
    pool: &PgPool,
    shop: ShopContext,
    product_id: i64,
    fields: &PricingFields,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET purchase_price = COALESCE($1, purchase_price),
            scheme_rate = $2,
            scheme_price = $3
        WHERE id = $4 AND shop_id = $5
        "#
    )
    .bind(fields.purchase_price.clone())
    .bind(fields.scheme_rate.clone())
    .bind(fields.scheme_price.clone())
    .bind(product_id)
    .bind(shop.shop_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// 流式读取门店的已知客户 (参考导出)
pub fn stream_known_customers(
    pool: &PgPool,
    shop: ShopContext,
) -> BoxStream<'_, Result<KnownCustomer, sqlx::Error>> {
    sqlx::query_as::<_, KnownCustomer>(
        r#"
        SELECT id, first_name, last_name, email, phone, city
        FROM customers
        WHERE shop_id = $1
        ORDER BY last_name, first_name, id
        "#
    )
    .bind(shop.shop_id)
    .fetch(pool)
}

/// 批量插入导入记录
///
/// 所有分块在同一事务中执行, 任一失败整批回滚.
pub async fn insert_records(
    pool: &PgPool,
    schema: &ImportSchema,
    records: &[ImportRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let columns = present_columns(schema, records);

    tracing::debug!(
        "开始批量插入 {}: {} 条记录, {} 列",
        schema.table, records.len(), columns.len()
    );
    let start_time = Instant::now();

    let execute = async {
        let mut tx = pool.begin().await?;
        let mut affected = 0u64;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut query_builder = build_insert(schema, &columns, chunk);
            let result = query_builder.build().execute(&mut *tx).await?;
            affected += result.rows_affected();
        }

        tx.commit().await?;
        Ok::<u64, sqlx::Error>(affected)
    };

    match tokio::time::timeout(INSERT_TIMEOUT, execute).await {
        Ok(Ok(affected)) => {
            tracing::info!(
                "✓ INSERT {} 成功, 影响 {} 行, 耗时: {:?}",
                schema.table, affected, start_time.elapsed()
            );
            Ok(affected)
        }
        Ok(Err(e)) => {
            tracing::error!(
                "✗ INSERT {} 失败, 耗时: {:?}, 错误: {:?}",
                schema.table, start_time.elapsed(), e
            );
            Err(e)
        }
        Err(_) => {
            tracing::error!("✗ INSERT {} 超时 (>{:?})!", schema.table, INSERT_TIMEOUT);
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

/// 只插入至少一条记录出现过的列
fn present_columns(schema: &ImportSchema, records: &[ImportRecord]) -> Vec<&'static str> {
    schema
        .insert_columns()
        .filter(|c| records.iter().any(|r| r.contains_key(*c)))
        .collect()
}

/// 构建单个分块的 INSERT. 记录中缺失的列写 DEFAULT, 由数据库填充默认值
fn build_insert<'a>(
    schema: &ImportSchema,
    columns: &[&'static str],
    chunk: &'a [ImportRecord],
) -> QueryBuilder<'a, Postgres> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        schema.table,
        columns.join(", ")
    ));

    query_builder.push_values(chunk, |mut b, record| {
        for column in columns {
            match record.get(*column) {
                Some(value) => {
                    let sql_type = schema
                        .column_kind(column)
                        .map(|k| k.sql_type())
                        .unwrap_or("text");
                    b.push("CAST(")
                        .push_bind_unseparated(value.clone())
                        .push_unseparated(format!(" AS {})", sql_type));
                }
                None => {
                    b.push("DEFAULT");
                }
            }
        }
    });

    query_builder
}
