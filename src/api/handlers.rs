use crate::api::error::ApiError;
use crate::db::{queries, RecordStore};
use crate::models::{
    is_buy_back_scheme, EditedField, ImportSummary, ImportTarget, PricingFields, ShopContext,
};
use crate::service::export;
use crate::service::{
    parse_amount, ImportService, PricingReconciler, ProductSuggestion, RecognitionService, SessionView,
};
use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bigdecimal::{BigDecimal, Zero};
use futures::TryStreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

fn shop_from(headers: &HeaderMap) -> Result<ShopContext, ApiError> {
    ShopContext::from_headers(headers).ok_or(ApiError::MissingShop)
}

// ---------------------------------------------------------------------------
// 定价
// ---------------------------------------------------------------------------

/// 请求体: 表单中的原始文本, 由服务端解析. 未出现的字段保持原值
#[derive(Debug, Deserialize)]
pub struct PricingRequest {
    pub edited: EditedField,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<String>,
    #[serde(default)]
    pub scheme_rate: Option<String>,
    #[serde(default)]
    pub scheme_price: Option<String>,
}

impl PricingRequest {
    /// 用请求中出现的字段覆盖 base
    fn overlay(&self, base: PricingFields) -> PricingFields {
        PricingFields {
            purchase_price: self.purchase_price.as_deref().map_or(base.purchase_price, parse_amount),
            scheme_rate: self.scheme_rate.as_deref().map_or(base.scheme_rate, parse_amount),
            scheme_price: self.scheme_price.as_deref().map_or(base.scheme_price, parse_amount),
        }
    }
}

/// 响应体
#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub success: bool,
    pub buy_back: bool,
    #[serde(flatten)]
    pub fields: PricingFields,
}

fn check_purchase_price(fields: &PricingFields) -> Result<(), ApiError> {
    match &fields.purchase_price {
        Some(p) if *p < BigDecimal::zero() => {
            Err(ApiError::Validation("purchase price must not be negative".to_string()))
        }
        _ => Ok(()),
    }
}

/// 表单联动计算 (不落库). 未指定方案时按回购方案计算
pub async fn reconcile_pricing(Json(req): Json<PricingRequest>) -> Result<Json<PricingResponse>, ApiError> {
    let fields = req.overlay(PricingFields::default());
    check_purchase_price(&fields)?;

    let buy_back = req.scheme.as_deref().map_or(true, is_buy_back_scheme);
    let fields = if buy_back {
        PricingReconciler::reconcile(req.edited, &fields)
    } else {
        fields
    };

    Ok(Json(PricingResponse {
        success: true,
        buy_back,
        fields,
    }))
}

/// 单条商品定价更新: 按商品方案联动后保存
pub async fn update_product_pricing(
    State(store): State<Arc<dyn RecordStore>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<PricingRequest>,
) -> Result<Json<PricingResponse>, ApiError> {
    let shop = shop_from(&headers)?;
    let product = store
        .find_product(shop, product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {} not found", product_id)))?;

    let stored = product.pricing();
    let mut fields = req.overlay(stored.clone());
    check_purchase_price(&fields)?;
    if fields.purchase_price.is_none() {
        fields.purchase_price = stored.purchase_price;
    }

    let fields = PricingReconciler::apply_for_scheme(&product.scheme, req.edited, &fields);
    if !store.update_pricing(shop, product_id, &fields).await? {
        return Err(ApiError::NotFound(format!("product {} not found", product_id)));
    }

    tracing::info!(
        "Shop {}: product {} pricing updated ({:?} edited, scheme {})",
        shop.shop_id, product_id, req.edited, product.scheme
    );

    Ok(Json(PricingResponse {
        success: true,
        buy_back: product.is_buy_back(),
        fields,
    }))
}

// ---------------------------------------------------------------------------
// 导入向导
// ---------------------------------------------------------------------------

/// 请求体: 源列 -> 目标字段, null 表示不导入
#[derive(Debug, Deserialize)]
pub struct MappingRequest {
    pub mapping: IndexMap<String, Option<String>>,
}

/// 导入结果响应体
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

/// 选择文件: 请求体为 CSV 原文
pub async fn open_import_session(
    State(service): State<Arc<ImportService>>,
    Path(target): Path<ImportTarget>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionView>, ApiError> {
    let shop = shop_from(&headers)?;
    let text = std::str::from_utf8(&body)
        .map_err(|e| crate::error::ImportError::Parse(format!("file is not valid UTF-8: {}", e)))?;
    Ok(Json(service.open(target, shop, text)?))
}

pub async fn get_import_session(
    State(service): State<Arc<ImportService>>,
    Path(session_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, ApiError> {
    let shop = shop_from(&headers)?;
    Ok(Json(service.view(session_id, shop)?))
}

pub async fn update_import_mapping(
    State(service): State<Arc<ImportService>>,
    Path(session_id): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<MappingRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let shop = shop_from(&headers)?;
    Ok(Json(service.remap(session_id, shop, req.mapping)?))
}

pub async fn commit_import(
    State(service): State<Arc<ImportService>>,
    Path(session_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<ImportResponse>, ApiError> {
    let shop = shop_from(&headers)?;
    let summary = service.commit(session_id, shop).await?;
    Ok(Json(ImportResponse {
        success: true,
        message: format!("Successfully imported {} records", summary.inserted),
        summary,
    }))
}

pub async fn cancel_import(
    State(service): State<Arc<ImportService>>,
    Path(session_id): Path<u64>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let shop = shop_from(&headers)?;
    if service.cancel(session_id, shop) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(crate::error::ImportError::SessionNotFound(session_id).into())
    }
}

// ---------------------------------------------------------------------------
// 模板 / 导出
// ---------------------------------------------------------------------------

fn csv_response(body: String, file_name: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response()
}

pub async fn download_template(Path(target): Path<ImportTarget>) -> Result<Response, ApiError> {
    let schema = target.schema();
    let body = export::template_csv(schema)?;
    Ok(csv_response(body, export::export_file_name(&format!("{}-template", schema.table))))
}

/// 已知客户参考导出 (流式读取)
pub async fn export_known_customers(
    State(pool): State<PgPool>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let shop = shop_from(&headers)?;
    let rows = queries::stream_known_customers(&pool, shop).map_err(ApiError::from);
    let body = export::customers_reference_csv(rows).await?;

    tracing::info!("Shop {}: known customers exported ({} bytes)", shop.shop_id, body.len());
    Ok(csv_response(body, export::export_file_name("customers")))
}

// ---------------------------------------------------------------------------
// 图片识别
// ---------------------------------------------------------------------------

pub async fn recognize_product(
    State(service): State<Arc<RecognitionService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProductSuggestion>, ApiError> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !mime_type.starts_with("image/") {
        return Err(ApiError::Validation(format!("expected an image, got '{}'", mime_type)));
    }
    if body.is_empty() {
        return Err(ApiError::Validation("image body is empty".to_string()));
    }

    Ok(Json(service.recognize(&body, mime_type).await?))
}
