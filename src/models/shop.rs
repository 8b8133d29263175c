use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// 当前门店 (租户) 的请求头名称
pub const SHOP_HEADER: &str = "x-shop-id";

/// 注入到每条导入记录中的门店字段
pub const SHOP_FIELD: &str = "shop_id";

/// 门店上下文 - 显式传入每个按门店隔离的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopContext {
    pub shop_id: i64,
}

impl ShopContext {
    pub fn new(shop_id: i64) -> Self {
        Self { shop_id }
    }

    /// 从请求头解析门店ID, 缺失或非数字时返回 None
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(SHOP_HEADER)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
            .map(Self::new)
    }

    /// 导入时注入的上下文字段
    pub fn context_fields(&self) -> Vec<(String, String)> {
        vec![(SHOP_FIELD.to_string(), self.shop_id.to_string())]
    }
}
