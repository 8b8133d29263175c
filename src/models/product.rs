use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 回购方案名称约定: 含该子串即为回购方案
pub const BUY_BACK_MARKER: &str = "buy-back";

/// 商品表 (products) 中与定价相关的字段
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub imei: Option<String>,   // 不做 Luhn 校验
    pub sku: Option<String>,
    pub purchase_price: BigDecimal,
    pub scheme: String,
    pub scheme_rate: Option<BigDecimal>,
    pub scheme_price: Option<BigDecimal>,
}

impl Product {
    pub fn is_buy_back(&self) -> bool {
        is_buy_back_scheme(&self.scheme)
    }

    /// 当前定价字段快照
    pub fn pricing(&self) -> PricingFields {
        PricingFields {
            purchase_price: Some(self.purchase_price.clone()),
            scheme_rate: self.scheme_rate.clone(),
            scheme_price: self.scheme_price.clone(),
        }
    }
}

pub fn is_buy_back_scheme(scheme: &str) -> bool {
    scheme.contains(BUY_BACK_MARKER)
}

/// 三个联动定价字段. None 表示空白或无法解析的输入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingFields {
    pub purchase_price: Option<BigDecimal>,
    pub scheme_rate: Option<BigDecimal>,
    pub scheme_price: Option<BigDecimal>,
}

/// 用户本次编辑的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditedField {
    PurchasePrice,
    Rate,
    Price,
}
