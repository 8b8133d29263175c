use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 已知客户 (customers 表的导出字段子集)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnownCustomer {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
}
