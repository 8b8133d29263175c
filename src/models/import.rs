use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::shop::SHOP_FIELD;

/// 字段的数据库类型 (批量插入时用于 CAST)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Decimal,
    /// 非负金额
    Amount,
    Integer,
}

impl FieldKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Decimal | FieldKind::Amount => "numeric",
            FieldKind::Integer => "bigint",
        }
    }
}

/// 目标字段定义
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip)]
    pub sample: &'static str,
}

const fn field(name: &'static str, kind: FieldKind, required: bool, sample: &'static str) -> FieldSpec {
    FieldSpec { name, kind, required, sample }
}

/// 导入目标表结构 - 按实体参数化, 客户与商品共用同一套导入流程
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportSchema {
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

pub const CUSTOMER_SCHEMA: ImportSchema = ImportSchema {
    table: "customers",
    fields: &[
        field("first_name", FieldKind::Text, false, "Jane"),
        field("last_name", FieldKind::Text, true, "Smith"),
        field("email", FieldKind::Text, false, "jane.smith@example.com"),
        field("phone", FieldKind::Text, false, "07700 900123"),
        field("address", FieldKind::Text, false, "1 High Street"),
        field("city", FieldKind::Text, false, "London"),
        field("postcode", FieldKind::Text, false, "SW1A 1AA"),
        field("id_number", FieldKind::Text, false, "AB123456C"),
        field("notes", FieldKind::Text, false, ""),
    ],
};

pub const PRODUCT_SCHEMA: ImportSchema = ImportSchema {
    table: "products",
    fields: &[
        field("name", FieldKind::Text, true, "iPhone 12 64GB"),
        field("category", FieldKind::Text, false, "Phones"),
        field("imei", FieldKind::Text, false, "356938035643809"),
        field("sku", FieldKind::Text, false, "PH-0001"),
        field("serial_number", FieldKind::Text, false, ""),
        field("condition", FieldKind::Text, false, "Good"),
        field("purchase_price", FieldKind::Amount, true, "100.00"),
        field("scheme", FieldKind::Text, false, "28-day-buy-back"),
        field("scheme_rate", FieldKind::Decimal, false, "10"),
        field("scheme_price", FieldKind::Decimal, false, "110.00"),
        field("sale_price", FieldKind::Amount, false, ""),
        field("customer_id", FieldKind::Integer, false, ""),
        field("notes", FieldKind::Text, false, ""),
    ],
};

/// 注入的门店字段, 不出现在模板中
const SHOP_FIELD_SPEC: FieldSpec = field(SHOP_FIELD, FieldKind::Integer, false, "");

impl ImportSchema {
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// 必填字段集合
    pub fn required_fields(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.to_string())
            .collect()
    }

    /// 插入列的类型, 包括注入的上下文列
    pub fn column_kind(&self, column: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .chain(std::iter::once(&SHOP_FIELD_SPEC))
            .find(|f| f.name == column)
            .map(|f| f.kind)
    }

    /// 插入列顺序: schema 字段顺序, 最后是上下文列
    pub fn insert_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.field_names().chain(std::iter::once(SHOP_FIELD_SPEC.name))
    }
}

/// 导入实体类型 (路由参数)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportTarget {
    Customers,
    Products,
}

impl ImportTarget {
    pub fn schema(&self) -> &'static ImportSchema {
        match self {
            ImportTarget::Customers => &CUSTOMER_SCHEMA,
            ImportTarget::Products => &PRODUCT_SCHEMA,
        }
    }
}

/// 源文件的一行: 表头 -> 原始值
pub type SourceRow = IndexMap<String, String>;

/// 转换后的记录: 目标字段 -> 修剪后的非空值
pub type ImportRecord = IndexMap<String, String>;

/// 解析结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedFile {
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

/// 列映射: 源列名 -> 目标字段. 未出现的源列即"不导入"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(IndexMap<String, String>);

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.0.insert(source.into(), target.into());
    }

    /// 标记为"不导入"
    pub fn unmap(&mut self, source: &str) {
        self.0.shift_remove(source);
    }

    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.0.get(source).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    pub fn targets(&self) -> BTreeSet<&str> {
        self.0.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, t)| (s.into(), t.into())).collect())
    }
}

/// 行级校验未通过
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectedRow {
    /// 空白的必填字段
    pub missing: Vec<String>,
    /// 值与字段类型不符
    pub invalid: Vec<String>,
}

impl RejectedRow {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

/// 批量转换结果, kept.len() + skipped == 总行数
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub kept: Vec<ImportRecord>,
    pub skipped: usize,
}

/// 导入成功汇总
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub inserted: u64,
    pub skipped: usize,
    pub warning: Option<String>,
}
