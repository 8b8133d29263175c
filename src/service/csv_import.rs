use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::BTreeSet;

use crate::error::ImportError;
use crate::models::{
    ColumnMapping, FieldKind, ImportRecord, ImportSchema, ParsedFile, RejectedRow, SourceRow,
    TransformOutcome,
};
use crate::service::pricing::parse_amount;

/// CSV 导入校验器 (按目标表结构参数化)
///
/// 流程: 解析 -> 自动映射 -> 用户调整映射 -> 映射校验 -> 逐行转换与校验.
#[derive(Debug, Clone, Copy)]
pub struct CsvImportValidator {
    schema: &'static ImportSchema,
}

impl CsvImportValidator {
    pub fn new(schema: &'static ImportSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'static ImportSchema {
        self.schema
    }

    /// 解析带表头的 CSV 文本
    pub fn parse(text: &str) -> Result<ParsedFile, ImportError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::Parse("file has no header row".to_string()));
        }

        let mut seen = BTreeSet::new();
        for (idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                return Err(ImportError::Parse(format!("column {} has an empty header", idx + 1)));
            }
            if !seen.insert(header.as_str()) {
                return Err(ImportError::Parse(format!("duplicate column header '{}'", header)));
            }
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;

            // 跳过空行
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            if record.len() != headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                return Err(ImportError::Parse(format!(
                    "line {} has {} fields, expected {}",
                    line,
                    record.len(),
                    headers.len()
                )));
            }

            let row: SourceRow = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            rows.push(row);
        }

        tracing::info!("CSV parsed: {} columns, {} rows", headers.len(), rows.len());
        Ok(ParsedFile { headers, rows })
    }

    /// 自动映射: 表头与字段名完全一致 (区分大小写) 时预先映射
    pub fn auto_map(&self, headers: &[String]) -> ColumnMapping {
        headers
            .iter()
            .filter(|h| self.schema.has_field(h))
            .map(|h| (h.clone(), h.clone()))
            .collect()
    }

    /// 修改某一源列的映射, None 表示不导入
    pub fn set_target(
        &self,
        mapping: &mut ColumnMapping,
        headers: &[String],
        source: &str,
        target: Option<&str>,
    ) -> Result<(), ImportError> {
        if !headers.iter().any(|h| h == source) {
            return Err(ImportError::UnknownSourceColumn(source.to_string()));
        }
        match target {
            Some(t) if !self.schema.has_field(t) => Err(ImportError::UnknownTargetField(t.to_string())),
            Some(t) => {
                mapping.insert(source, t);
                Ok(())
            }
            None => {
                mapping.unmap(source);
                Ok(())
            }
        }
    }

    /// 用整张映射表替换, 任一目标字段不合法则整体拒绝
    pub fn replace_mapping(
        &self,
        headers: &[String],
        pairs: IndexMap<String, Option<String>>,
    ) -> Result<ColumnMapping, ImportError> {
        let mut mapping = ColumnMapping::new();
        for (source, target) in &pairs {
            self.set_target(&mut mapping, headers, source, target.as_deref())?;
        }
        Ok(mapping)
    }

    /// 尚未映射的必填字段, 非空时不允许导入
    pub fn validate_mapping(&self, mapping: &ColumnMapping) -> BTreeSet<String> {
        missing_required(mapping, &self.schema.required_fields())
    }

    pub fn transform_row(
        &self,
        row: &SourceRow,
        mapping: &ColumnMapping,
        context: &[(String, String)],
    ) -> Result<ImportRecord, RejectedRow> {
        transform_row(row, mapping, context, self.schema)
    }

    pub fn transform_all(
        &self,
        rows: &[SourceRow],
        mapping: &ColumnMapping,
        context: &[(String, String)],
    ) -> TransformOutcome {
        transform_all(rows, mapping, context, self.schema)
    }
}

/// 映射值集合中缺少的必填字段
pub fn missing_required(mapping: &ColumnMapping, required: &BTreeSet<String>) -> BTreeSet<String> {
    let targets = mapping.targets();
    required
        .iter()
        .filter(|f| !targets.contains(f.as_str()))
        .cloned()
        .collect()
}

/// 映射到同一目标字段的多个源列 (后者覆盖前者)
pub fn duplicate_targets(mapping: &ColumnMapping) -> Vec<String> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for (_, target) in mapping.iter() {
        *counts.entry(target).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(t, _)| t.to_string())
        .collect()
}

/// 按字段类型校验并规范化单个值, 不合法时返回 None
///
/// 小数允许逗号作为小数点, 写入前统一为点号.
pub fn normalize_value(kind: FieldKind, value: &str) -> Option<String> {
    match kind {
        FieldKind::Text => Some(value.to_string()),
        FieldKind::Decimal => parse_amount(value).map(|d| d.to_string()),
        FieldKind::Amount => parse_amount(value)
            .filter(|d| *d >= BigDecimal::zero())
            .map(|d| d.to_string()),
        FieldKind::Integer => value.parse::<i64>().ok().map(|n| n.to_string()),
    }
}

/// 单行转换: 复制修剪后的非空值, 合并上下文字段, 再检查必填字段与字段类型
pub fn transform_row(
    row: &SourceRow,
    mapping: &ColumnMapping,
    context: &[(String, String)],
    schema: &ImportSchema,
) -> Result<ImportRecord, RejectedRow> {
    let mut record = ImportRecord::new();

    for (source, target) in mapping.iter() {
        let Some(value) = row.get(source).map(|v| v.trim()) else {
            continue;
        };
        if !value.is_empty() {
            record.insert(target.to_string(), value.to_string());
        }
    }

    for (key, value) in context {
        record.insert(key.clone(), value.clone());
    }

    let mut rejected = RejectedRow::default();
    for field in schema.fields {
        match record.get_mut(field.name) {
            Some(value) => match normalize_value(field.kind, value) {
                Some(normalized) => *value = normalized,
                None => rejected.invalid.push(field.name.to_string()),
            },
            None if field.required => rejected.missing.push(field.name.to_string()),
            None => {}
        }
    }

    if rejected.is_empty() {
        Ok(record)
    } else {
        Err(rejected)
    }
}

/// 批量转换, 保持行顺序
pub fn transform_all(
    rows: &[SourceRow],
    mapping: &ColumnMapping,
    context: &[(String, String)],
    schema: &ImportSchema,
) -> TransformOutcome {
    let results: Vec<_> = rows
        .par_iter()
        .map(|row| transform_row(row, mapping, context, schema))
        .collect();

    let mut outcome = TransformOutcome::default();
    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(record) => outcome.kept.push(record),
            Err(rejected) => {
                tracing::debug!(
                    "row {} skipped, missing {:?}, invalid {:?}",
                    idx + 1, rejected.missing, rejected.invalid
                );
                outcome.skipped += 1;
            }
        }
    }
    outcome
}
