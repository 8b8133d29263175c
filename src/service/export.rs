use csv::Writer;
use futures::{Stream, TryStreamExt};

use crate::models::{ImportSchema, KnownCustomer};

/// 已知客户导出的表头
pub const KNOWN_CUSTOMER_HEADERS: [&str; 6] = ["id", "first_name", "last_name", "email", "phone", "city"];

/// 生成导入模板: 表头与导入期望完全一致, 附一行示例
pub fn template_csv(schema: &ImportSchema) -> Result<String, csv::Error> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(schema.field_names())?;
    writer.write_record(schema.fields.iter().map(|f| f.sample))?;
    into_string(writer)
}

/// 已知客户 CSV 写入器, 逐行追加
pub struct KnownCustomerCsv {
    writer: Writer<Vec<u8>>,
    rows: usize,
}

impl KnownCustomerCsv {
    pub fn new() -> Result<Self, csv::Error> {
        let mut writer = Writer::from_writer(Vec::new());
        writer.write_record(KNOWN_CUSTOMER_HEADERS)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn push(&mut self, customer: &KnownCustomer) -> Result<(), csv::Error> {
        self.writer.write_record([
            customer.id.to_string(),
            option_to_csv(&customer.first_name),
            customer.last_name.clone(),
            option_to_csv(&customer.email),
            option_to_csv(&customer.phone),
            option_to_csv(&customer.city),
        ])?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Result<String, csv::Error> {
        into_string(self.writer)
    }
}

/// 导出已知客户列表, 边读边写
pub async fn customers_reference_csv<S, E>(mut customers: S) -> Result<String, E>
where
    S: Stream<Item = Result<KnownCustomer, E>> + Unpin,
    E: From<csv::Error>,
{
    let mut csv = KnownCustomerCsv::new()?;
    while let Some(customer) = customers.try_next().await? {
        csv.push(&customer)?;
    }
    tracing::debug!("known customers written: {}", csv.rows());
    Ok(csv.finish()?)
}

/// 下载文件名, 例如 customers-template-20240131.csv
pub fn export_file_name(stem: &str) -> String {
    format!("{}-{}.csv", stem, chrono::Local::now().format("%Y%m%d"))
}

fn option_to_csv(val: &Option<String>) -> String {
    val.clone().unwrap_or_default()
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, csv::Error> {
    let bytes = writer.into_inner().map_err(|e| {
        csv::Error::from(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })?;
    // 写入的都是 &str, 必定是合法 UTF-8
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
