pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, PgRecordStore, RecordStore};
pub use error::{ImportError, RecognitionError};
pub use service::{CsvImportValidator, ImportService, PricingReconciler, RecognitionService};
