pub mod csv_import;
pub mod export;
pub mod import_session;
pub mod pricing;
pub mod recognition;

pub use csv_import::CsvImportValidator;
pub use import_session::{ImportService, ImportSession, ImportState, SessionView};
pub use pricing::{parse_amount, PricingReconciler};
pub use recognition::{ProductSuggestion, RecognitionService};
