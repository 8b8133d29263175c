pub mod customer;
pub mod import;
pub mod product;
pub mod shop;

pub use customer::KnownCustomer;
pub use import::{
    ColumnMapping, FieldKind, FieldSpec, ImportRecord, ImportSchema, ImportSummary, ImportTarget,
    ParsedFile, RejectedRow, SourceRow, TransformOutcome, CUSTOMER_SCHEMA, PRODUCT_SCHEMA,
};
pub use product::{is_buy_back_scheme, EditedField, PricingFields, Product};
pub use shop::{ShopContext, SHOP_FIELD, SHOP_HEADER};
