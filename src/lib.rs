pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod telemetry;
pub mod upstream;

pub use config::AppConfig;
pub use error::{ApiError, ConfigError, FetchError, StoreError};
pub use models::{Product, ProductDraft, ProductFilter};
pub use pipeline::{IngestRequest, Ingestor, RetryPolicy, RunReport, StopReason};
pub use store::{ProductStore, SqliteProductStore};
pub use upstream::{ProductSource, RawProduct, WbSearchClient};
