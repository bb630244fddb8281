//! Service layer: persistence and metrics.

pub mod database;
pub mod metrics;

pub use database::{Database, ImportedRow};
pub use metrics::{get_metrics, init_metrics};
