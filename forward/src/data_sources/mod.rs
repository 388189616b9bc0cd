//! Data source implementations

pub mod intent_checks;
pub mod nqe_query;
pub mod path_analysis;
pub mod snapshots;
pub mod version;

pub use intent_checks::IntentChecksDataSource;
pub use nqe_query::NqeQueryDataSource;
pub use path_analysis::PathAnalysisDataSource;
pub use snapshots::SnapshotsDataSource;
pub use version::VersionDataSource;
