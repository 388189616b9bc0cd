//! Resource implementations

pub mod intent_check;
pub mod nqe_query;
pub mod snapshot;

pub use intent_check::IntentCheckResource;
pub use nqe_query::NqeQueryResource;
pub use snapshot::SnapshotResource;
