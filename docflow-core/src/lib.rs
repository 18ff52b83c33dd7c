// docflow-core/src/lib.rs
// Pure Rust API - in-memory document model, no I/O

pub mod aggregation;
pub mod document;
pub mod error;
pub mod hydrate;
pub mod logging;
pub mod path;
pub mod query;
pub mod value_utils;

// Public exports
pub use aggregation::{Collect, FilterFn, SortDirection};
pub use document::{Container, Document, Key, Number, Scalar};
pub use error::{DocflowError, Result};
pub use hydrate::{HydrateMode, Hydrator};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use path::WildcardMatch;
pub use query::Predicate;
