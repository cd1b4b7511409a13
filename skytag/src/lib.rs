//! skytag: a tag resolution engine.
//!
//! Maps symbolic tags to URL/command templates through a record-oriented
//! dictionary: indirection chains of alternative mirrors, positional
//! parameter substitution with URL-encoding semantics, latency-ranked
//! mirror selection, remote fallback fetch, and best-effort usage logging.

pub mod config;
pub mod error;
pub mod fetch;
pub mod logger;
mod probe;
pub mod profile;
pub mod record;
pub mod resolver;
pub mod store;
pub mod template;

pub use config::EngineConfig;
pub use error::{LoadError, ResolveError};
pub use logger::UsageLogger;
pub use record::{LoadStats, RecordObserver};
pub use resolver::Resolver;
pub use store::{Alternative, Dictionary, Entry, Pattern, Resolution, TestSpec};
pub use template::{expand, split_params, SubstMode};
