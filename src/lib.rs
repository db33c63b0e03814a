pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::StagingConfig;
pub use self::core::{fingerprint, list_with_digests, Location, LocationKind, StagingArea};
pub use error::Error;
pub use logging::LogConfig;
pub use storage::{FileEntry, Storage, DIRECTORY_DIGEST};
