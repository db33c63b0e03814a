pub mod fingerprint;
pub mod location;
pub mod staging;

pub use fingerprint::{fingerprint, list_with_digests};
pub use location::{Location, LocationKind};
pub use staging::StagingArea;
