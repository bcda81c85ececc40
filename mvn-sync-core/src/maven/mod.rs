//! Maven repository layout: coordinates, version ordering and the
//! `maven-metadata.xml` documents derived from them.

pub mod coordinate;
pub mod metadata;
pub mod version;

pub use coordinate::{classify, enclosing_coordinate, Coordinate, MavenPath, METADATA_NAME};
pub use metadata::{MavenMetadata, MetadataChange, MetadataReconciler};
pub use version::MavenVersion;
