//! Shared types for the Talewright export and publish tools.
//!
//! Holds the document model consumed by the pipeline (projects, timelines,
//! scenes, viewpoint worlds), the publish format constants, and small
//! filesystem/naming helpers used by both the library and the CLI.

pub mod documents;
pub mod fs;
pub mod ids;
pub mod publish_format;

pub use documents::{
    PovTag, ProjectDocument, SceneDocument, TimelineDocument, TimelineEntry, WorldDocument,
};
pub use fs::{
    read_file_with_limit, sha256_file, sha256_hex, MAX_ASSET_BYTES, MAX_DOCUMENT_BYTES,
};
pub use ids::{is_safe_path_component, slugify};
pub use publish_format::{PublishFormat, TALEWRIGHT_FORMAT};
