//! talewright-export library
//!
//! Compiles scene/timeline graphs into label/jump script bundles and packages
//! export trees into reproducible publish archives. Used by the `talewright`
//! CLI and by embedders that supply their own document store and oracles.

pub mod assets;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod options;
pub mod oracle;
pub mod pipeline;
pub mod provenance;
pub mod publish;
pub mod render;
pub mod routes;
pub mod store;
pub mod viewpoint;

// Re-export the entry points and the types their signatures use
pub use error::{AssetKind, DocumentKind, ExportError, ExportWarning};
pub use options::{ExportOptions, RouteMode};
pub use oracle::{
    AdvisoryFinding, AdvisoryScanner, BundleContext, GateDecision, Oracles, PolicyGate,
    RatingDecision, RatingOracle, RatingRequest, HOOK_CATALOG,
};
pub use pipeline::{export, ExportContext, ExportResult, PovFork};
pub use publish::{package, PackageOptions, PackageResult, PublishTarget};
pub use store::{DirectoryStore, DocumentStore, MemoryStore};

// Re-export diff types for dry-run reporting
pub use diff::{DiffDetail, DiffEntry, DiffStatus};

// Re-export shared document model
pub use talewright_shared::{
    PovTag, ProjectDocument, SceneDocument, TimelineDocument, TimelineEntry, WorldDocument,
    TALEWRIGHT_FORMAT,
};
