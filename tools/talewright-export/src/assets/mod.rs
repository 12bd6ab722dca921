//! Asset indexing, resolution and the per-export catalog.

mod catalog;
mod index;
mod resolve;

pub use catalog::{AssetCatalog, AssetProvenance, AssetRef, AssetUsage, BackgroundUsage, PortraitUsage};
pub use index::{
    is_image, relative_slash_path, sidecar_path, AssetCategory, AssetIndex, IndexedAsset,
    IMAGE_EXTENSIONS,
};
pub use resolve::{
    canonical_portrait, normalize_reference, AssetResolver, ExpressionFallback, ResolutionStep,
    ResolvedAsset,
};
