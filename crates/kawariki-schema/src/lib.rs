//! Versions manifests, template interpolation and distribution resolution
//! for Kawariki.
//!
//! This crate defines the schema layer: the interpolated template map
//! (`TemplateMap`), `versions.json` parsing (`ManifestDocument`), the
//! resolved distribution view (`Distribution`), and the loader that filters
//! a manifest for the host platform and synthesizes variants
//! (`load_manifest`, `VariantSynthesizer`).

pub mod distribution;
pub mod interpolate;
pub mod loader;
pub mod manifest;
pub mod types;

pub use distribution::{
    Distribution, DistributionContext, DistributionError, StripLeading, ANY_PLATFORM,
};
pub use interpolate::{display_value, InterpolationError, Layer, TemplateMap};
pub use loader::{
    load_document, load_manifest, load_manifest_with, template_chain, LoadWarning,
    LoadedManifest, SdkVariants, SingleVariant, VariantSynthesizer,
};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, parse_manifest_value, ManifestDocument,
    ManifestError, PlatformMap, DEFAULT_TEMPLATE, MANIFEST_FILE,
};
pub use types::{PlatformId, Slug, Version, VersionPart};
