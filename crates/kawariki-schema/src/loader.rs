//! Turns a manifest document into the distributions that apply to one host.

use crate::distribution::{Distribution, DistributionContext, DistributionError, ANY_PLATFORM};
use crate::manifest::{parse_manifest_file, ManifestDocument, ManifestError, DEFAULT_TEMPLATE};
use crate::types::{PlatformId, Slug};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Non-fatal diagnostics collected while loading a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    PlatformUnsupported {
        manifest: String,
        platform: PlatformId,
        supported: Vec<PlatformId>,
    },
    TemplateCycle { entry: usize, template: String },
    UnknownTemplate { entry: usize, template: String },
    DuplicateSlug { slug: Slug },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlatformUnsupported {
                manifest,
                platform,
                supported,
            } => {
                let supported: Vec<&str> = supported.iter().map(PlatformId::as_str).collect();
                write!(
                    f,
                    "current platform {platform} not included in supported platforms of distribution {manifest}: {}",
                    supported.join(", ")
                )
            }
            Self::TemplateCycle { entry, template } => {
                write!(f, "template cycle at '{template}' in versions entry #{entry}")
            }
            Self::UnknownTemplate { entry, template } => {
                write!(f, "unknown template '{template}' in versions entry #{entry}")
            }
            Self::DuplicateSlug { slug } => write!(f, "duplicate distribution slug '{slug}'"),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadedManifest {
    pub distributions: Vec<Distribution>,
    pub warnings: Vec<LoadWarning>,
}

/// Strategy turning one manifest entry into one or more distributions.
pub trait VariantSynthesizer {
    fn synthesize(
        &self,
        ctx: &DistributionContext,
        entry: &Map<String, Value>,
        chain: &[&Map<String, Value>],
    ) -> Result<Vec<Distribution>, DistributionError>;
}

/// Exactly one distribution per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleVariant;

impl VariantSynthesizer for SingleVariant {
    fn synthesize(
        &self,
        ctx: &DistributionContext,
        entry: &Map<String, Value>,
        chain: &[&Map<String, Value>],
    ) -> Result<Vec<Distribution>, DistributionError> {
        let mut layers = Vec::with_capacity(chain.len() + 1);
        layers.push(entry);
        layers.extend_from_slice(chain);
        Ok(vec![Distribution::resolve(ctx, &layers)?])
    }
}

/// Splits entries marked `sdk: "synthesize"` into a plain and an SDK build.
///
/// The marker is read from the entry, else from the closest template that
/// defines `sdk`. The plain variant comes first; each variant keeps the
/// entry's aliases and adds copies suffixed `-nosdk` / `-sdk`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkVariants;

pub const SDK_SYNTHESIZE: &str = "synthesize";

impl VariantSynthesizer for SdkVariants {
    fn synthesize(
        &self,
        ctx: &DistributionContext,
        entry: &Map<String, Value>,
        chain: &[&Map<String, Value>],
    ) -> Result<Vec<Distribution>, DistributionError> {
        let marker = entry
            .get("sdk")
            .or_else(|| chain.iter().find_map(|t| t.get("sdk")));
        if marker.and_then(Value::as_str) != Some(SDK_SYNTHESIZE) {
            return SingleVariant.synthesize(ctx, entry, chain);
        }

        let aliases: Vec<&str> = entry
            .get("alias")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        [(false, "nosdk"), (true, "sdk")]
            .into_iter()
            .map(|(sdk, suffix)| {
                let mut variant_alias: Vec<String> = aliases.iter().map(|a| (*a).to_owned()).collect();
                variant_alias.extend(aliases.iter().map(|a| format!("{a}-{suffix}")));
                let mut overrides = Map::new();
                overrides.insert("sdk".to_owned(), json!(sdk));
                overrides.insert("alias".to_owned(), json!(variant_alias));

                let mut layers = Vec::with_capacity(chain.len() + 2);
                layers.push(&overrides);
                layers.push(entry);
                layers.extend_from_slice(chain);
                Distribution::resolve(ctx, &layers)
            })
            .collect()
    }
}

/// Follow `template` references from `entry`, closest first.
///
/// Missing names and cycles truncate the chain with one warning. The default
/// template is appended unless the chain already contains it.
pub fn template_chain<'a>(
    doc: &'a ManifestDocument,
    entry: &'a Map<String, Value>,
    index: usize,
    warnings: &mut Vec<LoadWarning>,
) -> Vec<&'a Map<String, Value>> {
    let mut names: Vec<&str> = Vec::new();
    let mut chain = Vec::new();
    let mut current = entry;

    while let Some(name) = current.get("template").and_then(Value::as_str) {
        if names.contains(&name) {
            warn!("template cycle at '{name}' in versions entry #{index} of {}", doc.name);
            warnings.push(LoadWarning::TemplateCycle {
                entry: index,
                template: name.to_owned(),
            });
            break;
        }
        let Some(template) = doc.template(name) else {
            warn!("unknown template '{name}' in versions entry #{index} of {}", doc.name);
            warnings.push(LoadWarning::UnknownTemplate {
                entry: index,
                template: name.to_owned(),
            });
            break;
        };
        names.push(name);
        chain.push(template);
        current = template;
    }

    if !names.contains(&DEFAULT_TEMPLATE) {
        if let Some(default) = doc.template(DEFAULT_TEMPLATE) {
            chain.push(default);
        }
    }
    chain
}

fn entry_supports(entry: &Map<String, Value>, dist_platform: &PlatformId) -> bool {
    let Some(Value::Array(platforms)) = entry.get("platforms") else {
        return true;
    };
    platforms
        .iter()
        .filter_map(Value::as_str)
        .any(|p| p == dist_platform.as_str() || p == ANY_PLATFORM)
}

/// Resolve every applicable entry of `doc` for `host_platform`.
///
/// `dist_root` is the component's install root; its base name must equal
/// the document name.
pub fn load_document(
    doc: &ManifestDocument,
    dist_root: &Path,
    host_platform: Option<&PlatformId>,
    synthesizer: &dyn VariantSynthesizer,
) -> Result<LoadedManifest, ManifestError> {
    doc.check_name(dist_root)?;

    let mut loaded = LoadedManifest::default();
    let ctx = DistributionContext::new(dist_root, host_platform.cloned())
        .with_platform_map(doc.platforms.clone());

    if let (Some(host), Some(map)) = (host_platform, &doc.platforms) {
        if !map.contains_host(host) {
            let supported: Vec<PlatformId> = map.hosts().cloned().collect();
            warn!(
                "current platform {host} not included in supported platforms of distribution {}",
                doc.name
            );
            loaded.warnings.push(LoadWarning::PlatformUnsupported {
                manifest: doc.name.clone(),
                platform: host.clone(),
                supported,
            });
            return Ok(loaded);
        }
    }

    let dist_platform = ctx.host_dist_platform();
    let mut seen: HashSet<Slug> = HashSet::new();

    for (index, entry) in doc.versions.iter().enumerate() {
        if let Some(platform) = &dist_platform {
            if !entry_supports(entry, platform) {
                debug!("skipping versions entry #{index} of {}: no {platform} build", doc.name);
                continue;
            }
        }
        let chain = template_chain(doc, entry, index, &mut loaded.warnings);
        let variants = synthesizer
            .synthesize(&ctx, entry, &chain)
            .map_err(|source| ManifestError::Entry { index, source })?;

        for dist in variants {
            if !seen.insert(dist.slug().clone()) {
                warn!("duplicate distribution slug '{}' in {}", dist.slug(), doc.name);
                loaded.warnings.push(LoadWarning::DuplicateSlug {
                    slug: dist.slug().clone(),
                });
            }
            loaded.distributions.push(dist);
        }
    }

    debug!(
        "loaded {} distributions from manifest {}",
        loaded.distributions.len(),
        doc.name
    );
    Ok(loaded)
}

pub fn load_manifest(
    path: &Path,
    dist_root: &Path,
    host_platform: Option<&PlatformId>,
) -> Result<LoadedManifest, ManifestError> {
    load_manifest_with(path, dist_root, host_platform, &SingleVariant)
}

pub fn load_manifest_with(
    path: &Path,
    dist_root: &Path,
    host_platform: Option<&PlatformId>,
    synthesizer: &dyn VariantSynthesizer,
) -> Result<LoadedManifest, ManifestError> {
    let doc = parse_manifest_file(path)?;
    load_document(&doc, dist_root, host_platform, synthesizer)
}
