//! Resolved view over one manifest entry.
//!
//! A [`Distribution`] is built from an ordered chain of lookup layers:
//!
//! 1. computed values (`dist_name`, `dist_path`, `platform_host`, and after
//!    platform resolution `platform` / `platform_name`), never interpolated;
//! 2. the entry (and any synthesized overrides in front of it);
//! 3. the entry's template chain, closest ancestor first;
//! 4. the built-in defaults for `slug`, `name`, `alias` and `strip_leading`.
//!
//! Every key is resolved once at construction into an immutable field table.

use crate::interpolate::{InterpolationError, Layer, TemplateMap};
use crate::manifest::PlatformMap;
use crate::types::{PlatformId, Slug, Version};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catch-all platform id an entry may list to run on any host.
pub const ANY_PLATFORM: &str = "any";

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error("missing platforms key in distribution")]
    MissingPlatforms,
    #[error("incompatible platform set: {}; running {platform}", supported.join(", "))]
    IncompatiblePlatform {
        platform: String,
        supported: Vec<String>,
    },
    #[error("missing version in distribution")]
    MissingVersion,
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("invalid value for '{key}': expected {expected}, got {value}")]
    InvalidField {
        key: String,
        expected: &'static str,
        value: String,
    },
}

fn defaults() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("slug".to_owned(), json!("{dist_name}-{version!v}-{platform}"));
    map.insert("name".to_owned(), json!("{dist_name} {version!v} ({platform})"));
    map.insert("alias".to_owned(), json!([]));
    map.insert("strip_leading".to_owned(), json!(true));
    map
}

/// Where distributions of one component are installed and which host they
/// are resolved for.
#[derive(Debug, Clone)]
pub struct DistributionContext {
    pub dist_root: PathBuf,
    pub host_platform: Option<PlatformId>,
    pub platform_map: Option<PlatformMap>,
}

impl DistributionContext {
    pub fn new(dist_root: impl Into<PathBuf>, host_platform: Option<PlatformId>) -> Self {
        Self {
            dist_root: dist_root.into(),
            host_platform,
            platform_map: None,
        }
    }

    #[must_use]
    pub fn with_platform_map(mut self, map: Option<PlatformMap>) -> Self {
        self.platform_map = map;
        self
    }

    pub fn dist_name(&self) -> String {
        self.dist_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The host platform translated through the platform map.
    pub fn host_dist_platform(&self) -> Option<PlatformId> {
        let host = self.host_platform.as_ref()?;
        Some(
            self.platform_map
                .as_ref()
                .and_then(|m| m.get(host))
                .unwrap_or(host)
                .clone(),
        )
    }

    fn computed(&self) -> Map<String, Value> {
        let mut computed = Map::new();
        computed.insert("dist_name".to_owned(), Value::String(self.dist_name()));
        computed.insert(
            "dist_path".to_owned(),
            Value::String(self.dist_root.to_string_lossy().into_owned()),
        );
        computed.insert(
            "platform_host".to_owned(),
            self.host_platform
                .as_ref()
                .map_or(Value::Null, |p| Value::String(p.to_string())),
        );
        computed
    }
}

/// Archive prefix-stripping policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StripLeading {
    Enabled(bool),
    Prefix(String),
}

#[derive(Debug, Clone)]
pub struct Distribution {
    fields: BTreeMap<String, Value>,
    dist_root: PathBuf,
    path: PathBuf,
    version: Version,
    slug: Slug,
    name: String,
    dist_platform: PlatformId,
    platform: String,
    aliases: Vec<String>,
    strip_leading: StripLeading,
    url: Option<String>,
    binary: Option<String>,
}

impl Distribution {
    /// Resolve a distribution from `layers` (closest first: overrides, entry,
    /// template chain). Computed values and defaults are added here.
    pub fn resolve(
        ctx: &DistributionContext,
        layers: &[&Map<String, Value>],
    ) -> Result<Self, DistributionError> {
        let mut computed = ctx.computed();
        let dist_platform = resolve_platform(ctx, &computed, layers)?;

        let platform_name = ctx
            .platform_map
            .as_ref()
            .and_then(|m| m.reverse(&dist_platform))
            .or(ctx.host_platform.as_ref())
            .unwrap_or(&dist_platform)
            .to_string();
        computed.insert("platform".to_owned(), Value::String(dist_platform.to_string()));
        computed.insert("platform_name".to_owned(), Value::String(platform_name.clone()));

        let fields = chain(computed, layers).resolve_all()?;

        let version = match fields.get("version") {
            None | Some(Value::Null) => return Err(DistributionError::MissingVersion),
            Some(v) => Version::from_value(v)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DistributionError::InvalidVersion(v.to_string()))?,
        };
        let slug = Slug::new(string_field(&fields, "slug")?);
        let name = string_field(&fields, "name")?;
        let aliases = string_list_field(&fields, "alias")?;
        let strip_leading = match fields.get("strip_leading") {
            Some(Value::Bool(b)) => StripLeading::Enabled(*b),
            Some(Value::String(s)) => StripLeading::Prefix(s.clone()),
            other => return Err(invalid("strip_leading", "a boolean or string", other)),
        };
        let url = optional_string_field(&fields, "url")?;
        let binary = optional_string_field(&fields, "binary")?;

        Ok(Self {
            path: ctx.dist_root.join(slug.as_str()),
            dist_root: ctx.dist_root.clone(),
            fields,
            version,
            slug,
            name,
            dist_platform,
            platform: platform_name,
            aliases,
            strip_leading,
            url,
            binary,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn version_str(&self) -> String {
        self.version.to_string()
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Human-facing platform name (the host platform id it maps from).
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn dist_platform(&self) -> &PlatformId {
        &self.dist_platform
    }

    pub fn strip_leading(&self) -> &StripLeading {
        &self.strip_leading
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Install directory, always `dist_root/slug`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dist_root(&self) -> &Path {
        &self.dist_root
    }

    pub fn available(&self) -> bool {
        self.path.exists()
    }

    pub fn binary(&self) -> Option<PathBuf> {
        self.binary.as_ref().map(|b| self.path.join(b))
    }

    pub fn matches(&self, alias: &str) -> bool {
        self.slug == alias || self.aliases.iter().any(|a| a == alias)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A boolean field; absent or non-boolean values read as `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(Value::Bool(true)))
    }

    pub fn is_sdk(&self) -> bool {
        self.get_bool("sdk")
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

fn chain(computed: Map<String, Value>, layers: &[&Map<String, Value>]) -> TemplateMap {
    let mut all = Vec::with_capacity(layers.len() + 2);
    all.push(Layer::literal(computed));
    all.extend(layers.iter().map(|l| Layer::new((*l).clone())));
    all.push(Layer::new(defaults()));
    TemplateMap::with_conditionals(all)
}

fn resolve_platform(
    ctx: &DistributionContext,
    computed: &Map<String, Value>,
    layers: &[&Map<String, Value>],
) -> Result<PlatformId, DistributionError> {
    let preliminary = chain(computed.clone(), layers);
    let platforms: Vec<PlatformId> = match preliminary.try_get("platforms")? {
        Some(value) => string_list(&value)
            .ok_or_else(|| invalid("platforms", "a list of strings", Some(&value)))?
            .into_iter()
            .map(PlatformId::new)
            .collect(),
        None => ctx
            .platform_map
            .as_ref()
            .map(PlatformMap::dist_platforms)
            .ok_or(DistributionError::MissingPlatforms)?,
    };
    if platforms.is_empty() {
        return Err(DistributionError::MissingPlatforms);
    }

    match ctx.host_dist_platform() {
        None => Ok(platforms[0].clone()),
        Some(p) if platforms.contains(&p) => Ok(p),
        Some(_) if platforms.iter().any(|p| p == ANY_PLATFORM) => Ok(PlatformId::new(ANY_PLATFORM)),
        Some(p) => Err(DistributionError::IncompatiblePlatform {
            platform: p.to_string(),
            supported: platforms.iter().map(ToString::to_string).collect(),
        }),
    }
}

fn invalid(key: &str, expected: &'static str, value: Option<&Value>) -> DistributionError {
    DistributionError::InvalidField {
        key: key.to_owned(),
        expected,
        value: value.map_or_else(|| "nothing".to_owned(), ToString::to_string),
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_owned))
        .collect()
}

fn string_field(fields: &BTreeMap<String, Value>, key: &str) -> Result<String, DistributionError> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(invalid(key, "a string", other)),
    }
}

fn optional_string_field(
    fields: &BTreeMap<String, Value>,
    key: &str,
) -> Result<Option<String>, DistributionError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        other => Err(invalid(key, "a string", other)),
    }
}

fn string_list_field(
    fields: &BTreeMap<String, Value>,
    key: &str,
) -> Result<Vec<String>, DistributionError> {
    let value = fields.get(key);
    value
        .and_then(string_list)
        .ok_or_else(|| invalid(key, "a list of strings", value))
}
