use crate::app::App;
use crate::{exit, CoreError};
use kawariki_schema::{
    load_manifest_with, Distribution, LoadWarning, LoadedManifest, SdkVariants, SingleVariant,
    VariantSynthesizer, Version,
};
use tracing::debug;

static SINGLE: SingleVariant = SingleVariant;
static SDK: SdkVariants = SdkVariants;

/// How manifest entries of `component` become distributions.
pub fn synthesizer_for(component: &str) -> &'static dyn VariantSynthesizer {
    match component {
        "nwjs" => &SDK,
        _ => &SINGLE,
    }
}

/// The distributions of one engine component available on this host.
#[derive(Debug)]
pub struct Catalog {
    component: String,
    distributions: Vec<Distribution>,
    warnings: Vec<LoadWarning>,
}

impl Catalog {
    pub fn new(component: impl Into<String>, loaded: LoadedManifest) -> Self {
        Self {
            component: component.into(),
            distributions: loaded.distributions,
            warnings: loaded.warnings,
        }
    }

    /// Load `<root>/<component>/versions.json` for the app's platform.
    pub fn load(app: &App, component: &str) -> Result<Self, CoreError> {
        let manifest = app.manifest_path(component);
        if !manifest.is_file() {
            return Err(CoreError::exit(
                exit::UNKNOWN_COMPONENT,
                format!("unknown runtime component '{component}' (no {})", manifest.display()),
            ));
        }
        let loaded = load_manifest_with(
            &manifest,
            &app.component_dist_root(component),
            Some(app.platform()),
            synthesizer_for(component),
        )?;
        debug!(
            "{component}: {} distributions for {}",
            loaded.distributions.len(),
            app.platform()
        );
        Ok(Self::new(component, loaded))
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn distributions(&self) -> &[Distribution] {
        &self.distributions
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }

    /// The distribution whose slug or one of whose aliases is `alias`.
    pub fn find(&self, alias: &str) -> Option<&Distribution> {
        self.distributions.iter().find(|d| d.matches(alias))
    }

    /// Newest distribution within `[min, max]`, optionally SDK-only.
    ///
    /// Among equal versions installed builds win, then non-SDK builds.
    pub fn latest(
        &self,
        min: Option<&Version>,
        max: Option<&Version>,
        sdk: bool,
    ) -> Option<&Distribution> {
        self.distributions
            .iter()
            .filter(|d| min.is_none_or(|m| m <= d.version()))
            .filter(|d| max.is_none_or(|m| m >= d.version()))
            .filter(|d| !sdk || d.is_sdk())
            .max_by_key(|d| (d.version().clone(), d.available(), !d.is_sdk()))
    }

    /// Newest distribution sharing the longest prefix (up to three
    /// components) with `version`.
    pub fn closest(&self, version: &Version) -> Option<&Distribution> {
        (1..=version.len().min(3)).rev().find_map(|n| {
            let prefix = version.truncated(n);
            self.distributions
                .iter()
                .filter(|d| d.version().truncated(n) == prefix)
                .max_by_key(|d| d.version().clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kawariki_schema::{load_document, parse_manifest_str, PlatformId};
    use std::path::Path;

    fn catalog(root: &Path, manifest: &str, synth: &dyn VariantSynthesizer) -> Catalog {
        let doc = parse_manifest_str(manifest).unwrap();
        let loaded = load_document(
            &doc,
            &root.join(&doc.name),
            Some(&PlatformId::new("linux-x86_64")),
            synth,
        )
        .unwrap();
        Catalog::new(doc.name.clone(), loaded)
    }

    const NWJS: &str = r#"{
        "name": "nwjs",
        "platforms": {"linux-x86_64": "linux-x64"},
        "common": {
            "sdk": "synthesize",
            "alias": ["{version!v:2}"],
            "slug": {"sdk": "nwjs-sdk-v{version!v}-{platform}", "": "nwjs-v{version!v}-{platform}"}
        },
        "versions": [
            {"version": [0, 12, 3], "sdk": false, "alias": ["legacy"]},
            {"version": [0, 72, 0], "alias": ["0.72"]},
            {"version": [0, 80, 0], "alias": ["0.80"]}
        ]
    }"#;

    #[test]
    fn find_by_slug_or_alias() {
        let dir = tempfile::tempdir().unwrap();
        let c = catalog(dir.path(), NWJS, &SdkVariants);
        assert!(c.warnings().is_empty());
        assert_eq!(c.distributions().len(), 5);
        assert_eq!(c.find("legacy").unwrap().version_str(), "0.12.3");
        assert!(c.find("0.72-sdk").unwrap().is_sdk());
        assert!(!c.find("0.72-nosdk").unwrap().is_sdk());
        assert!(!c.find("nwjs-v0.80.0-linux-x64").unwrap().is_sdk());
        assert!(c.find("nwjs-sdk-v0.80.0-linux-x64").unwrap().is_sdk());
        assert!(c.find("0.99").is_none());
    }

    #[test]
    fn latest_prefers_installed_then_non_sdk() {
        let dir = tempfile::tempdir().unwrap();
        let c = catalog(dir.path(), NWJS, &SdkVariants);
        let latest = c.latest(None, None, false).unwrap();
        assert_eq!(latest.version_str(), "0.80.0");
        assert!(!latest.is_sdk());

        let sdk = c.latest(None, None, true).unwrap();
        assert!(sdk.is_sdk());

        let bounded = c
            .latest(Some(&Version::from([0, 13])), Some(&Version::from([0, 79])), false)
            .unwrap();
        assert_eq!(bounded.version_str(), "0.72.0");
        assert!(c.latest(Some(&Version::from([1])), None, false).is_none());
    }

    #[test]
    fn latest_prefers_installed_build_of_same_version() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{
            "name": "nwjs",
            "platforms": ["linux-x86_64"],
            "versions": [
                {"version": [0, 72, 0], "slug": "a"},
                {"version": [0, 72, 0], "slug": "b"},
                {"version": [0, 72, 0], "slug": "c"}
            ]
        }"#;
        let c = catalog(dir.path(), manifest, &SingleVariant);
        std::fs::create_dir_all(dir.path().join("nwjs").join("b")).unwrap();
        assert_eq!(c.latest(None, None, false).unwrap().slug(), "b");
    }

    #[test]
    fn closest_by_decreasing_granularity() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{
            "name": "godot",
            "platforms": ["linux-x86_64"],
            "versions": [
                {"version": [3, 4, 5]},
                {"version": [3, 5, 1]},
                {"version": [3, 5, 3]},
                {"version": [4, 2, 1]}
            ]
        }"#;
        let c = catalog(dir.path(), manifest, &SingleVariant);
        let pick = |v: &[u64]| {
            c.closest(&Version::new(v.iter().copied().map(Into::into).collect()))
                .map(Distribution::version_str)
        };
        assert_eq!(pick(&[3, 5, 1]).as_deref(), Some("3.5.1"));
        assert_eq!(pick(&[3, 5, 2]).as_deref(), Some("3.5.3"));
        assert_eq!(pick(&[3, 3, 0]).as_deref(), Some("3.5.3"));
        assert_eq!(pick(&[4, 0]).as_deref(), Some("4.2.1"));
        assert_eq!(pick(&[2, 1, 0]), None);
    }

    #[test]
    fn unknown_component_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(dir.path());
        let err = Catalog::load(&app, "mkxp").unwrap_err();
        assert_eq!(err.exit_code(), exit::UNKNOWN_COMPONENT);
    }

    #[test]
    fn synthesizer_selection() {
        let dir = tempfile::tempdir().unwrap();
        let with_sdk = catalog(dir.path(), NWJS, synthesizer_for("nwjs"));
        assert_eq!(with_sdk.distributions().len(), 5);
        assert!(with_sdk.warnings().is_empty());
        let plain = catalog(dir.path(), NWJS, synthesizer_for("renpy"));
        assert_eq!(plain.distributions().len(), 3);
        assert!(plain.warnings().is_empty());
    }
}
