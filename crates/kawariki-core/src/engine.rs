use crate::app::App;
use crate::catalog::Catalog;
use crate::concurrency::interrupt_requested;
use crate::{exit, CoreError};
use kawariki_runtime::{is_executable, LaunchInfo, ProcessEnvironment};
use kawariki_schema::{Distribution, Version};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Puts a distribution's files at `Distribution::path` (download and
/// extraction live outside this crate).
pub trait Installer {
    fn install(&self, app: &App, dist: &Distribution) -> Result<(), CoreError>;
}

/// Which distribution of a component to launch with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Slug or alias.
    Alias(String),
    /// Newest within an inclusive range.
    Latest {
        min: Option<Version>,
        max: Option<Version>,
        sdk: bool,
    },
    /// Nearest to the version a game was built with.
    Closest(Version),
}

impl Default for Selector {
    fn default() -> Self {
        Self::Latest {
            min: None,
            max: None,
            sdk: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub component: String,
    pub selector: Selector,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    /// Side-car file of raw overlay directives.
    pub overlay_file: Option<PathBuf>,
    /// `(target, source)` pairs: `target` shows `source`'s bytes to the game.
    pub replacements: Vec<(PathBuf, PathBuf)>,
    pub no_overlayns: bool,
    pub dry: bool,
}

impl LaunchRequest {
    pub fn new(component: impl Into<String>, selector: Selector) -> Self {
        Self {
            component: component.into(),
            selector,
            ..Self::default()
        }
    }
}

/// A launch ready to execute.
#[derive(Debug)]
pub struct PreparedLaunch {
    pub distribution: Distribution,
    pub info: LaunchInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The command line that would have run.
    DryRun(String),
    /// Exit status of the supervised game process.
    Exited(i32),
}

/// Central orchestration for launching a game against a distribution.
///
/// Loads the component manifest, selects and installs a distribution,
/// verifies its binary, stages file replacements and runs the result.
pub struct Engine<'a> {
    app: &'a App,
    installer: Option<&'a dyn Installer>,
}

impl<'a> Engine<'a> {
    pub fn new(app: &'a App) -> Self {
        Self {
            app,
            installer: None,
        }
    }

    #[must_use]
    pub fn with_installer(mut self, installer: &'a dyn Installer) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn app(&self) -> &App {
        self.app
    }

    /// Load a component's catalog, reporting manifest warnings.
    pub fn catalog(&self, component: &str) -> Result<Catalog, CoreError> {
        let catalog = Catalog::load(self.app, component)?;
        for warning in catalog.warnings() {
            self.app.show_warn(&warning.to_string());
        }
        Ok(catalog)
    }

    pub fn select<'c>(
        &self,
        catalog: &'c Catalog,
        selector: &Selector,
    ) -> Result<&'c Distribution, CoreError> {
        let component = catalog.component();
        match selector {
            Selector::Alias(alias) => catalog.find(alias).ok_or_else(|| {
                CoreError::exit(
                    exit::UNKNOWN_DISTRIBUTION,
                    format!("unknown {component} distribution '{alias}'"),
                )
            }),
            Selector::Latest { min, max, sdk } => catalog
                .latest(min.as_ref(), max.as_ref(), *sdk)
                .ok_or_else(|| {
                    CoreError::exit(
                        exit::NO_SUITABLE_DISTRIBUTION,
                        format!(
                            "no suitable {component} distribution for {} ({})",
                            self.app.platform(),
                            describe_range(min.as_ref(), max.as_ref(), *sdk)
                        ),
                    )
                }),
            Selector::Closest(version) => catalog.closest(version).ok_or_else(|| {
                CoreError::exit(
                    exit::NO_COMPATIBLE_VERSION,
                    format!("no {component} distribution available for version {version}"),
                )
            }),
        }
    }

    /// Install `dist` unless it is already on disk.
    pub fn ensure_installed(&self, dist: &Distribution) -> Result<(), CoreError> {
        if dist.available() {
            return Ok(());
        }
        let Some(installer) = self.installer else {
            return Err(CoreError::exit(
                exit::INSTALL_FAILED,
                format!(
                    "distribution '{}' is not installed at {}",
                    dist.name(),
                    dist.path().display()
                ),
            ));
        };
        info!("installing distribution '{}'", dist.slug());
        installer.install(self.app, dist).map_err(|e| {
            CoreError::exit(
                exit::INSTALL_FAILED,
                format!("failed to install distribution '{}': {e}", dist.name()),
            )
        })?;
        self.app
            .show_info(&format!("Finished downloading distribution '{}'", dist.name()));
        Ok(())
    }

    /// The distribution's binary, which must exist and be executable.
    pub fn binary(&self, dist: &Distribution) -> Result<PathBuf, CoreError> {
        let binary = dist.binary().ok_or_else(|| {
            CoreError::exit(
                exit::NO_SUITABLE_DISTRIBUTION,
                format!("distribution '{}' does not declare a binary", dist.name()),
            )
        })?;
        if !is_executable(&binary) {
            return Err(CoreError::exit(
                exit::NO_SUITABLE_DISTRIBUTION,
                format!(
                    "broken distribution '{}': {} is missing or not executable",
                    dist.name(),
                    binary.display()
                ),
            ));
        }
        Ok(binary)
    }

    fn overlay_helper(&self, disabled: bool) -> Option<PathBuf> {
        if disabled {
            debug!("namespace overlays disabled");
            return None;
        }
        let helper = self.app.overlay_helper()?;
        if is_executable(helper) {
            Some(helper.to_path_buf())
        } else {
            debug!("overlay helper {} not usable", helper.display());
            None
        }
    }

    pub fn prepare_launch(&self, request: &LaunchRequest) -> Result<PreparedLaunch, CoreError> {
        let catalog = self.catalog(&request.component)?;
        let dist = self.select(&catalog, &request.selector)?.clone();
        info!("selected distribution '{}'", dist.name());
        self.ensure_installed(&dist)?;
        let binary = self.binary(&dist)?;

        let mut env = ProcessEnvironment::new(self.overlay_helper(request.no_overlayns));
        if let Some(dir) = &request.working_dir {
            env.set_working_dir(dir);
        }
        if let Some(file) = &request.overlay_file {
            env.add_overlays_from_file(file)
                .map_err(|e| patch_failed(file, &e))?;
        }
        for (target, source) in &request.replacements {
            env.replace_file_from(target, source)
                .map_err(|e| patch_failed(target, &e))?;
        }

        let mut argv = vec![binary.into_os_string()];
        argv.extend(request.args.iter().cloned());
        Ok(PreparedLaunch {
            distribution: dist,
            info: LaunchInfo::new(env, argv),
        })
    }

    /// Prepare and run a launch. Without cleanups pending the game replaces
    /// this process and the call only returns on failure.
    ///
    /// An interrupt received while preparing aborts before the game starts.
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, CoreError> {
        let PreparedLaunch { mut info, .. } = self.prepare_launch(request)?;
        if interrupt_requested() {
            info.env.cleanup()?;
            return Err(CoreError::exit(
                exit::INTERRUPTED,
                "interrupted before the game was started",
            ));
        }
        if request.dry {
            let line = info.command_line()?;
            info.env.cleanup()?;
            return Ok(LaunchOutcome::DryRun(line));
        }
        let code = info.exec()?;
        if interrupt_requested() {
            warn!("launch interrupted; game exited with status {code}");
        }
        Ok(LaunchOutcome::Exited(code))
    }
}

fn patch_failed(path: &Path, err: &kawariki_runtime::RuntimeError) -> CoreError {
    CoreError::exit(
        exit::PATCH_FAILED,
        format!("failed to stage {}: {err}", path.display()),
    )
}

fn describe_range(min: Option<&Version>, max: Option<&Version>, sdk: bool) -> String {
    let mut parts = Vec::new();
    if let Some(min) = min {
        parts.push(format!(">= {min}"));
    }
    if let Some(max) = max {
        parts.push(format!("<= {max}"));
    }
    if sdk {
        parts.push("sdk".to_owned());
    }
    if parts.is_empty() {
        "any version".to_owned()
    } else {
        parts.join(", ")
    }
}
