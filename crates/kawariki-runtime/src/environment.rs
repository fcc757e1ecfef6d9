use crate::{CleanupErrors, RuntimeError};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type CleanupFn = Box<dyn FnOnce() -> Result<(), RuntimeError>>;

const SCRATCH_PREFIX: &str = "kawariki-";

/// Resources collected for one launch attempt.
///
/// Owns the cleanup stack, the lazily created scratch directory, a copy of
/// the environment table, the working directory and the queued overlay
/// directives. Dropping an environment with pending cleanups runs them
/// best-effort and logs a warning.
pub struct ProcessEnvironment {
    overlay_helper: Option<PathBuf>,
    argv_prepend: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
    working_dir: Option<PathBuf>,
    overlays: Vec<OsString>,
    cleanups: Vec<CleanupFn>,
    scratch: Option<PathBuf>,
}

impl fmt::Debug for ProcessEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEnvironment")
            .field("overlay_helper", &self.overlay_helper)
            .field("argv_prepend", &self.argv_prepend)
            .field("working_dir", &self.working_dir)
            .field("overlays", &self.overlays)
            .field("pending_cleanups", &self.cleanups.len())
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

impl ProcessEnvironment {
    /// Start from the current process environment. `overlay_helper` is the
    /// namespace overlay binary, or `None` to use the rename fallback.
    pub fn new(overlay_helper: Option<PathBuf>) -> Self {
        Self::with_vars(overlay_helper, std::env::vars_os())
    }

    pub fn with_vars<I>(overlay_helper: Option<PathBuf>, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self {
            overlay_helper,
            argv_prepend: Vec::new(),
            env: vars.into_iter().collect(),
            working_dir: None,
            overlays: Vec::new(),
            cleanups: Vec::new(),
            scratch: None,
        }
    }

    pub fn overlay_helper(&self) -> Option<&Path> {
        self.overlay_helper.as_deref()
    }

    pub fn overlays_enabled(&self) -> bool {
        self.overlay_helper.is_some()
    }

    pub fn prepend_argv<I, S>(&mut self, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv_prepend.extend(parts.into_iter().map(Into::into));
    }

    pub fn argv_prepend(&self) -> &[OsString] {
        &self.argv_prepend
    }

    pub fn set_var(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn remove_var(&mut self, key: impl AsRef<OsStr>) {
        self.env.remove(key.as_ref());
    }

    pub fn var(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.env.get(key.as_ref()).map(OsString::as_os_str)
    }

    pub fn vars(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = Some(dir.into());
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    // Overlays

    /// Queue a bind of `src` over `dst` inside the launched process.
    pub fn bind_overlay(&mut self, src: &Path, dst: &Path) -> Result<(), RuntimeError> {
        if let Some(p) = [src, dst].into_iter().find(|p| contains_comma(p.as_os_str())) {
            return Err(RuntimeError::ReservedDelimiter(p.to_path_buf()));
        }
        if self.overlay_helper.is_none() {
            return Err(RuntimeError::OverlayUnavailable);
        }
        debug!("overlay bind {} -> {}", src.display(), dst.display());
        let mut directive = OsString::from("bind,");
        directive.push(src);
        directive.push(",");
        directive.push(dst);
        self.overlays.push(directive);
        Ok(())
    }

    /// Queue a raw overlay helper directive (`bind,<src>,<dst>`).
    pub fn add_overlay_directive(&mut self, directive: impl Into<OsString>) {
        self.overlays.push(directive.into());
    }

    pub fn overlays(&self) -> &[OsString] {
        &self.overlays
    }

    // Scratch space

    /// The session directory, created on first use and removed at cleanup.
    pub fn scratch_dir(&mut self) -> Result<PathBuf, RuntimeError> {
        if let Some(dir) = &self.scratch {
            return Ok(dir.clone());
        }
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()?
            .keep();
        info!("created temporary directory: {}", dir.display());
        let remove = dir.clone();
        self.defer_cleanup(move || fs::remove_dir_all(&remove).map_err(RuntimeError::from));
        self.scratch = Some(dir.clone());
        Ok(dir)
    }

    /// Create a directory inside the session directory.
    pub fn temp_dir(
        &mut self,
        prefix: impl AsRef<OsStr>,
        suffix: impl AsRef<OsStr>,
    ) -> Result<PathBuf, RuntimeError> {
        let scratch = self.scratch_dir()?;
        Ok(tempfile::Builder::new()
            .prefix(prefix.as_ref())
            .suffix(suffix.as_ref())
            .tempdir_in(scratch)?
            .keep())
    }

    /// Create a file inside the session directory, open for writing.
    pub fn temp_file(
        &mut self,
        prefix: impl AsRef<OsStr>,
        suffix: impl AsRef<OsStr>,
    ) -> Result<(File, PathBuf), RuntimeError> {
        let scratch = self.scratch_dir()?;
        let file = tempfile::Builder::new()
            .prefix(prefix.as_ref())
            .suffix(suffix.as_ref())
            .tempfile_in(scratch)?;
        file.keep().map_err(|e| RuntimeError::Io(e.into()))
    }

    // Cleanup

    /// Run `f` at cleanup time. Cleanups run in reverse registration order.
    pub fn defer_cleanup<F>(&mut self, f: F)
    where
        F: FnOnce() -> Result<(), RuntimeError> + 'static,
    {
        self.cleanups.push(Box::new(f));
    }

    pub fn has_pending_cleanups(&self) -> bool {
        !self.cleanups.is_empty()
    }

    /// Run and clear every pending cleanup.
    ///
    /// A failing cleanup does not stop the others; all failures are returned
    /// together as `RuntimeError::Cleanup`.
    pub fn cleanup(&mut self) -> Result<(), RuntimeError> {
        let mut errors = Vec::new();
        while let Some(f) = self.cleanups.pop() {
            if let Err(e) = f() {
                warn!("cleanup failed: {e}");
                errors.push(e);
            }
        }
        self.scratch = None;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::Cleanup(CleanupErrors(errors)))
        }
    }
}

#[cfg(unix)]
fn contains_comma(s: &OsStr) -> bool {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().contains(&b',')
}

#[cfg(not(unix))]
fn contains_comma(s: &OsStr) -> bool {
    s.to_string_lossy().contains(',')
}

impl Drop for ProcessEnvironment {
    fn drop(&mut self) {
        if self.cleanups.is_empty() {
            return;
        }
        warn!(
            "process environment dropped with {} pending cleanups; cleaning up now",
            self.cleanups.len()
        );
        if let Err(e) = self.cleanup() {
            warn!("{e}");
        }
    }
}
