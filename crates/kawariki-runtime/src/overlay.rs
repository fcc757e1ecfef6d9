//! Scoped file replacement for the launched process.
//!
//! With an overlay helper the patched content goes to a scratch file that is
//! bind-mounted over the target inside the child's mount namespace, and the
//! original is never touched. Without one, the original is renamed to a
//! sibling backup and moved back at cleanup.

use crate::environment::ProcessEnvironment;
use crate::RuntimeError;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BACKUP_MARKER: &str = ".kawariki-backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Start from an empty file.
    Overwrite,
    /// Start from the current content of the target.
    Append,
}

fn stem_and_suffix(path: &Path) -> (OsString, OsString) {
    let stem = path.file_stem().map(OsStr::to_os_string).unwrap_or_default();
    let mut suffix = OsString::new();
    if let Some(ext) = path.extension() {
        suffix.push(".");
        suffix.push(ext);
    }
    (stem, suffix)
}

/// `<dir>/<stem>.kawariki-backup<suffix>` for `<dir>/<stem><suffix>`.
pub fn backup_path(path: &Path) -> PathBuf {
    let (mut name, suffix) = stem_and_suffix(path);
    name.push(BACKUP_MARKER);
    name.push(suffix);
    path.with_file_name(name)
}

impl ProcessEnvironment {
    /// Let `write` produce the content `path` has for the launched process.
    ///
    /// The fallback strategy is not reentrant: a second replacement of the
    /// same path before cleanup fails with `BackupAlreadyExists`.
    pub fn with_replaced_file<F>(
        &mut self,
        path: &Path,
        mode: ReplaceMode,
        write: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        if path.exists() {
            if self.overlays_enabled() {
                return self.replace_with_overlay(path, mode, write);
            }
            let backup = backup_path(path);
            if backup.exists() {
                return Err(RuntimeError::BackupAlreadyExists(backup));
            }
            info!(
                "overwriting {} (preserved as {}, will restore after session)",
                path.display(),
                backup.display()
            );
            fs::rename(path, &backup)?;
            let (from, to) = (backup.clone(), path.to_path_buf());
            self.defer_cleanup(move || fs::rename(&from, &to).map_err(RuntimeError::from));
            if mode == ReplaceMode::Append {
                fs::copy(&backup, path)?;
            }
        } else {
            debug!("creating {} for this session", path.display());
            let created = path.to_path_buf();
            self.defer_cleanup(move || match fs::remove_file(&created) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            });
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(mode == ReplaceMode::Append)
            .truncate(mode == ReplaceMode::Overwrite)
            .open(path)?;
        write(&mut file)?;
        file.flush()?;
        Ok(())
    }

    fn replace_with_overlay<F>(
        &mut self,
        path: &Path,
        mode: ReplaceMode,
        write: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let (stem, suffix) = stem_and_suffix(path);
        let (mut file, patched) = self.temp_file(stem, suffix)?;
        if mode == ReplaceMode::Append {
            io::copy(&mut File::open(path)?, &mut file)?;
        }
        write(&mut file)?;
        file.flush()?;
        drop(file);
        self.bind_overlay(&patched, path)
    }

    /// Replace `target` with the bytes of `source` for the launched process.
    pub fn replace_file_from(&mut self, target: &Path, source: &Path) -> Result<(), RuntimeError> {
        let mut input = File::open(source)?;
        self.with_replaced_file(target, ReplaceMode::Overwrite, |out| {
            io::copy(&mut input, out).map(drop)
        })
    }

    /// Queue every non-blank line of `path` as a raw overlay directive.
    pub fn add_overlays_from_file(&mut self, path: &Path) -> Result<usize, RuntimeError> {
        let content = fs::read_to_string(path)?;
        let mut added = 0;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.add_overlay_directive(line);
            added += 1;
        }
        debug!("added {added} overlay directives from {}", path.display());
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELPER: &str = "/opt/kawariki/overlayns-static";

    fn env(helper: bool) -> ProcessEnvironment {
        ProcessEnvironment::with_vars(helper.then(|| PathBuf::from(HELPER)), Vec::new())
    }

    #[test]
    fn backup_path_keeps_suffix() {
        assert_eq!(
            backup_path(Path::new("/game/www/js/main.js")),
            Path::new("/game/www/js/main.kawariki-backup.js")
        );
        assert_eq!(
            backup_path(Path::new("/game/package.nw.tar")),
            Path::new("/game/package.nw.kawariki-backup.tar")
        );
        assert_eq!(
            backup_path(Path::new("/game/.env")),
            Path::new("/game/.env.kawariki-backup")
        );
    }

    #[test]
    fn overlay_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("package.json");
        fs::write(&target, b"original").unwrap();

        let mut e = env(true);
        e.with_replaced_file(&target, ReplaceMode::Overwrite, |f| f.write_all(b"X"))
            .unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert_eq!(e.overlays().len(), 1);
        let directive = e.overlays()[0].to_str().unwrap();
        let patched = directive
            .strip_prefix("bind,")
            .and_then(|d| d.strip_suffix(&format!(",{}", target.display())))
            .unwrap();
        assert_eq!(fs::read(patched).unwrap(), b"X");
        let name = Path::new(patched).file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("package") && name.ends_with(".json"));
        e.cleanup().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn overlay_keeps_non_utf8_file_names() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        // "テスト.js" in Shift-JIS
        let target = dir.path().join(OsStr::from_bytes(b"\x83e\x83X\x83g.js"));
        fs::write(&target, b"original").unwrap();

        let mut e = env(true);
        e.with_replaced_file(&target, ReplaceMode::Overwrite, |f| f.write_all(b"X"))
            .unwrap();

        let directive = e.overlays()[0].as_bytes();
        let mut tail = b",".to_vec();
        tail.extend_from_slice(target.as_os_str().as_bytes());
        let patched = directive
            .strip_prefix(b"bind,")
            .and_then(|d| d.strip_suffix(tail.as_slice()))
            .map(|p| Path::new(OsStr::from_bytes(p)).to_path_buf())
            .unwrap();
        assert_eq!(fs::read(&patched).unwrap(), b"X");
        assert_eq!(fs::read(&target).unwrap(), b"original");
        let name = patched.file_name().unwrap().as_bytes();
        assert!(name.starts_with(b"\x83e\x83X\x83g"));
        assert!(name.ends_with(b".js"));
        e.cleanup().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn backup_path_keeps_non_utf8_stem() {
        use std::os::unix::ffi::OsStrExt;

        let target = Path::new(OsStr::from_bytes(b"/game/\x83e.js"));
        assert_eq!(
            backup_path(target).as_os_str().as_bytes(),
            b"/game/\x83e.kawariki-backup.js"
        );
    }

    #[test]
    fn overlay_append_seeds_with_original() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index.html");
        fs::write(&target, b"<html>").unwrap();

        let mut e = env(true);
        e.with_replaced_file(&target, ReplaceMode::Append, |f| f.write_all(b"<script>"))
            .unwrap();
        let patched = e.overlays()[0]
            .to_str()
            .unwrap()
            .split(',')
            .nth(1)
            .unwrap()
            .to_owned();
        assert_eq!(fs::read(patched).unwrap(), b"<html><script>");
        assert_eq!(fs::read(&target).unwrap(), b"<html>");
        e.cleanup().unwrap();
    }

    #[test]
    fn fallback_restores_original_in_both_modes() {
        for mode in [ReplaceMode::Overwrite, ReplaceMode::Append] {
            let dir = tempfile::tempdir().unwrap();
            let target = dir.path().join("main.js");
            fs::write(&target, b"original bytes").unwrap();

            let mut e = env(false);
            e.with_replaced_file(&target, mode, |f| f.write_all(b"+patch"))
                .unwrap();
            let expected: &[u8] = match mode {
                ReplaceMode::Overwrite => b"+patch",
                ReplaceMode::Append => b"original bytes+patch",
            };
            assert_eq!(fs::read(&target).unwrap(), expected);
            assert!(backup_path(&target).exists());

            e.cleanup().unwrap();
            assert_eq!(fs::read(&target).unwrap(), b"original bytes");
            assert!(!backup_path(&target).exists());
        }
    }

    #[test]
    fn fallback_is_not_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("main.js");
        fs::write(&target, b"original").unwrap();

        let mut e = env(false);
        e.with_replaced_file(&target, ReplaceMode::Overwrite, |f| f.write_all(b"1"))
            .unwrap();
        assert!(matches!(
            e.with_replaced_file(&target, ReplaceMode::Overwrite, |f| f.write_all(b"2")),
            Err(RuntimeError::BackupAlreadyExists(_))
        ));
        e.cleanup().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn new_file_is_removed_at_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("kawariki-inject.js");

        let mut e = env(true);
        e.with_replaced_file(&target, ReplaceMode::Overwrite, |f| f.write_all(b"inject"))
            .unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"inject");
        assert!(e.overlays().is_empty());
        e.cleanup().unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn failed_writer_still_restores() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("main.js");
        fs::write(&target, b"original").unwrap();

        let mut e = env(false);
        let result = e.with_replaced_file(&target, ReplaceMode::Overwrite, |_| {
            Err(io::Error::other("patch failed"))
        });
        assert!(matches!(result, Err(RuntimeError::Io(_))));
        e.cleanup().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn replace_file_from_copies_source() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib").join("libffmpeg.so");
        let source = dir.path().join("libffmpeg-full.so");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"stub").unwrap();
        fs::write(&source, b"full codec set").unwrap();

        let mut e = env(false);
        e.replace_file_from(&target, &source).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"full codec set");
        e.cleanup().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"stub");
    }

    #[test]
    fn overlays_from_file_are_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("overlays.txt");
        fs::write(&sidecar, "bind,/a,/b\n\n  bind,/c,/d  \n").unwrap();

        let mut e = env(true);
        assert_eq!(e.add_overlays_from_file(&sidecar).unwrap(), 2);
        assert_eq!(e.overlays(), ["bind,/a,/b", "bind,/c,/d"]);
    }
}
