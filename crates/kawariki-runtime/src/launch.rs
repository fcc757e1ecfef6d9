use crate::environment::ProcessEnvironment;
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use tracing::{info, warn};

/// Final argv, environment and working directory of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub argv: Vec<OsString>,
    pub env: BTreeMap<OsString, OsString>,
    pub working_dir: Option<PathBuf>,
}

impl PreparedCommand {
    /// Shell-quoted argv for display.
    pub fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|a| shell_quote(&a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Result<Command, RuntimeError> {
        let (program, args) = self.argv.split_first().ok_or(RuntimeError::EmptyArgv)?;
        let mut cmd = Command::new(program);
        cmd.args(args).env_clear().envs(&self.env);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    fn log(&self) {
        let dir = self
            .working_dir
            .as_ref()
            .map_or_else(|| ".".to_owned(), |d| d.display().to_string());
        info!("executing [{}] in '{dir}'", self.command_line());
    }

    /// Spawn the command and wait for it.
    pub fn run(&self) -> Result<i32, RuntimeError> {
        let mut cmd = self.command()?;
        self.log();
        let status = cmd.status().map_err(|e| {
            RuntimeError::ExecFailed(format!(
                "failed to spawn {}: {e}",
                cmd.get_program().to_string_lossy()
            ))
        })?;
        Ok(exit_code(status))
    }
}

/// Map a child's exit status to a shell-style exit code.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Shell-quote a string for display; safe words are left bare.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.to_owned()
    } else {
        // POSIX single quotes: replace ' with '\'' then wrap in '
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

fn env_assignment(arg: &OsStr) -> Option<(&str, &str)> {
    let (key, value) = arg.to_str()?.split_once('=')?;
    let mut chars = key.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((key, value))
}

/// A command line bound to the environment it runs in.
#[derive(Debug)]
pub struct LaunchInfo {
    pub env: ProcessEnvironment,
    argv: Vec<OsString>,
}

impl LaunchInfo {
    pub fn new<I, S>(env: ProcessEnvironment, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            env,
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    pub fn push_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
    }

    /// Build the final argv and environment.
    ///
    /// Leading `KEY=VALUE` arguments move into the environment, prepended
    /// arguments go in front, and queued overlays wrap everything in an
    /// overlay helper invocation.
    pub fn prepare(&self) -> Result<PreparedCommand, RuntimeError> {
        let mut env = self.env.vars().clone();
        let mut rest = self.argv.as_slice();
        while let Some((first, tail)) = rest.split_first() {
            let Some((key, value)) = env_assignment(first) else {
                break;
            };
            env.insert(key.into(), value.into());
            rest = tail;
        }

        let mut argv: Vec<OsString> = self.env.argv_prepend().to_vec();
        argv.extend_from_slice(rest);
        if argv.is_empty() {
            return Err(RuntimeError::EmptyArgv);
        }

        if !self.env.overlays().is_empty() {
            let helper = self
                .env
                .overlay_helper()
                .ok_or(RuntimeError::OverlayUnavailable)?;
            let mut wrapped = vec![helper.as_os_str().to_owned()];
            for directive in self.env.overlays() {
                wrapped.push("-m".into());
                wrapped.push(directive.clone());
            }
            wrapped.push("--".into());
            wrapped.extend(argv);
            argv = wrapped;
        }

        Ok(PreparedCommand {
            argv,
            env,
            working_dir: self.env.working_dir().map(PathBuf::from),
        })
    }

    pub fn command_line(&self) -> Result<String, RuntimeError> {
        Ok(self.prepare()?.command_line())
    }

    /// Spawn, wait, and always clean up. Returns the child's exit code.
    pub fn call(mut self) -> Result<i32, RuntimeError> {
        let result = self.prepare().and_then(|cmd| cmd.run());
        match (result, self.env.cleanup()) {
            (Ok(code), Ok(())) => Ok(code),
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!("{cleanup}");
                Err(e)
            }
        }
    }

    /// Run the command.
    ///
    /// With no pending cleanups the current process image is replaced and
    /// this only returns on failure. Otherwise the command is supervised
    /// through [`call`](Self::call).
    pub fn exec(self) -> Result<i32, RuntimeError> {
        if self.env.has_pending_cleanups() {
            return self.call();
        }
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        self.replace_process()
    }

    #[cfg(unix)]
    fn replace_process(self) -> Result<i32, RuntimeError> {
        use std::os::unix::process::CommandExt;

        let prepared = self.prepare()?;
        let mut cmd = prepared.command()?;
        prepared.log();
        let err = cmd.exec();
        Err(RuntimeError::ExecFailed(format!(
            "failed to execute {}: {err}",
            cmd.get_program().to_string_lossy()
        )))
    }

    #[cfg(not(unix))]
    fn replace_process(self) -> Result<i32, RuntimeError> {
        self.call()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn env(helper: Option<&str>) -> ProcessEnvironment {
        ProcessEnvironment::with_vars(
            helper.map(PathBuf::from),
            [(OsString::from("PATH"), OsString::from("/usr/bin:/bin"))],
        )
    }

    fn strings(argv: &[OsString]) -> Vec<String> {
        argv.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("hello"), "hello");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(shell_quote("/games/My Game/nw"), "'/games/My Game/nw'");
    }

    #[test]
    fn prepare_strips_leading_assignments() {
        let info = LaunchInfo::new(
            env(None),
            ["LANG=ja_JP.UTF-8", "WINEDEBUG=-all", "./Game", "--flag=1", "X=y"],
        );
        let cmd = info.prepare().unwrap();
        assert_eq!(strings(&cmd.argv), ["./Game", "--flag=1", "X=y"]);
        assert_eq!(cmd.env.get(OsStr::new("LANG")).unwrap(), "ja_JP.UTF-8");
        assert_eq!(cmd.env.get(OsStr::new("WINEDEBUG")).unwrap(), "-all");
        assert!(!cmd.env.contains_key(OsStr::new("X")));
    }

    #[test]
    fn prepare_keeps_non_identifier_assignments() {
        let info = LaunchInfo::new(env(None), ["--opt=1", "game"]);
        let cmd = info.prepare().unwrap();
        assert_eq!(strings(&cmd.argv), ["--opt=1", "game"]);
    }

    #[test]
    fn prepare_rejects_empty_argv() {
        let info = LaunchInfo::new(env(None), ["ONLY=assignments"]);
        assert!(matches!(info.prepare(), Err(RuntimeError::EmptyArgv)));
    }

    #[test]
    fn run_rejects_empty_argv() {
        let cmd = PreparedCommand {
            argv: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        };
        assert!(matches!(cmd.run(), Err(RuntimeError::EmptyArgv)));
    }

    #[test]
    fn prepare_prepends_argv() {
        let mut e = env(None);
        e.prepend_argv(["/dist/nwjs/nw", "--nwapp"]);
        let info = LaunchInfo::new(e, ["LC_ALL=C", "/games/g"]);
        let cmd = info.prepare().unwrap();
        assert_eq!(strings(&cmd.argv), ["/dist/nwjs/nw", "--nwapp", "/games/g"]);
    }

    #[test]
    fn prepare_wraps_overlays() {
        let mut e = env(Some("/app/overlayns-static"));
        e.bind_overlay(Path::new("/tmp/k/a.js"), Path::new("/game/a.js"))
            .unwrap();
        e.add_overlay_directive("bind,/tmp/k/b,/game/b");
        e.set_working_dir("/game");
        let info = LaunchInfo::new(e, ["/game/Game", "arg"]);
        let cmd = info.prepare().unwrap();
        assert_eq!(
            strings(&cmd.argv),
            [
                "/app/overlayns-static",
                "-m",
                "bind,/tmp/k/a.js,/game/a.js",
                "-m",
                "bind,/tmp/k/b,/game/b",
                "--",
                "/game/Game",
                "arg"
            ]
        );
        assert_eq!(cmd.working_dir.as_deref(), Some(Path::new("/game")));
    }

    #[test]
    fn raw_overlays_need_a_helper() {
        let mut e = env(None);
        e.add_overlay_directive("bind,/a,/b");
        let info = LaunchInfo::new(e, ["game"]);
        assert!(matches!(
            info.prepare(),
            Err(RuntimeError::OverlayUnavailable)
        ));
    }

    #[test]
    fn command_line_is_quoted() {
        let info = LaunchInfo::new(env(None), ["/games/My Game/nw", "it's"]);
        assert_eq!(
            info.command_line().unwrap(),
            "'/games/My Game/nw' 'it'\\''s'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn call_propagates_exit_code_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("restored");
        let mut e = env(None);
        let m = marker.clone();
        e.defer_cleanup(move || std::fs::write(&m, b"done").map_err(RuntimeError::from));
        e.set_var("KAWARIKI_TEST_CODE", "7");
        let info = LaunchInfo::new(e, ["/bin/sh", "-c", "exit $KAWARIKI_TEST_CODE"]);
        assert_eq!(info.call().unwrap(), 7);
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn call_cleans_up_when_spawn_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("restored");
        let mut e = env(None);
        let m = marker.clone();
        e.defer_cleanup(move || std::fs::write(&m, b"done").map_err(RuntimeError::from));
        let info = LaunchInfo::new(e, [dir.path().join("missing-binary")]);
        assert!(matches!(info.call(), Err(RuntimeError::ExecFailed(_))));
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn exec_with_cleanups_is_supervised() {
        let mut e = env(None);
        e.defer_cleanup(|| Ok(()));
        let info = LaunchInfo::new(e, ["/bin/sh", "-c", "kill -TERM $$"]);
        assert_eq!(info.exec().unwrap(), 128 + libc::SIGTERM);
    }
}
