use std::path::PathBuf;
use tracing::info;

/// Launch defaults taken from `KAWARIKI_*` environment variables.
///
/// Command-line flags override every value here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchDefaults {
    /// `KAWARIKI_ROOT`: application root.
    pub root: Option<PathBuf>,
    /// `KAWARIKI_RUNTIME`: component used when none is given.
    pub runtime: Option<String>,
    /// `KAWARIKI_NWJS`: distribution alias for the nwjs component.
    pub nwjs: Option<String>,
    /// `KAWARIKI_SDK`: prefer SDK builds.
    pub sdk: bool,
    /// `KAWARIKI_NO_OVERLAYNS`: never use namespace overlays.
    pub no_overlayns: bool,
}

impl LaunchDefaults {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            let value = lookup(key)?;
            info!("{key}={value}");
            Some(value)
        };
        Self {
            root: read("KAWARIKI_ROOT").filter(|v| !v.is_empty()).map(PathBuf::from),
            runtime: read("KAWARIKI_RUNTIME").filter(|v| !v.is_empty()),
            nwjs: read("KAWARIKI_NWJS").filter(|v| !v.is_empty()),
            sdk: read("KAWARIKI_SDK").is_some_and(|v| env_bool(&v)),
            no_overlayns: read("KAWARIKI_NO_OVERLAYNS").is_some_and(|v| env_bool(&v)),
        }
    }
}

/// False for `""`, `0`, `false`, `no` and `n` in any case.
pub fn env_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn defaults(vars: &[(&str, &str)]) -> LaunchDefaults {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        LaunchDefaults::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn falsy_values() {
        for v in ["", "0", "false", "FALSE", "No", "n", " no "] {
            assert!(!env_bool(v), "{v:?}");
        }
        for v in ["1", "yes", "true", "on", "anything"] {
            assert!(env_bool(v), "{v:?}");
        }
    }

    #[test]
    fn unset_environment_is_default() {
        assert_eq!(defaults(&[]), LaunchDefaults::default());
    }

    #[test]
    fn reads_every_variable() {
        let d = defaults(&[
            ("KAWARIKI_ROOT", "/opt/kawariki"),
            ("KAWARIKI_RUNTIME", "nwjs"),
            ("KAWARIKI_NWJS", "0.72-sdk"),
            ("KAWARIKI_SDK", "1"),
            ("KAWARIKI_NO_OVERLAYNS", "yes"),
        ]);
        assert_eq!(d.root, Some(PathBuf::from("/opt/kawariki")));
        assert_eq!(d.runtime.as_deref(), Some("nwjs"));
        assert_eq!(d.nwjs.as_deref(), Some("0.72-sdk"));
        assert!(d.sdk);
        assert!(d.no_overlayns);
    }

    #[test]
    fn empty_strings_are_unset() {
        let d = defaults(&[("KAWARIKI_RUNTIME", ""), ("KAWARIKI_SDK", "0")]);
        assert_eq!(d.runtime, None);
        assert!(!d.sdk);
    }
}
