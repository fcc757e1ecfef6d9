use kawariki_runtime::{print_message, MessageKind};
use kawariki_schema::{PlatformId, MANIFEST_FILE};
use std::fmt;
use std::path::{Path, PathBuf};

pub const OVERLAY_HELPER: &str = "overlayns-static";

/// The only host the bundled overlay helper is built for.
pub const OVERLAY_HELPER_PLATFORM: &str = "linux-x86_64";

/// Graphical message channel next to the terminal.
pub trait MessageSink {
    fn show_message(&self, kind: MessageKind, title: &str, message: &str);
}

/// `<os>-<arch>` of the running host, lowercased.
pub fn host_platform() -> PlatformId {
    PlatformId::new(format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH).to_lowercase())
}

/// Application layout and user-facing reporting.
///
/// ```text
/// <root>/<component>/versions.json   manifest per engine component
/// <root>/dist/<component>/           install root of that component
/// <root>/overlayns-static            overlay helper (linux-x86_64 only)
/// ```
pub struct App {
    root: PathBuf,
    platform: PlatformId,
    overlay_helper: Option<PathBuf>,
    sink: Option<Box<dyn MessageSink>>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("root", &self.root)
            .field("platform", &self.platform)
            .field("overlay_helper", &self.overlay_helper)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl App {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_platform(root, host_platform())
    }

    pub fn with_platform(root: impl Into<PathBuf>, platform: PlatformId) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let overlay_helper =
            (platform == OVERLAY_HELPER_PLATFORM).then(|| root.join(OVERLAY_HELPER));
        Self {
            root,
            platform,
            overlay_helper,
            sink: None,
        }
    }

    pub fn set_message_sink(&mut self, sink: Box<dyn MessageSink>) {
        self.sink = Some(sink);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> &PlatformId {
        &self.platform
    }

    pub fn overlay_helper(&self) -> Option<&Path> {
        self.overlay_helper.as_deref()
    }

    pub fn dist_path(&self) -> PathBuf {
        self.root.join("dist")
    }

    pub fn component_dist_root(&self, component: &str) -> PathBuf {
        self.dist_path().join(component)
    }

    pub fn manifest_path(&self, component: &str) -> PathBuf {
        self.root.join(component).join(MANIFEST_FILE)
    }

    /// Components that ship a manifest, sorted by name.
    pub fn components(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().join(MANIFEST_FILE).is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn show_message(&self, kind: MessageKind, title: &str, message: &str) {
        print_message(kind, title, message);
        if let Some(sink) = &self.sink {
            sink.show_message(kind, title, message);
        }
    }

    pub fn show_error(&self, message: &str) {
        self.show_message(MessageKind::Error, MessageKind::Error.default_title(), message);
    }

    pub fn show_warn(&self, message: &str) {
        self.show_message(MessageKind::Warning, MessageKind::Warning.default_title(), message);
    }

    pub fn show_info(&self, message: &str) {
        self.show_message(MessageKind::Info, MessageKind::Info.default_title(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<(MessageKind, String)>>>);

    impl MessageSink for Recorder {
        fn show_message(&self, kind: MessageKind, _title: &str, message: &str) {
            self.0.borrow_mut().push((kind, message.to_owned()));
        }
    }

    #[test]
    fn layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::with_platform(dir.path(), PlatformId::new("linux-x86_64"));
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(app.dist_path(), root.join("dist"));
        assert_eq!(app.component_dist_root("nwjs"), root.join("dist/nwjs"));
        assert_eq!(app.manifest_path("nwjs"), root.join("nwjs/versions.json"));
        assert_eq!(app.overlay_helper(), Some(root.join(OVERLAY_HELPER).as_path()));
    }

    #[test]
    fn overlay_helper_only_on_linux_x86_64() {
        let dir = tempfile::tempdir().unwrap();
        for platform in ["linux-aarch64", "windows-x86_64", "macos-x86_64"] {
            let app = App::with_platform(dir.path(), PlatformId::new(platform));
            assert!(app.overlay_helper().is_none(), "{platform}");
        }
    }

    #[test]
    fn host_platform_is_lowercase() {
        let p = host_platform();
        assert_eq!(p.as_str(), p.to_lowercase());
        assert!(p.contains('-'));
    }

    #[test]
    fn components_with_manifests() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["renpy", "nwjs"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
            std::fs::write(dir.path().join(name).join(MANIFEST_FILE), "{}").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        let app = App::new(dir.path());
        assert_eq!(app.components(), ["nwjs", "renpy"]);
    }

    #[test]
    fn messages_reach_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut app = App::new(dir.path());
        app.set_message_sink(Box::new(Recorder(Rc::clone(&log))));
        app.show_error("broken");
        app.show_info("done");
        assert_eq!(
            *log.borrow(),
            [
                (MessageKind::Error, "broken".to_owned()),
                (MessageKind::Info, "done".to_owned())
            ]
        );
    }
}
