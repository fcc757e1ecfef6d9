use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
    Info,
}

impl MessageKind {
    fn color(self) -> u8 {
        match self {
            Self::Error => 31,
            Self::Warning => 36,
            Self::Info => 34,
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            Self::Error => "Kawariki Runtime Error",
            Self::Warning => "Kawariki Runtime Warning",
            Self::Info => "Kawariki Runtime",
        }
    }
}

/// Title line followed by the tab-indented message lines.
pub fn format_message(kind: MessageKind, title: &str, message: &str, color: bool) -> String {
    let mut out = if color {
        format!("\x1b[{}m{title}\x1b[0m:\n", kind.color())
    } else {
        format!("{title}:\n")
    };
    for line in message.lines() {
        out.push('\t');
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub fn print_message(kind: MessageKind, title: &str, message: &str) {
    let text = format_message(kind, title, message, is_interactive_terminal());
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(text.as_bytes());
    let _ = stderr.flush();
}

#[allow(unsafe_code)]
pub fn is_interactive_terminal() -> bool {
    // SAFETY: isatty() only inspects the descriptor and has no side effects.
    unsafe { libc::isatty(libc::STDERR_FILENO) != 0 }
}
