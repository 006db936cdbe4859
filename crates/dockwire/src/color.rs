//! Terminal color helpers.

use std::io::IsTerminal;
use std::sync::OnceLock;

static NO_COLOR: OnceLock<bool> = OnceLock::new();

/// Decides once per process whether output is colored.
pub fn init(no_color_flag: bool) {
    let _ = NO_COLOR.set(
        no_color_flag || std::env::var_os("NO_COLOR").is_some() || !std::io::stderr().is_terminal(),
    );
}

pub fn is_disabled() -> bool {
    NO_COLOR.get().copied().unwrap_or(true)
}

mod codes {
    pub const RESET: &str = "\x1b[0m";
    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const DIM: &str = "\x1b[90m";
    pub const BOLD: &str = "\x1b[1m";
}

fn paint(text: &str, codes: &[&str]) -> String {
    if is_disabled() {
        return text.to_string();
    }
    let mut out = codes.concat();
    out.push_str(text);
    out.push_str(codes::RESET);
    out
}

pub struct Colors;

impl Colors {
    pub fn success(text: &str) -> String {
        paint(text, &[codes::GREEN])
    }

    pub fn error(text: &str) -> String {
        paint(text, &[codes::RED])
    }

    pub fn warning(text: &str) -> String {
        paint(text, &[codes::YELLOW])
    }

    pub fn dim(text: &str) -> String {
        paint(text, &[codes::DIM])
    }

    pub fn bold(text: &str) -> String {
        paint(text, &[codes::BOLD])
    }

    /// Container and image ids.
    pub fn id(text: &str) -> String {
        paint(text, &[codes::BOLD, codes::CYAN])
    }
}
