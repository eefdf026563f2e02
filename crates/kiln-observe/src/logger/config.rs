use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// Directive added on top of `level` when the agent runs with `--debug`.
const DEBUG_DIRECTIVE: &str = "kiln=debug";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Raise every `kiln.*` target to debug, whatever `level` says.
    pub debug: bool,
}

impl LoggerConfig {
    pub fn new(format: LoggerFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Filter directives handed to `EnvFilter`.
    pub fn directives(&self) -> String {
        if self.debug {
            format!("{},{DEBUG_DIRECTIVE}", self.level)
        } else {
            self.level.clone()
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        // Logs go to stderr; stdout belongs to command output.
        let use_color = std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
            debug: false,
        }
    }
}
