//! Logging infrastructure for debsh
//!
//! Structured logging through `tracing` (feature `logging`), with redaction
//! so credentials never reach a log sink.
//!
//! # Log Levels
//!
//! - **WARN**: rolled-back identity transactions
//! - **INFO**: identity mutations, logins, user switches
//! - **DEBUG**: dispatched commands (name and argument count), assignments
//!
//! # Security
//!
//! - Lines typed while a password prompt is pending are never logged.
//! - Values of variables with secret-looking names are redacted.
//! - Logged command lines are escaped against log injection.

use std::borrow::Cow;
use std::collections::HashSet;

/// Configuration for logging behavior.
///
/// By default sensitive data is redacted. Add names with
/// [`redact_var`](LogConfig::redact_var).
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact sensitive data from logs (default: true)
    pub redact_sensitive: bool,

    /// Variable name fragments to redact (case-insensitive)
    pub redact_var_names: HashSet<String>,

    /// Whether to include command line text in logs (default: false)
    pub log_command_lines: bool,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        let redact_var_names = [
            "PASSWORD",
            "PASSWD",
            "SECRET",
            "TOKEN",
            "KEY",
            "CREDENTIAL",
            "AUTH",
            "PRIVATE",
            "SESSION",
            "COOKIE",
            "SHADOW",
            "HASH",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect();

        Self {
            redact_sensitive: true,
            redact_var_names,
            log_command_lines: false,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable redaction (debugging only: may expose secrets).
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Add a variable name fragment to redact
    pub fn redact_var(mut self, pattern: &str) -> Self {
        self.redact_var_names.insert(pattern.to_uppercase());
        self
    }

    /// Include command line text in logs (may log secrets typed as arguments).
    pub fn unsafe_log_commands(mut self) -> Self {
        self.log_command_lines = true;
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Check if a variable name should be redacted
    pub fn should_redact_var(&self, name: &str) -> bool {
        if !self.redact_sensitive {
            return false;
        }
        let upper = name.to_uppercase();
        self.redact_var_names
            .iter()
            .any(|pattern| upper.contains(pattern))
    }

    /// Value of variable `name` as it may appear in a log.
    pub fn redact_var_value<'a>(&self, name: &str, value: &'a str) -> Cow<'a, str> {
        if self.should_redact_var(name) {
            Cow::Borrowed("[REDACTED]")
        } else {
            self.redact_value(value)
        }
    }

    /// Redact a value if it looks like a credential.
    pub fn redact_value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if !self.redact_sensitive {
            return self.truncate(value);
        }

        let lower = value.to_lowercase();
        if lower.contains("password") || lower.contains("secret") || is_password_hash(value) {
            return Cow::Borrowed("[REDACTED]");
        }

        self.truncate(value)
    }

    /// Truncate value if it exceeds max length, on a char boundary.
    pub(crate) fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// A shadow-style `$id$salt$digest` field, locked or not.
fn is_password_hash(value: &str) -> bool {
    let trimmed = value.trim().trim_start_matches('!');
    trimmed.starts_with('$') && trimmed.matches('$').count() >= 3
}

/// Escape characters that could forge log lines.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect()
}

/// Format a command line for logging.
pub fn format_line_for_log(line: &str, config: &LogConfig) -> String {
    if !config.log_command_lines {
        return format!("[line: {} bytes]", line.len());
    }

    let sanitized = sanitize_for_log(line);
    config.truncate(&sanitized).into_owned()
}
