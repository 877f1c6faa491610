//! Resource limits for a shell session
//!
//! These limits keep a single line from consuming unbounded memory: brace
//! expansion is a cross product, and pipelines buffer every stage's output.

/// Resource limits applied to every executed line
#[derive(Debug, Clone)]
pub struct ShellLimits {
    /// Maximum number of stages in one pipeline
    /// Default: 16
    pub max_pipeline_stages: usize,

    /// Maximum number of words a single brace expansion may produce
    /// Default: 10,000
    pub max_brace_expansion: usize,

    /// Maximum length of an input line in bytes
    /// Default: 64 KiB
    pub max_line_length: usize,

    /// Maximum size of a file written through a redirection
    /// Default: 10 MiB
    pub max_file_size: usize,
}

impl Default for ShellLimits {
    fn default() -> Self {
        Self {
            max_pipeline_stages: 16,
            max_brace_expansion: 10_000,
            max_line_length: 64 * 1024,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl ShellLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum pipeline stage count
    pub fn max_pipeline_stages(mut self, count: usize) -> Self {
        self.max_pipeline_stages = count;
        self
    }

    /// Set maximum brace expansion results
    pub fn max_brace_expansion(mut self, count: usize) -> Self {
        self.max_brace_expansion = count;
        self
    }

    /// Set maximum input line length
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Set maximum redirected file size
    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub(crate) fn check_line(&self, line: &str) -> Result<(), LimitExceeded> {
        if line.len() > self.max_line_length {
            return Err(LimitExceeded::LineLength(self.max_line_length));
        }
        Ok(())
    }

    pub(crate) fn check_stages(&self, stages: usize) -> Result<(), LimitExceeded> {
        if stages > self.max_pipeline_stages {
            return Err(LimitExceeded::PipelineStages(self.max_pipeline_stages));
        }
        Ok(())
    }

    pub(crate) fn check_file_size(&self, size: usize) -> Result<(), LimitExceeded> {
        if size > self.max_file_size {
            return Err(LimitExceeded::FileSize(self.max_file_size));
        }
        Ok(())
    }
}

/// Error returned when a resource limit is exceeded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitExceeded {
    #[error("maximum pipeline stages exceeded ({0})")]
    PipelineStages(usize),

    #[error("maximum brace expansion exceeded ({0} words)")]
    BraceExpansion(usize),

    #[error("maximum line length exceeded ({0} bytes)")]
    LineLength(usize),

    #[error("maximum file size exceeded ({0} bytes)")]
    FileSize(usize),
}
