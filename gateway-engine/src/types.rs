//! Shared data model: requests, languages, and results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five interpreters the engine knows how to dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Typescript,
    Python,
    Php,
    Java,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Some(Language::Javascript),
            "typescript" | "ts" => Some(Language::Typescript),
            "python" | "python3" | "py" => Some(Language::Python),
            "php" => Some(Language::Php),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Php => "php",
            Language::Java => "java",
        }
    }

    /// All languages with a circuit breaker / pool of their own.
    ///
    /// TypeScript aliases JavaScript's pool (spec §4.6), so it is excluded
    /// here — `Engine` keys pools by the dispatch language, not the input
    /// language.
    pub fn pooled_variants() -> [Language; 4] {
        [Language::Javascript, Language::Python, Language::Php, Language::Java]
    }

    /// The language whose pool actually executes this one.
    pub fn dispatch_target(&self) -> Language {
        match self {
            Language::Typescript => Language::Javascript,
            other => *other,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to one `Execute` call. Immutable for its duration.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub language: Language,
    pub version: String,
    pub source: Vec<u8>,
}

/// Output of one execution, cached or fresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub killed: bool,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Set when the child process itself could not be launched.
    #[serde(default)]
    pub error: bool,
}

impl ExecutionResult {
    /// Only records with `exit_code == 0` are ever cached (spec invariant 6).
    pub fn cacheable(&self) -> bool {
        self.exit_code == 0
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}
