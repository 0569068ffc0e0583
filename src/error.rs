use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single message produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every failure the interpreter can report.
///
/// `Parse` and `DependencyCycle` abort a run. The remaining variants are
/// collected while loading and evaluating and handed back through
/// `errors()` so that one broken module or term does not hide the rest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("dependency cycle between: {}", .nodes.join(", "))]
    DependencyCycle { nodes: Vec<String> },

    #[error(
        "Could not load some remote submodules that are used by '{dir}'. Run 'terraform init' if you would like to include them in the evaluation: {}",
        .sources.join(", ")
    )]
    MissingRemoteSubmodules { dir: String, sources: Vec<String> },

    #[error("Error loading submodule '{name}': {message}")]
    SubmoduleLoad { name: String, message: String },

    #[error("module '{name}' at {} is already being loaded, skipping", .dir.display())]
    ModuleCycle { name: String, dir: PathBuf },

    #[error("failed to load variable file {}: {message}", .path.display())]
    VarFile { path: PathBuf, message: String },

    #[error("Bad dependency key: {0}")]
    BadDependencyKey(String),

    #[error("Missing term {0}")]
    MissingTerm(String),

    #[error("evaluating {term}: {}", join_diagnostics(.diagnostics))]
    Evaluation {
        term: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl InterpreterError {
    /// Whether this error aborts a run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InterpreterError::Parse { .. } | InterpreterError::DependencyCycle { .. }
        )
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_remote_message_lists_sources() {
        let err = InterpreterError::MissingRemoteSubmodules {
            dir: "infra".into(),
            sources: vec!["hashicorp/consul/aws".into(), "git::https://x".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("used by 'infra'"));
        assert!(msg.ends_with("hashicorp/consul/aws, git::https://x"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn evaluation_message_joins_diagnostics() {
        let err = InterpreterError::Evaluation {
            term: "local.a".into(),
            diagnostics: vec![Diagnostic::new("one"), Diagnostic::new("two")],
        };
        assert_eq!(err.to_string(), "evaluating local.a: one; two");
    }

    #[test]
    fn cycle_is_fatal() {
        let err = InterpreterError::DependencyCycle {
            nodes: vec!["local.a".into(), "local.b".into()],
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "dependency cycle between: local.a, local.b");
    }
}
