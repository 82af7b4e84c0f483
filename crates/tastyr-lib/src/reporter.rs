//! Diagnostic sink.
//!
//! The host compiler owns rendering; the reader only accumulates messages
//! in order. `Echo` is the position-less debug channel used by the
//! `debug_tasty` setting.

use std::cell::RefCell;

/// Severity of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Echo,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Echo => write!(f, "echo"),
        }
    }
}

/// One reported message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Collection of messages reported during unpickling.
#[derive(Debug, Default)]
pub struct Reporter {
    messages: RefCell<Vec<Diagnostic>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, message: impl Into<String>) {
        self.messages.borrow_mut().push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    pub fn echo(&self, message: impl Into<String>) {
        self.messages.borrow_mut().push(Diagnostic {
            severity: Severity::Echo,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .borrow()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn messages(&self) -> Vec<Diagnostic> {
        self.messages.borrow().clone()
    }

    /// One line per message, in report order.
    pub fn render(&self) -> String {
        self.messages
            .borrow()
            .iter()
            .map(|d| format!("{}: {}", d.severity, d.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn render_keeps_report_order() {
        let reporter = Reporter::new();
        reporter.echo("indexing demo.Foo");
        reporter.error("union type refused");
        reporter.echo("completed object Foo");
        assert_eq!(
            reporter.render(),
            indoc! {"
                echo: indexing demo.Foo
                error: union type refused
                echo: completed object Foo"}
        );
    }

    #[test]
    fn error_counting_ignores_echoes() {
        let reporter = Reporter::new();
        assert!(!reporter.has_errors());
        reporter.echo("quiet");
        assert_eq!(reporter.error_count(), 0);
        reporter.error("boom");
        assert!(reporter.has_errors());
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.messages().len(), 2);
    }
}
