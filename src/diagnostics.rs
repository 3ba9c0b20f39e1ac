//! User-facing diagnostics and internal compiler bugs.
//!
//! Passes never abort on a malformed construct: they record a [`Diagnostic`]
//! and keep going, and the pass manager looks at the counters between passes.
//! A [`CompilerBug`] is different: it means an earlier pass broke an
//! invariant, and it travels as an `Err` up to the pipeline.

use colored::Colorize;
use strum::Display;
use thiserror::Error;

use crate::ir::{NodeId, Span, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    #[strum(serialize = "compiler bug")]
    Bug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
    /// Where in the compiler the diagnostic was raised, when built with the
    /// `error-backtrace` feature
    pub origin: Option<String>,
}

impl Diagnostic {
    /// Renders the diagnostic with terminal colours
    pub fn render(&self) -> String {
        let label = match self.severity {
            Severity::Error => self.severity.to_string().red(),
            Severity::Warning => self.severity.to_string().yellow(),
            Severity::Bug => self.severity.to_string().magenta(),
        };

        let mut message = format!("{}: {}", label, self.message);

        if self.span != Span::dummy() {
            message = format!(
                "{} {}",
                message,
                format!("(at {}..{})", self.span.start, self.span.end).white()
            );
        }

        if let Some(origin) = &self.origin {
            message = format!("{}: {}\n{}", "backtrace".blue(), origin, message);
        }

        message
    }

    pub fn render_plain(&self) -> String {
        strip_ansi_escapes::strip_str(self.render())
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
    bug_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Bug => self.bug_count += 1,
        }

        log::trace!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn bug_count(&self) -> usize {
        self.bug_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0 || self.bug_count > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn messages(&self, severity: Severity) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message.as_str())
            .collect()
    }

    /// Writes every diagnostic to stderr
    pub fn emit(&self, color: bool) {
        for diagnostic in &self.entries {
            if color {
                eprintln!("{}", diagnostic.render());
            } else {
                eprintln!("{}", diagnostic.render_plain());
            }
        }
    }
}

/// An invariant that well-formed, resolved input guarantees was violated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilerBug {
    #[error("path `{name}` ({path}) is already bound to declaration {existing}, cannot rebind it to {new}")]
    ConflictingBinding {
        name: Symbol,
        path: NodeId,
        existing: NodeId,
        new: NodeId,
    },
    #[error("no declaration recorded for `{name}` ({path})")]
    Unresolved { name: Symbol, path: NodeId },
    #[error("cannot classify call `{call}`")]
    UnclassifiedCall { call: String },
    #[error("{0}")]
    Internal(String),
}

macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("?")
    }};
}

macro_rules! report {
    ($diagnostics:expr, $severity:expr, $span:expr, $($message:tt)+) => {{
        #[cfg(feature = "error-backtrace")]
        let origin = Some(format!(
            "{}::{} (at {}:{}:{})",
            module_path!(),
            $crate::diagnostics::function!(),
            file!(),
            line!(),
            column!()
        ));
        #[cfg(not(feature = "error-backtrace"))]
        let origin: Option<String> = None;

        $diagnostics.push($crate::diagnostics::Diagnostic {
            severity: $severity,
            span: $span,
            message: format!($($message)+),
            origin,
        })
    }};
}

macro_rules! report_error {
    ($diagnostics:expr, $span:expr, $($message:tt)+) => {
        $crate::diagnostics::report!(
            $diagnostics,
            $crate::diagnostics::Severity::Error,
            $span,
            $($message)+
        )
    };
}

macro_rules! report_warning {
    ($diagnostics:expr, $span:expr, $($message:tt)+) => {
        $crate::diagnostics::report!(
            $diagnostics,
            $crate::diagnostics::Severity::Warning,
            $span,
            $($message)+
        )
    };
}

pub(crate) use {function, report, report_error, report_warning};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_severities() {
        let mut diagnostics = Diagnostics::new();
        report_error!(diagnostics, Span::new(4, 9), "unknown name `{}`", "x");
        report_warning!(diagnostics, Span::dummy(), "unused");
        report_warning!(diagnostics, Span::dummy(), "unused again");

        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 2);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.messages(Severity::Error), vec!["unknown name `x`"]);
    }

    #[test]
    fn plain_rendering_has_no_escapes() {
        let diagnostic = Diagnostic {
            severity: Severity::Warning,
            span: Span::new(1, 2),
            message: "header may be invalid".to_owned(),
            origin: None,
        };

        assert_eq!(
            diagnostic.render_plain(),
            "warning: header may be invalid (at 1..2)"
        );
        assert_eq!(diagnostic.to_string(), "warning: header may be invalid");
    }

    #[test]
    fn backtrace_is_kept_out_of_the_message() {
        let mut diagnostics = Diagnostics::new();
        report_error!(diagnostics, Span::dummy(), "bad");

        let diagnostic = diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.message, "bad");
        assert_eq!(
            diagnostic.origin.is_some(),
            cfg!(feature = "error-backtrace")
        );
    }
}
