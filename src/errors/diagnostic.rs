//! Diagnostic reporting for SysLang compiler errors.

#![allow(dead_code)]

use std::fmt;

use ariadne::{Color, Label, Report, ReportKind, Source};

/// The kind of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

/// A compiler diagnostic, anchored to a source location.
///
/// The `Display` form is the plain one-line report written to stderr
/// when no source text is available for a pretty report.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub span: (usize, usize),
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(
        message: impl Into<String>,
        line: usize,
        column: usize,
        span: (usize, usize),
    ) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            message: message.into(),
            line,
            column,
            span,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(
        message: impl Into<String>,
        line: usize,
        column: usize,
        span: (usize, usize),
    ) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            message: message.into(),
            line,
            column,
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
        };
        write!(
            f,
            "{} at line {}, column {}: {}",
            kind, self.line, self.column, self.message
        )
    }
}

/// Report a diagnostic to stderr using ariadne.
pub fn report_error(filename: &str, source: &str, diagnostic: &Diagnostic) {
    let kind = match diagnostic.kind {
        DiagnosticKind::Error => ReportKind::Error,
        DiagnosticKind::Warning => ReportKind::Warning,
    };

    let color = match diagnostic.kind {
        DiagnosticKind::Error => Color::Red,
        DiagnosticKind::Warning => Color::Yellow,
    };

    let end = diagnostic.span.1.max(diagnostic.span.0 + 1);
    let span = (filename, diagnostic.span.0..end);

    let report = Report::build(kind, span.clone())
        .with_message(diagnostic.to_string())
        .with_label(
            Label::new(span)
                .with_message(&diagnostic.message)
                .with_color(color),
        );

    if report
        .finish()
        .eprint((filename, Source::from(source)))
        .is_err()
    {
        eprintln!("{}", diagnostic);
    }
}

/// Report multiple diagnostics.
pub fn report_diagnostics(filename: &str, source: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        report_error(filename, source, diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_display_format() {
        let diag = Diagnostic::error("Expected ';'", 3, 14, (27, 28));
        assert_eq!(diag.to_string(), "Error at line 3, column 14: Expected ';'");
    }
}
