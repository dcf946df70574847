//! Error reporting for the SysLang compiler.
//!
//! Uses ariadne for pretty error messages.

mod diagnostic;

pub use diagnostic::{report_diagnostics, report_error, Diagnostic, DiagnosticKind};
