// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.

use std::fmt;
use std::sync::Arc;

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Assembler,
    Cli,
    Directive,
    Expression,
    Instruction,
    Io,
    Scanner,
    Symbol,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    line: u32,
    column: Option<usize>,
    code: String,
    severity: Severity,
    error: AsmError,
    file: Option<String>,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            column: None,
            code: default_diagnostic_code(error.kind()).to_string(),
            severity,
            error,
            file: None,
        }
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        format!(
            "{}: {} [{}] - {}",
            self.line,
            sev,
            self.code,
            self.error.message()
        )
    }

    pub fn format_with_context(&self, lines: Option<&[String]>, use_color: bool) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        let header = match &self.file {
            Some(file) => format!("{file}:{}: {sev} [{}]", self.line, self.code),
            None => format!("{}: {sev} [{}]", self.line, self.code),
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');
        for line in build_context_lines(self.line, self.column, lines, use_color) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&format!("{sev}: {}", self.error.message()));
        out
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }
}

/// Report from a successful assembly run.
pub struct AsmRunReport {
    diagnostics: Vec<Diagnostic>,
    infos: Vec<String>,
    source_lines: Arc<Vec<String>>,
    instructions: usize,
}

impl AsmRunReport {
    pub fn new(
        diagnostics: Vec<Diagnostic>,
        source_lines: impl Into<Arc<Vec<String>>>,
        instructions: usize,
    ) -> Self {
        Self {
            diagnostics,
            infos: Vec::new(),
            source_lines: source_lines.into(),
            instructions,
        }
    }

    pub fn push_info(&mut self, info: impl Into<String>) {
        self.infos.push(info.into());
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn infos(&self) -> &[String] {
        &self.infos
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }

    /// Number of instructions read from the source, before free-space fill.
    pub fn instructions(&self) -> usize {
        self.instructions
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Error from a failed assembly run.
#[derive(Debug)]
pub struct AsmRunError {
    error: AsmError,
    diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
}

impl AsmRunError {
    pub fn new(
        error: AsmError,
        diagnostics: Vec<Diagnostic>,
        source_lines: impl Into<Arc<Vec<String>>>,
    ) -> Self {
        Self {
            error,
            diagnostics,
            source_lines: source_lines.into(),
        }
    }

    pub fn error(&self) -> &AsmError {
        &self.error
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }
}

impl fmt::Display for AsmRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AsmRunError {}

/// Build context lines for error display: the offending source line,
/// plus a caret line underneath when a column is known.
pub fn build_context_lines(
    line_num: u32,
    column: Option<usize>,
    lines: Option<&[String]>,
    use_color: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    let line_idx = line_num.saturating_sub(1) as usize;

    let source = lines
        .filter(|lines| !lines.is_empty())
        .and_then(|lines| lines.get(line_idx));
    let Some(source) = source else {
        out.push(format!("{:>5} | <source unavailable>", line_num));
        return out;
    };

    out.push(format!("{:>5} | {}", line_num, source));
    if let Some(col) = column.filter(|&col| col > 0) {
        let caret = if use_color { "\x1b[31m^\x1b[0m" } else { "^" };
        out.push(format!("{:>5} | {}{}", "", " ".repeat(col - 1), caret));
    }
    out
}

fn default_diagnostic_code(kind: AsmErrorKind) -> &'static str {
    match kind {
        AsmErrorKind::Assembler => "asm001",
        AsmErrorKind::Cli => "asm101",
        AsmErrorKind::Scanner => "asm201",
        AsmErrorKind::Expression => "asm301",
        AsmErrorKind::Symbol => "asm401",
        AsmErrorKind::Directive => "asm501",
        AsmErrorKind::Instruction => "asm601",
        AsmErrorKind::Io => "asm701",
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_format_includes_line_and_severity() {
        let err = AsmError::new(AsmErrorKind::Assembler, "Bad thing", None);
        let diag = Diagnostic::new(12, Severity::Error, err);
        assert_eq!(diag.format(), "12: ERROR [asm001] - Bad thing");
    }

    #[test]
    fn format_with_context_renders_source_and_caret() {
        let err = AsmError::new(AsmErrorKind::Expression, "Undefined label FOO", None);
        let diag = Diagnostic::new(2, Severity::Error, err)
            .with_file(Some("example.spn".to_string()))
            .with_column(Some(4));
        let lines = vec!["clr".to_string(), "or foo".to_string()];

        let rendered = diag.format_with_context(Some(&lines), false);
        let expected = [
            "example.spn:2: ERROR [asm301]",
            "    2 | or foo",
            "      |    ^",
            "ERROR: Undefined label FOO",
        ]
        .join("\n");
        assert_eq!(rendered, expected);
    }

    #[test]
    fn caret_line_is_omitted_without_a_column() {
        let lines = vec!["or 1".to_string()];
        let context = build_context_lines(1, None, Some(&lines), false);
        assert_eq!(context, vec!["    1 | or 1".to_string()]);
    }

    #[test]
    fn caret_is_colored_when_enabled() {
        let lines = vec!["or @".to_string()];
        let context = build_context_lines(1, Some(4), Some(&lines), true);
        assert_eq!(context[1], "      |    \x1b[31m^\x1b[0m");
    }

    #[test]
    fn format_with_context_survives_missing_source() {
        let err = AsmError::new(AsmErrorKind::Io, "boom", None);
        let diag = Diagnostic::new(9, Severity::Error, err);
        let rendered = diag.format_with_context(None, false);
        assert!(rendered.contains("<source unavailable>"));
    }

    #[test]
    fn format_error_appends_parameter() {
        assert_eq!(format_error("Bad value", Some("12")), "Bad value: 12");
        assert_eq!(format_error("Bad value", None), "Bad value");
    }

    #[test]
    fn report_counts_warnings() {
        let warn = Diagnostic::new(
            1,
            Severity::Warning,
            AsmError::new(AsmErrorKind::Symbol, "Label X re-defined", None),
        );
        let report = AsmRunReport::new(vec![warn], Vec::<String>::new(), 3);
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.instructions(), 3);
    }
}
