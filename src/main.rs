// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for asfv1.

use std::io::{self, Write};

use clap::Parser;
use serde_json::json;

use asfv1::assembler::{run_with_cli, validate_cli, Cli, OutputFormat, VERSION};
use asfv1::core::assembler::error::{Diagnostic, Severity};

struct DiagnosticsSink {
    format: OutputFormat,
    use_color: bool,
    quiet: bool,
}

impl DiagnosticsSink {
    fn emit_info(&self, info: &str) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Text => eprintln!("info: {info}"),
            OutputFormat::Json => {
                let _ = writeln!(
                    io::stderr(),
                    "{}",
                    json!({ "severity": "info", "message": info })
                );
            }
        }
    }

    fn emit_diagnostics(&self, diagnostics: &[Diagnostic], lines: &[String]) {
        for diag in diagnostics {
            if self.quiet && diag.severity() == Severity::Warning {
                continue;
            }
            match self.format {
                OutputFormat::Text => {
                    eprintln!("{}", diag.format_with_context(Some(lines), self.use_color));
                }
                OutputFormat::Json => {
                    let severity = match diag.severity() {
                        Severity::Warning => "warning",
                        Severity::Error => "error",
                    };
                    let _ = writeln!(
                        io::stderr(),
                        "{}",
                        json!({
                            "severity": severity,
                            "line": diag.line(),
                            "column": diag.column(),
                            "code": diag.code(),
                            "message": diag.message(),
                        })
                    );
                }
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let sink = DiagnosticsSink {
        format: config.format,
        use_color: std::env::var("NO_COLOR").is_err(),
        quiet: config.quiet,
    };
    sink.emit_info(&format!("FV-1 assembler v{VERSION}"));
    sink.emit_info(&format!("Reading input from {}", config.infile.display()));

    match run_with_cli(&cli) {
        Ok(report) => {
            for info in report.infos() {
                sink.emit_info(info);
            }
            sink.emit_diagnostics(report.diagnostics(), report.source_lines());
        }
        Err(err) => {
            sink.emit_diagnostics(err.diagnostics(), err.source_lines());
            match config.format {
                OutputFormat::Text => eprintln!("error: {err}"),
                OutputFormat::Json => {
                    let _ = writeln!(
                        io::stderr(),
                        "{}",
                        json!({ "severity": "error", "message": err.to_string() })
                    );
                }
            }
            std::process::exit(1);
        }
    }
}
