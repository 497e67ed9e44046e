// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! FV-1 assembler - main entry point.
//!
//! This module ties together the scanner, expression evaluator and
//! encoders behind a single `assemble` call, and drives file input and
//! output for the command-line shell.

pub mod cli;
pub mod encode;
pub mod engine;
pub mod output;

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use engine::Engine;
use output::{write_bin, write_hex, Program};

use crate::core::assembler::error::{
    AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic, Severity,
};
use crate::core::text_encoding::decode_source;
use crate::scanner::Scanner;

pub use cli::{validate_cli, Cli, CliConfig, OutputFormat, VERSION};
pub use engine::AssembleOptions;

/// Assemble one source buffer into a 128-word program.
///
/// Warnings ride along in the report; the first fatal error aborts and is
/// returned with every diagnostic gathered up to that point.
pub fn assemble(
    source: &str,
    options: &AssembleOptions,
) -> Result<(Program, AsmRunReport), AsmRunError> {
    let source_lines: Arc<Vec<String>> =
        Arc::new(source.lines().map(str::to_string).collect());

    let tokens = match Scanner::tokenize(source, options.spinreals) {
        Ok(tokens) => tokens,
        Err(scan) => {
            let error = AsmError::new(AsmErrorKind::Scanner, &scan.message, None);
            let diagnostic = Diagnostic::new(scan.line, Severity::Error, error.clone())
                .with_column(Some(scan.column));
            return Err(AsmRunError::new(error, vec![diagnostic], source_lines));
        }
    };

    let mut engine = Engine::new(&tokens, options);
    match engine.run() {
        Ok(()) => {
            let instructions = engine.instructions();
            let (program, diagnostics) = engine.into_program();
            Ok((
                program,
                AsmRunReport::new(diagnostics, source_lines, instructions),
            ))
        }
        Err(error) => Err(AsmRunError::new(
            error,
            engine.take_diagnostics(),
            source_lines,
        )),
    }
}

/// Run a full assembly from validated CLI arguments: read and decode the
/// input, assemble, and write the selected output format.
pub fn run_with_cli(cli: &Cli) -> Result<AsmRunReport, AsmRunError> {
    let config = validate_cli(cli)
        .map_err(|err| AsmRunError::new(err, Vec::new(), Vec::<String>::new()))?;

    let raw = fs::read(&config.infile).map_err(|err| {
        io_run_error("Error reading input", &err, &config.infile.display().to_string())
    })?;
    let decoded = decode_source(&raw);

    let (program, mut report) = assemble(&decoded.text, &config.options)?;
    if let Some(note) = decoded.note {
        report.push_info(note.to_string());
    }
    report.push_info(format!(
        "Read {} instructions from input",
        report.instructions()
    ));

    let outname = config.outfile.display().to_string();
    if config.binary {
        report.push_info(format!("Writing binary output to {outname}"));
        if let Some(slot) = config.slot {
            let offset = u64::from(slot) * 512;
            report.push_info(format!(
                "Selected program {slot} at offset 0x{offset:04X}"
            ));
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&config.outfile)
                .map_err(|err| io_run_error("Error writing output", &err, &outname))?;
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| write_bin(&program, &mut file))
                .map_err(|err| io_run_error("Error writing output", &err, &outname))?;
        } else {
            let mut file = File::create(&config.outfile)
                .map_err(|err| io_run_error("Error writing output", &err, &outname))?;
            write_bin(&program, &mut file)
                .and_then(|_| file.flush())
                .map_err(|err| io_run_error("Error writing output", &err, &outname))?;
        }
    } else {
        let slot = config.slot.unwrap_or(0);
        if let Some(slot) = config.slot {
            report.push_info(format!(
                "Selected program {slot} at offset 0x{:04X}",
                u32::from(slot) * 0x200
            ));
        }
        report.push_info(format!("Writing hex output to {outname}"));
        let mut file = File::create(&config.outfile)
            .map_err(|err| io_run_error("Error writing output", &err, &outname))?;
        write_hex(&program, slot, &mut file)
            .and_then(|_| file.flush())
            .map_err(|err| io_run_error("Error writing output", &err, &outname))?;
    }

    Ok(report)
}

fn io_run_error(msg: &str, err: &std::io::Error, path: &str) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Io, &format!("{msg}: {err}"), Some(path)),
        Vec::new(),
        Vec::<String>::new(),
    )
}
