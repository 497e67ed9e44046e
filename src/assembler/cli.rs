// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::assembler::engine::AssembleOptions;
use crate::core::assembler::error::{AsmError, AsmErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Assemble a single Spin FV-1 DSP program.

The assembled program is written as Intel HEX unless -b is given or the
output filename does not end in 'hex'. With -p the program is placed at
slot N of an eight-program EEPROM bank: hex output moves the base address
to N*0x200, binary output seeks to N*512 in the output file.";

#[derive(Parser, Debug)]
#[command(
    name = "asfv1",
    version = VERSION,
    disable_version_flag = true,
    about = "Assemble a single FV-1 DSP program",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        short = 'v',
        long = "version",
        action = ArgAction::Version,
        help = "print version"
    )]
    pub version: Option<bool>,
    #[arg(help = "program source file")]
    pub infile: PathBuf,
    #[arg(help = "assembled output file (defaults to infile with a .hex extension)")]
    pub outfile: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress info lines and warnings. Errors are always reported."
    )]
    pub quiet: bool,
    #[arg(
        short = 'c',
        long = "clamp",
        action = ArgAction::SetTrue,
        long_help = "Clamp out-of-range operand values with a warning instead of failing."
    )]
    pub clamp: bool,
    #[arg(
        short = 'n',
        long = "nopfill",
        action = ArgAction::SetTrue,
        long_help = "Fill unused program space with explicit skp 0,0 instructions instead of a collapsed skip chain."
    )]
    pub nopfill: bool,
    #[arg(
        short = 's',
        long = "spinreals",
        action = ArgAction::SetTrue,
        long_help = "Read the literals 2 and 1 as 2.0 and 1.0 (SpinASM compatibility)."
    )]
    pub spinreals: bool,
    #[arg(
        short = 'p',
        value_name = "{0..7}",
        value_parser = clap::value_parser!(u8).range(0..=7),
        long_help = "Target program slot on a shared EEPROM image."
    )]
    pub program: Option<u8>,
    #[arg(
        short = 'b',
        long = "binary",
        action = ArgAction::SetTrue,
        long_help = "Force raw binary output regardless of the output file extension."
    )]
    pub binary: bool,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Diagnostics format on stderr. text is default; json emits one record per diagnostic."
    )]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Validated CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub infile: PathBuf,
    pub outfile: PathBuf,
    pub binary: bool,
    /// Explicit program slot; hex output defaults to slot 0.
    pub slot: Option<u8>,
    pub quiet: bool,
    pub format: OutputFormat,
    pub options: AssembleOptions,
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmError> {
    if cli.infile.as_os_str().is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::Cli,
            "Input filename must not be empty",
            None,
        ));
    }
    let outfile = match &cli.outfile {
        Some(path) => path.clone(),
        None => cli.infile.with_extension("hex"),
    };
    let hex_named = outfile
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("hex"))
        .unwrap_or(false);
    Ok(CliConfig {
        infile: cli.infile.clone(),
        outfile,
        binary: cli.binary || !hex_named,
        slot: cli.program,
        quiet: cli.quiet,
        format: cli.format,
        options: AssembleOptions {
            clamp: cli.clamp,
            spinreals: cli.spinreals,
            nopfill: cli.nopfill,
        },
    })
}
