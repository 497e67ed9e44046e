// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The assembler driver: walks the token stream one statement at a time,
//! evaluates operands, tracks the instruction pointer and the delay
//! allocator, and resolves deferred skip targets after the full parse.

use crate::assembler::encode::{op_def, pack, Coerce, Coerced, Mnemonic, M6};
use crate::assembler::output::{Program, PROGLEN};
use crate::core::assembler::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::expr::{ExprEval, Value};
use crate::core::symbol_table::{SymbolTable, SymbolValue};
use crate::scanner::{Token, TokenKind};

/// Total delay memory in samples. A `MEM` of length N consumes N+1
/// samples; a single region is limited to DELAYSIZE-1.
pub const DELAYSIZE: u32 = 32768;

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Clamp out-of-range operands with a warning instead of failing.
    pub clamp: bool,
    /// Read the literals 1 and 2 as 1.0 and 2.0 (SpinASM compatibility).
    pub spinreals: bool,
    /// Fill unused program space with explicit `skp 0,0` words instead of
    /// a collapsed skip chain.
    pub nopfill: bool,
}

/// A `skp`/`jmp` whose offset names a target: patched after the parse.
struct Fixup {
    addr: usize,
    target: String,
    line: u32,
}

pub(crate) struct Engine<'a> {
    tokens: &'a [Token],
    pos: usize,
    symbols: SymbolTable,
    program: Vec<u32>,
    fixups: Vec<Fixup>,
    delay_cursor: u32,
    diagnostics: Vec<Diagnostic>,
    coerce: Coerce,
    spinreals: bool,
    nopfill: bool,
    instructions: usize,
}

impl<'a> Engine<'a> {
    pub fn new(tokens: &'a [Token], options: &AssembleOptions) -> Self {
        Self {
            tokens,
            pos: 0,
            symbols: SymbolTable::new(),
            program: Vec::with_capacity(PROGLEN),
            fixups: Vec::new(),
            delay_cursor: 0,
            diagnostics: Vec::new(),
            coerce: Coerce {
                clamp: options.clamp,
                spinreals: options.spinreals,
            },
            spinreals: options.spinreals,
            nopfill: options.nopfill,
            instructions: 0,
        }
    }

    /// Run the full parse. On failure the fatal diagnostic has already
    /// been recorded; warnings accumulate either way.
    pub fn run(&mut self) -> Result<(), AsmError> {
        while self.cur().kind != TokenKind::Eof {
            match self.cur().kind.clone() {
                TokenKind::Eol => self.pos += 1,
                TokenKind::Label => self.target_definition()?,
                TokenKind::Name => {
                    let name = self.cur().text.clone();
                    if let Some(mnemonic) = Mnemonic::from_name(&name) {
                        self.instruction(mnemonic)?;
                    } else {
                        self.directive()?;
                    }
                }
                kind => {
                    let token = self.cur().clone();
                    return Err(self.fail(
                        AsmErrorKind::Assembler,
                        &format!("Unexpected {} {}", kind.describe(), token.text.escape_default()),
                        token.line,
                    ));
                }
            }
        }
        self.resolve_fixups()?;
        self.instructions = self.program.len();
        self.fill_free_space();
        Ok(())
    }

    /// Number of instructions read from the source, before fill.
    pub fn instructions(&self) -> usize {
        self.instructions
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn into_program(self) -> (Program, Vec<Diagnostic>) {
        (Program::from_words(&self.program), self.diagnostics)
    }

    fn target_definition(&mut self) -> Result<(), AsmError> {
        let token = self.cur().clone();
        let addr = self.program.len() as u32;
        if let Err(err) = self.symbols.define_target(&token.text, addr) {
            return Err(self.fail_with(err, token.line));
        }
        self.pos += 1;
        Ok(())
    }

    /// `EQU NAME EXPR`, `NAME EQU EXPR`, and the `MEM` forms.
    fn directive(&mut self) -> Result<(), AsmError> {
        let first = self.cur().clone();
        let (keyword, name, line) = if first.text == "EQU" || first.text == "MEM" {
            self.pos += 1;
            let name_tok = self.cur().clone();
            if name_tok.kind != TokenKind::Name {
                return Err(self.fail(
                    AsmErrorKind::Directive,
                    &format!(
                        "Expected LABEL but saw {} {}",
                        name_tok.kind.describe(),
                        name_tok.text.escape_default()
                    ),
                    name_tok.line,
                ));
            }
            if Mnemonic::from_name(&name_tok.text).is_some()
                || name_tok.text == "EQU"
                || name_tok.text == "MEM"
            {
                return Err(self.fail(
                    AsmErrorKind::Directive,
                    &format!("Expected LABEL but saw MNEMONIC {}", name_tok.text),
                    name_tok.line,
                ));
            }
            self.pos += 1;
            (first.text, name_tok.text, name_tok.line)
        } else {
            self.pos += 1;
            let keyword_tok = self.cur().clone();
            let is_keyword = keyword_tok.kind == TokenKind::Name
                && (keyword_tok.text == "EQU" || keyword_tok.text == "MEM");
            if !is_keyword {
                return Err(self.fail(
                    AsmErrorKind::Directive,
                    &format!(
                        "Expected EQU or MEM but saw {} {}",
                        keyword_tok.kind.describe(),
                        keyword_tok.text.escape_default()
                    ),
                    keyword_tok.line,
                ));
            }
            self.pos += 1;
            (keyword_tok.text, first.text, first.line)
        };

        // The scanner fuses ^/# suffixes; the declared name is the base.
        let name = name.trim_end_matches(['^', '#']).to_string();
        let value = self.expression()?;

        if keyword == "MEM" {
            self.mem_directive(&name, value, line)
        } else {
            let bound = match value {
                Value::Int(i) => SymbolValue::Int(i),
                Value::Real(r) => SymbolValue::Real(r),
            };
            self.bind_symbol(&name, bound, line)
        }
    }

    fn mem_directive(&mut self, name: &str, value: Value, line: u32) -> Result<(), AsmError> {
        let Some(length) = value.whole() else {
            return Err(self.fail(
                AsmErrorKind::Directive,
                &format!("Memory {name} length {value} not integer"),
                line,
            ));
        };
        let length = if (0..=(DELAYSIZE - 1) as i64).contains(&length) {
            length as u32
        } else if self.coerce.clamp {
            let clamped = length.clamp(0, (DELAYSIZE - 1) as i64) as u32;
            self.warn(
                AsmErrorKind::Directive,
                &format!("Memory size clamped to {clamped} for {name}"),
                line,
            );
            clamped
        } else {
            return Err(self.fail(
                AsmErrorKind::Directive,
                &format!("Invalid memory size {length}"),
                line,
            ));
        };

        if self.delay_cursor > DELAYSIZE {
            return Err(self.fail(AsmErrorKind::Directive, "Delay memory exhausted", line));
        }
        let top = self.delay_cursor + length;
        if top > DELAYSIZE {
            let available = DELAYSIZE - self.delay_cursor;
            return Err(self.fail(
                AsmErrorKind::Directive,
                &format!("Delay exhausted: requested {length} exceeds {available} available"),
                line,
            ));
        }
        self.bind_symbol(
            name,
            SymbolValue::Delay {
                start: self.delay_cursor,
                length,
            },
            line,
        )?;
        self.delay_cursor = top + 1;
        Ok(())
    }

    fn bind_symbol(&mut self, name: &str, value: SymbolValue, line: u32) -> Result<(), AsmError> {
        match self.symbols.define(name, value) {
            Ok(Some(warning)) => {
                self.warn(AsmErrorKind::Symbol, &warning, line);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(self.fail_with(err, line)),
        }
    }

    fn instruction(&mut self, mnemonic: Mnemonic) -> Result<(), AsmError> {
        let line = self.cur().line;
        self.pos += 1;
        if self.program.len() >= PROGLEN {
            return Err(self.fail(
                AsmErrorKind::Assembler,
                &format!("Max program exceeded by {}", mnemonic.name()),
                line,
            ));
        }

        use Mnemonic::*;
        match mnemonic {
            And | Or | Xor => {
                let mask = self.operand(mnemonic, Coerce::s_23)?;
                self.emit(mnemonic, &[mask]);
            }
            Sof | Exp => {
                let mult = self.operand(mnemonic, Coerce::s1_14)?;
                self.accept_argsep(mnemonic)?;
                let offset = self.operand(mnemonic, Coerce::s_10)?;
                self.emit(mnemonic, &[mult, offset]);
            }
            Log => {
                let mult = self.operand(mnemonic, Coerce::s1_14)?;
                self.accept_argsep(mnemonic)?;
                let offset = self.operand(mnemonic, Coerce::s4_6)?;
                self.emit(mnemonic, &[mult, offset]);
            }
            Rdax | Wrax | Maxx | Rdfx | Wrlx | Wrhx => {
                let reg = self.operand(mnemonic, Coerce::register)?;
                self.accept_argsep(mnemonic)?;
                let mult = self.operand(mnemonic, Coerce::s1_14)?;
                self.emit(mnemonic, &[reg, mult]);
            }
            Mulx => {
                let reg = self.operand(mnemonic, Coerce::register)?;
                self.emit(mnemonic, &[reg]);
            }
            Skp | Jmp => self.skip_instruction(mnemonic)?,
            Rda | Wra | Wrap => {
                let addr = self.operand(mnemonic, Coerce::d_15)?;
                self.accept_argsep(mnemonic)?;
                let mult = self.operand(mnemonic, Coerce::s1_9)?;
                self.emit(mnemonic, &[addr, mult]);
            }
            Rmpa => {
                let mult = self.operand(mnemonic, Coerce::s1_9)?;
                self.emit(mnemonic, &[mult]);
            }
            Wlds => {
                let lfo = self.operand(mnemonic, Coerce::lfo)? & 0x01;
                self.accept_argsep(mnemonic)?;
                let freq = self.operand(mnemonic, Coerce::sin_freq)?;
                self.accept_argsep(mnemonic)?;
                let amp = self.operand(mnemonic, Coerce::d_15)?;
                self.emit(mnemonic, &[lfo, freq, amp]);
            }
            Wldr => {
                let lfo = self.operand(mnemonic, Coerce::lfo)? | 0x02;
                self.accept_argsep(mnemonic)?;
                let freq = self.operand(mnemonic, Coerce::ramp_freq)?;
                self.accept_argsep(mnemonic)?;
                let amp = self.operand(mnemonic, Coerce::ramp_amp)?;
                self.emit(mnemonic, &[lfo, freq, amp]);
            }
            Jam => {
                let lfo = self.operand(mnemonic, Coerce::lfo)? | 0x02;
                self.emit(mnemonic, &[lfo]);
            }
            Cho => self.cho_instruction()?,
            Clr => self.emit(And, &[0]),
            Not => self.emit(Xor, &[0xff_ffff]),
            Nop => self.emit(Skp, &[0, 0]),
            Absa => self.emit(Maxx, &[0, 0]),
            Ldax => {
                let reg = self.operand(mnemonic, Coerce::register)?;
                self.emit(Rdfx, &[reg, 0]);
            }
            Raw => {
                let word = self.operand(mnemonic, Coerce::u_32)?;
                self.emit(mnemonic, &[word]);
            }
        }

        if self.cur().kind == TokenKind::ArgSep {
            let token = self.cur().clone();
            return Err(self.fail(
                AsmErrorKind::Instruction,
                &format!("Excess operands for {}", mnemonic.name()),
                token.line,
            ));
        }
        Ok(())
    }

    fn skip_instruction(&mut self, mnemonic: Mnemonic) -> Result<(), AsmError> {
        let condition = if mnemonic == Mnemonic::Skp {
            let cond = self.operand(mnemonic, Coerce::condition)?;
            self.accept_argsep(mnemonic)?;
            cond
        } else {
            0
        };

        // A bare identifier in the offset slot is a target reference and
        // defers to the fix-up pass; anything else evaluates now.
        let token = self.cur().clone();
        let bare_name = token.kind == TokenKind::Name
            && !matches!(self.peek(1).kind, TokenKind::Operator(_));
        if bare_name {
            self.pos += 1;
            self.fixups.push(Fixup {
                addr: self.program.len(),
                target: token.text,
                line: token.line,
            });
            self.emit(Mnemonic::Skp, &[condition, 0]);
        } else {
            let offset = self.operand(mnemonic, Coerce::offset)?;
            self.emit(Mnemonic::Skp, &[condition, offset]);
        }
        Ok(())
    }

    fn cho_instruction(&mut self) -> Result<(), AsmError> {
        // The type selector is matched on the raw symbol text, not
        // evaluated as an expression.
        let token = self.cur().clone();
        let chotype: u32 = match (&token.kind, token.text.as_str()) {
            (TokenKind::Name, "RDA") => 0,
            (TokenKind::Name, "SOF") => 2,
            (TokenKind::Name, "RDAL") => 3,
            _ => {
                return Err(self.fail(
                    AsmErrorKind::Instruction,
                    &format!("Invalid CHO type {}", token.text.escape_default()),
                    token.line,
                ));
            }
        };
        self.pos += 1;
        self.accept_argsep(Mnemonic::Cho)?;
        let lfo = self.operand(Mnemonic::Cho, Coerce::lfo)?;

        let mut flags = 0b10;
        let mut addr = 0;
        if chotype == 3 {
            if self.cur().kind == TokenKind::ArgSep {
                self.pos += 1;
                flags = self.cho_flags_operand(lfo)?;
            }
        } else {
            self.accept_argsep(Mnemonic::Cho)?;
            flags = self.cho_flags_operand(lfo)?;
            self.accept_argsep(Mnemonic::Cho)?;
            addr = self.operand(Mnemonic::Cho, Coerce::s_15)?;
        }
        self.emit(Mnemonic::Cho, &[chotype, lfo, flags, addr]);
        Ok(())
    }

    fn cho_flags_operand(&mut self, lfo: u32) -> Result<u32, AsmError> {
        let line = self.cur().line;
        let value = self.expression()?;
        match self.coerce.cho_flags(value, lfo) {
            Ok(Coerced { value, warning }) => {
                if let Some(warning) = warning {
                    self.warn(AsmErrorKind::Instruction, &warning, line);
                }
                Ok(value)
            }
            Err(err) => Err(self.fail_with(err, line)),
        }
    }

    /// Evaluate one operand expression and coerce it into its field.
    fn operand(
        &mut self,
        mnemonic: Mnemonic,
        coerce: fn(&Coerce, Value, &str) -> Result<Coerced, AsmError>,
    ) -> Result<u32, AsmError> {
        let line = self.cur().line;
        let value = self.expression()?;
        match coerce(&self.coerce, value, mnemonic.name()) {
            Ok(Coerced { value, warning }) => {
                if let Some(warning) = warning {
                    self.warn(AsmErrorKind::Instruction, &warning, line);
                }
                Ok(value)
            }
            Err(err) => Err(self.fail_with(err, line)),
        }
    }

    fn expression(&mut self) -> Result<Value, AsmError> {
        let token = self.cur().clone();
        if self.at_statement_boundary() {
            if self.spinreals {
                // SpinASM sources omit trailing operands now and then.
                self.warn(
                    AsmErrorKind::Expression,
                    "Missing argument replaced with 0",
                    token.line,
                );
                return Ok(Value::Int(0));
            }
            return Err(self.fail(
                AsmErrorKind::Expression,
                &format!("Unexpected {}", token.kind.describe()),
                token.line,
            ));
        }
        let mut eval = ExprEval::new(self.tokens, self.pos, &self.symbols);
        match eval.eval() {
            Ok(value) => {
                self.pos = eval.pos();
                Ok(value)
            }
            Err(err) => Err(self.fail(AsmErrorKind::Expression, &err.message, err.line)),
        }
    }

    fn at_statement_boundary(&self) -> bool {
        let token = self.cur();
        match token.kind {
            TokenKind::Eol | TokenKind::Eof | TokenKind::Label | TokenKind::ArgSep => true,
            TokenKind::Name => {
                Mnemonic::from_name(&token.text).is_some()
                    || token.text == "EQU"
                    || token.text == "MEM"
            }
            _ => false,
        }
    }

    fn resolve_fixups(&mut self) -> Result<(), AsmError> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            let Some(dest) = self.symbols.target(&fixup.target) else {
                return Err(self.fail(
                    AsmErrorKind::Instruction,
                    &format!("Undefined target {} for SKP", fixup.target),
                    fixup.line,
                ));
            };
            let dest = dest as usize;
            if dest <= fixup.addr {
                return Err(self.fail(
                    AsmErrorKind::Instruction,
                    &format!("Target {} does not follow SKP", fixup.target),
                    fixup.line,
                ));
            }
            let offset = (dest - fixup.addr - 1) as u32;
            if offset > M6 {
                return Err(self.fail(
                    AsmErrorKind::Instruction,
                    &format!(
                        "Offset from SKP to {} ({:#x}) too large",
                        fixup.target, offset
                    ),
                    fixup.line,
                ));
            }
            self.program[fixup.addr] |= (offset & M6) << 21;
        }
        Ok(())
    }

    /// Pad the program to 128 words. Free space is either explicit
    /// `skp 0,0` words or a chain of maximal skips over them.
    fn fill_free_space(&mut self) {
        let first_free = self.program.len();
        let nop = pack(op_def(Mnemonic::Skp), &[0, 0]);
        self.program.resize(PROGLEN, nop);
        if self.nopfill {
            return;
        }
        let mut pos = first_free;
        while pos < PROGLEN {
            let hop = (PROGLEN - 1 - pos).min(M6 as usize) as u32;
            self.program[pos] = pack(op_def(Mnemonic::Skp), &[0, hop]);
            pos += hop as usize + 1;
        }
    }

    fn emit(&mut self, mnemonic: Mnemonic, args: &[u32]) {
        self.program.push(pack(op_def(mnemonic), args));
    }

    fn accept_argsep(&mut self, mnemonic: Mnemonic) -> Result<(), AsmError> {
        let token = self.cur().clone();
        if token.kind == TokenKind::ArgSep {
            self.pos += 1;
            Ok(())
        } else if self.spinreals && self.at_statement_boundary() {
            // Let the omitted-operand warning fire on the next operand.
            Ok(())
        } else {
            Err(self.fail(
                AsmErrorKind::Instruction,
                &format!("Missing required operand for {}", mnemonic.name()),
                token.line,
            ))
        }
    }

    fn cur(&self) -> &Token {
        // tokenize() guarantees a trailing Eof token.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }

    fn warn(&mut self, kind: AsmErrorKind, msg: &str, line: u32) {
        self.diagnostics.push(Diagnostic::new(
            line,
            Severity::Warning,
            AsmError::new(kind, msg, None),
        ));
    }

    fn fail(&mut self, kind: AsmErrorKind, msg: &str, line: u32) -> AsmError {
        self.fail_with(AsmError::new(kind, msg, None), line)
    }

    fn fail_with(&mut self, err: AsmError, line: u32) -> AsmError {
        self.diagnostics
            .push(Diagnostic::new(line, Severity::Error, err.clone()));
        err
    }
}
