// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbol and jump-target tables.
//!
//! Symbols and targets live in separate maps but share one namespace:
//! binding a symbol over a target name, or a target over a symbol name,
//! is a hard error. All names are case-folded to upper on storage.

use std::collections::HashMap;

use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::expr::{EvalContext, Value};

/// Names bound to `cho` type selectors that the parser matches by text.
const RESERVED: [&str; 3] = ["RDA", "SOF", "RDAL"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolValue {
    Int(i64),
    Real(f64),
    /// A `MEM`-allocated delay region. `NAME` resolves to `start`,
    /// `NAME^` to the midpoint and `NAME#` to `start + length`.
    Delay { start: u32, length: u32 },
}

pub struct SymbolTable {
    symbols: HashMap<String, SymbolValue>,
    targets: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut symbols = HashMap::new();
        for (name, val) in PREDEFINED {
            symbols.insert((*name).to_string(), SymbolValue::Int(*val));
        }
        Self {
            symbols,
            targets: HashMap::new(),
        }
    }

    /// Resolve a (folded) name, including `^`/`#` delay suffixes, to a value.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(base) = name.strip_suffix('^') {
            match self.symbols.get(base)? {
                SymbolValue::Delay { start, length } => {
                    Some(Value::Int((start + length / 2) as i64))
                }
                _ => None,
            }
        } else if let Some(base) = name.strip_suffix('#') {
            match self.symbols.get(base)? {
                SymbolValue::Delay { start, length } => Some(Value::Int((start + length) as i64)),
                _ => None,
            }
        } else {
            match self.symbols.get(name)? {
                SymbolValue::Int(i) => Some(Value::Int(*i)),
                SymbolValue::Real(r) => Some(Value::Real(*r)),
                SymbolValue::Delay { start, .. } => Some(Value::Int(*start as i64)),
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Bind a symbol. Returns a warning message when an existing binding
    /// is replaced.
    pub fn define(&mut self, name: &str, value: SymbolValue) -> Result<Option<String>, AsmError> {
        if RESERVED.contains(&name) {
            return Err(AsmError::new(
                AsmErrorKind::Symbol,
                "Reserved label cannot be re-defined",
                Some(name),
            ));
        }
        if self.targets.contains_key(name) {
            return Err(AsmError::new(
                AsmErrorKind::Symbol,
                "Label already assigned as target",
                Some(name),
            ));
        }
        let warning = if self.symbols.contains_key(name) {
            Some(format!("Label {name} re-defined"))
        } else {
            None
        };
        self.symbols.insert(name.to_string(), value);
        Ok(warning)
    }

    /// Bind a jump target to an instruction address.
    pub fn define_target(&mut self, name: &str, addr: u32) -> Result<(), AsmError> {
        if let Some(&existing) = self.targets.get(name) {
            if existing != addr {
                return Err(AsmError::new(
                    AsmErrorKind::Symbol,
                    "Target redefined",
                    Some(name),
                ));
            }
        }
        if self.symbols.contains_key(name) {
            return Err(AsmError::new(
                AsmErrorKind::Symbol,
                "Target already assigned",
                Some(name),
            ));
        }
        self.targets.insert(name.to_string(), addr);
        Ok(())
    }

    pub fn target(&self, name: &str) -> Option<u32> {
        self.targets.get(name).copied()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext for SymbolTable {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

/// Register addresses, LFO selectors, `cho` type/flag values and `skp`
/// condition bits, as published in the FV-1 datasheet.
const PREDEFINED: &[(&str, i64)] = &[
    ("SIN0_RATE", 0x00),
    ("SIN0_RANGE", 0x01),
    ("SIN1_RATE", 0x02),
    ("SIN1_RANGE", 0x03),
    ("RMP0_RATE", 0x04),
    ("RMP0_RANGE", 0x05),
    ("RMP1_RATE", 0x06),
    ("RMP1_RANGE", 0x07),
    ("POT0", 0x10),
    ("POT1", 0x11),
    ("POT2", 0x12),
    ("ADCL", 0x14),
    ("ADCR", 0x15),
    ("DACL", 0x16),
    ("DACR", 0x17),
    ("ADDR_PTR", 0x18),
    ("REG0", 0x20),
    ("REG1", 0x21),
    ("REG2", 0x22),
    ("REG3", 0x23),
    ("REG4", 0x24),
    ("REG5", 0x25),
    ("REG6", 0x26),
    ("REG7", 0x27),
    ("REG8", 0x28),
    ("REG9", 0x29),
    ("REG10", 0x2a),
    ("REG11", 0x2b),
    ("REG12", 0x2c),
    ("REG13", 0x2d),
    ("REG14", 0x2e),
    ("REG15", 0x2f),
    ("REG16", 0x30),
    ("REG17", 0x31),
    ("REG18", 0x32),
    ("REG19", 0x33),
    ("REG20", 0x34),
    ("REG21", 0x35),
    ("REG22", 0x36),
    ("REG23", 0x37),
    ("REG24", 0x38),
    ("REG25", 0x39),
    ("REG26", 0x3a),
    ("REG27", 0x3b),
    ("REG28", 0x3c),
    ("REG29", 0x3d),
    ("REG30", 0x3e),
    ("REG31", 0x3f),
    ("SIN0", 0x00),
    ("SIN1", 0x01),
    ("RMP0", 0x02),
    ("RMP1", 0x03),
    ("RDA", 0x00),
    ("SOF", 0x02),
    ("RDAL", 0x03),
    ("SIN", 0x00),
    ("COS", 0x01),
    ("REG", 0x02),
    ("COMPC", 0x04),
    ("COMPA", 0x08),
    ("RPTR2", 0x10),
    ("NA", 0x20),
    ("RUN", 0x10),
    ("ZRC", 0x08),
    ("ZRO", 0x04),
    ("GEZ", 0x02),
    ("NEG", 0x01),
];

#[cfg(test)]
mod tests {
    use super::{SymbolTable, SymbolValue};
    use crate::core::expr::Value;

    #[test]
    fn seeds_register_constants() {
        let table = SymbolTable::new();
        assert_eq!(table.lookup("POT0"), Some(Value::Int(0x10)));
        assert_eq!(table.lookup("REG31"), Some(Value::Int(0x3f)));
        assert_eq!(table.lookup("ADDR_PTR"), Some(Value::Int(0x18)));
        assert_eq!(table.lookup("NEG"), Some(Value::Int(0x01)));
        assert_eq!(table.lookup("NOPE"), None);
    }

    #[test]
    fn delay_region_suffixes() {
        let mut table = SymbolTable::new();
        table
            .define(
                "DELAY",
                SymbolValue::Delay {
                    start: 100,
                    length: 31,
                },
            )
            .expect("define");
        assert_eq!(table.lookup("DELAY"), Some(Value::Int(100)));
        assert_eq!(table.lookup("DELAY^"), Some(Value::Int(115)));
        assert_eq!(table.lookup("DELAY#"), Some(Value::Int(131)));
    }

    #[test]
    fn suffix_on_plain_symbol_does_not_resolve() {
        let table = SymbolTable::new();
        assert_eq!(table.lookup("POT0^"), None);
        assert_eq!(table.lookup("POT0#"), None);
    }

    #[test]
    fn redefinition_warns_and_rebinds() {
        let mut table = SymbolTable::new();
        let warn = table.define("POT0", SymbolValue::Int(7)).expect("define");
        assert_eq!(warn.as_deref(), Some("Label POT0 re-defined"));
        assert_eq!(table.lookup("POT0"), Some(Value::Int(7)));
    }

    #[test]
    fn reserved_names_are_locked() {
        let mut table = SymbolTable::new();
        for name in ["RDA", "SOF", "RDAL"] {
            assert!(table.define(name, SymbolValue::Int(0)).is_err());
        }
    }

    #[test]
    fn symbol_and_target_namespaces_are_disjoint() {
        let mut table = SymbolTable::new();
        table.define_target("LOOP", 4).expect("target");
        assert!(table.define("LOOP", SymbolValue::Int(1)).is_err());
        assert!(table.define_target("POT0", 2).is_err());
    }

    #[test]
    fn target_redefinition_at_new_address_fails() {
        let mut table = SymbolTable::new();
        table.define_target("LOOP", 4).expect("target");
        assert!(table.define_target("LOOP", 4).is_ok());
        assert!(table.define_target("LOOP", 5).is_err());
    }
}
