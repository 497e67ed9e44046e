// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoding: bit masks, fixed-point formats, the opcode
//! table, and operand coercion.
//!
//! Coercion is policy-driven: out-of-range operands either fail or, under
//! clamp mode, are pinned to the nearest representable value with a
//! warning attached to the result. Structural operands (registers,
//! conditions, offsets, LFO selectors, flags) never clamp.

use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::expr::Value;

pub const M1: u32 = 0x01;
pub const M2: u32 = 0x03;
pub const M5: u32 = 0x1f;
pub const M6: u32 = 0x3f;
pub const M9: u32 = 0x1ff;
pub const M11: u32 = 0x7ff;
pub const M15: u32 = 0x7fff;
pub const M16: u32 = 0xffff;
pub const M24: u32 = 0xff_ffff;
pub const M32: u32 = 0xffff_ffff;

/// A signed fixed-point format `Sn_d`: one sign bit, `n` integer bits and
/// `d` fraction bits. `reference` is the integer representation of +1.0.
#[derive(Debug, Clone, Copy)]
pub struct FixedFormat {
    pub name: &'static str,
    pub bits: u32,
    pub reference: f64,
    pub min: f64,
    pub max: f64,
}

pub const S4_6: FixedFormat = FixedFormat {
    name: "S4_6",
    bits: 11,
    reference: 64.0,
    min: -16.0,
    max: 15.984375,
};

pub const S1_9: FixedFormat = FixedFormat {
    name: "S1_9",
    bits: 11,
    reference: 512.0,
    min: -2.0,
    max: 1.998046875,
};

pub const S_10: FixedFormat = FixedFormat {
    name: "S_10",
    bits: 11,
    reference: 1024.0,
    min: -1.0,
    max: 0.9990234375,
};

pub const S1_14: FixedFormat = FixedFormat {
    name: "S1_14",
    bits: 16,
    reference: 16384.0,
    min: -2.0,
    max: 1.99993896484375,
};

pub const S_15: FixedFormat = FixedFormat {
    name: "S_15",
    bits: 16,
    reference: 32768.0,
    min: -1.0,
    max: 0.999969482421875,
};

pub const S_23: FixedFormat = FixedFormat {
    name: "S_23",
    bits: 24,
    reference: 8388608.0,
    min: -1.0,
    max: 0.9999998807907104,
};

/// Instruction mnemonics, including the pseudo-ops that expand to
/// canonical encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Rda,
    Rmpa,
    Wra,
    Wrap,
    Rdax,
    Rdfx,
    Ldax,
    Wrax,
    Wrhx,
    Wrlx,
    Maxx,
    Absa,
    Mulx,
    Log,
    Exp,
    Sof,
    And,
    Clr,
    Or,
    Xor,
    Not,
    Skp,
    Jmp,
    Nop,
    Wlds,
    Wldr,
    Jam,
    Cho,
    Raw,
}

impl Mnemonic {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "RDA" => Mnemonic::Rda,
            "RMPA" => Mnemonic::Rmpa,
            "WRA" => Mnemonic::Wra,
            "WRAP" => Mnemonic::Wrap,
            "RDAX" => Mnemonic::Rdax,
            "RDFX" => Mnemonic::Rdfx,
            "LDAX" => Mnemonic::Ldax,
            "WRAX" => Mnemonic::Wrax,
            "WRHX" => Mnemonic::Wrhx,
            "WRLX" => Mnemonic::Wrlx,
            "MAXX" => Mnemonic::Maxx,
            "ABSA" => Mnemonic::Absa,
            "MULX" => Mnemonic::Mulx,
            "LOG" => Mnemonic::Log,
            "EXP" => Mnemonic::Exp,
            "SOF" => Mnemonic::Sof,
            "AND" => Mnemonic::And,
            "CLR" => Mnemonic::Clr,
            "OR" => Mnemonic::Or,
            "XOR" => Mnemonic::Xor,
            "NOT" => Mnemonic::Not,
            "SKP" => Mnemonic::Skp,
            "JMP" => Mnemonic::Jmp,
            "NOP" => Mnemonic::Nop,
            "WLDS" => Mnemonic::Wlds,
            "WLDR" => Mnemonic::Wldr,
            "JAM" => Mnemonic::Jam,
            "CHO" => Mnemonic::Cho,
            "RAW" => Mnemonic::Raw,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mnemonic::Rda => "RDA",
            Mnemonic::Rmpa => "RMPA",
            Mnemonic::Wra => "WRA",
            Mnemonic::Wrap => "WRAP",
            Mnemonic::Rdax => "RDAX",
            Mnemonic::Rdfx => "RDFX",
            Mnemonic::Ldax => "LDAX",
            Mnemonic::Wrax => "WRAX",
            Mnemonic::Wrhx => "WRHX",
            Mnemonic::Wrlx => "WRLX",
            Mnemonic::Maxx => "MAXX",
            Mnemonic::Absa => "ABSA",
            Mnemonic::Mulx => "MULX",
            Mnemonic::Log => "LOG",
            Mnemonic::Exp => "EXP",
            Mnemonic::Sof => "SOF",
            Mnemonic::And => "AND",
            Mnemonic::Clr => "CLR",
            Mnemonic::Or => "OR",
            Mnemonic::Xor => "XOR",
            Mnemonic::Not => "NOT",
            Mnemonic::Skp => "SKP",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Nop => "NOP",
            Mnemonic::Wlds => "WLDS",
            Mnemonic::Wldr => "WLDR",
            Mnemonic::Jam => "JAM",
            Mnemonic::Cho => "CHO",
            Mnemonic::Raw => "RAW",
        }
    }
}

/// Opcode plus `(mask, shift)` per operand field, OR-composed into the
/// 32-bit word. Pseudo-ops share the table entry of their expansion.
pub struct OpDef {
    pub opcode: u32,
    pub fields: &'static [(u32, u32)],
}

pub fn op_def(mnemonic: Mnemonic) -> &'static OpDef {
    use Mnemonic::*;
    match mnemonic {
        Rda => &OpDef {
            opcode: 0b00000,
            fields: &[(M15, 5), (M11, 21)],
        },
        Rmpa => &OpDef {
            opcode: 0b00001,
            fields: &[(M11, 21)],
        },
        Wra => &OpDef {
            opcode: 0b00010,
            fields: &[(M15, 5), (M11, 21)],
        },
        Wrap => &OpDef {
            opcode: 0b00011,
            fields: &[(M15, 5), (M11, 21)],
        },
        Rdax => &OpDef {
            opcode: 0b00100,
            fields: &[(M6, 5), (M16, 16)],
        },
        Rdfx | Ldax => &OpDef {
            opcode: 0b00101,
            fields: &[(M6, 5), (M16, 16)],
        },
        Wrax => &OpDef {
            opcode: 0b00110,
            fields: &[(M6, 5), (M16, 16)],
        },
        Wrhx => &OpDef {
            opcode: 0b00111,
            fields: &[(M6, 5), (M16, 16)],
        },
        Wrlx => &OpDef {
            opcode: 0b01000,
            fields: &[(M6, 5), (M16, 16)],
        },
        Maxx | Absa => &OpDef {
            opcode: 0b01001,
            fields: &[(M6, 5), (M16, 16)],
        },
        Mulx => &OpDef {
            opcode: 0b01010,
            fields: &[(M6, 5)],
        },
        Log => &OpDef {
            opcode: 0b01011,
            fields: &[(M16, 16), (M11, 5)],
        },
        Exp => &OpDef {
            opcode: 0b01100,
            fields: &[(M16, 16), (M11, 5)],
        },
        Sof => &OpDef {
            opcode: 0b01101,
            fields: &[(M16, 16), (M11, 5)],
        },
        And | Clr => &OpDef {
            opcode: 0b01110,
            fields: &[(M24, 8)],
        },
        Or => &OpDef {
            opcode: 0b01111,
            fields: &[(M24, 8)],
        },
        Xor | Not => &OpDef {
            opcode: 0b10000,
            fields: &[(M24, 8)],
        },
        Skp | Jmp | Nop => &OpDef {
            opcode: 0b10001,
            fields: &[(M5, 27), (M6, 21)],
        },
        Wlds => &OpDef {
            opcode: 0b10010,
            fields: &[(M1, 29), (M9, 20), (M15, 5)],
        },
        Wldr => &OpDef {
            opcode: 0b10010,
            fields: &[(M2, 29), (M16, 13), (M2, 5)],
        },
        Jam => &OpDef {
            opcode: 0b10011,
            fields: &[(M2, 6)],
        },
        Cho => &OpDef {
            opcode: 0b10100,
            fields: &[(M2, 30), (M2, 21), (M6, 24), (M16, 5)],
        },
        Raw => &OpDef {
            opcode: 0b00000,
            fields: &[(M32, 0)],
        },
    }
}

/// Compose a machine word from masked, shifted operand fields.
pub fn pack(def: &OpDef, args: &[u32]) -> u32 {
    let mut word = def.opcode;
    for (arg, (mask, shift)) in args.iter().zip(def.fields.iter()) {
        word |= (arg & mask) << shift;
    }
    word
}

/// A coerced operand field with an optional clamp/adjust warning.
pub struct Coerced {
    pub value: u32,
    pub warning: Option<String>,
}

impl Coerced {
    fn exact(value: u32) -> Self {
        Self {
            value,
            warning: None,
        }
    }
}

pub type CoerceResult = Result<Coerced, AsmError>;

/// Operand coercion under a clamp/strict policy.
pub struct Coerce {
    pub clamp: bool,
    pub spinreals: bool,
}

impl Coerce {
    /// Register address, 0..=63.
    pub fn register(&self, val: Value, mnemonic: &str) -> CoerceResult {
        match val.whole() {
            Some(reg) if (0..=M6 as i64).contains(&reg) => Ok(Coerced::exact(reg as u32)),
            Some(reg) => Err(range_error(
                &format!("Register {reg} out of range"),
                mnemonic,
            )),
            None => Err(range_error(&format!("Invalid register {val}"), mnemonic)),
        }
    }

    /// Skip offset, 0..=63.
    pub fn offset(&self, val: Value, mnemonic: &str) -> CoerceResult {
        match val.whole() {
            Some(oft) if (0..=M6 as i64).contains(&oft) => Ok(Coerced::exact(oft as u32)),
            Some(oft) => Err(range_error(&format!("Offset {oft} out of range"), mnemonic)),
            None => Err(range_error(&format!("Invalid offset {val}"), mnemonic)),
        }
    }

    /// Skip condition bits, 0..=31.
    pub fn condition(&self, val: Value, mnemonic: &str) -> CoerceResult {
        match val.whole() {
            Some(cond) if (0..=M5 as i64).contains(&cond) => Ok(Coerced::exact(cond as u32)),
            Some(cond) => Err(range_error(
                &format!("Condition {cond} out of range"),
                mnemonic,
            )),
            None => Err(range_error(&format!("Invalid condition {val}"), mnemonic)),
        }
    }

    /// LFO selector, 0..=3.
    pub fn lfo(&self, val: Value, mnemonic: &str) -> CoerceResult {
        match val.whole() {
            Some(lfo) if (0..=3).contains(&lfo) => Ok(Coerced::exact(lfo as u32)),
            _ => Err(range_error(&format!("Invalid LFO {val}"), mnemonic)),
        }
    }

    /// Sine LFO frequency, 0..=511, clampable.
    pub fn sin_freq(&self, val: Value, mnemonic: &str) -> CoerceResult {
        let Some(freq) = val.whole() else {
            return Err(range_error(&format!("Invalid frequency {val}"), mnemonic));
        };
        if (0..=M9 as i64).contains(&freq) {
            return Ok(Coerced::exact(freq as u32));
        }
        if self.clamp {
            let clamped = freq.clamp(0, M9 as i64);
            Ok(Coerced {
                value: clamped as u32,
                warning: Some(format!(
                    "Frequency clamped to {clamped:#x} for {mnemonic}"
                )),
            })
        } else {
            Err(range_error(&format!("Invalid frequency {freq}"), mnemonic))
        }
    }

    /// Ramp LFO frequency: reals scale by 32768, integers pass through.
    pub fn ramp_freq(&self, val: Value, mnemonic: &str) -> CoerceResult {
        let x = val.as_real();
        if (-0.5..=S_15.max).contains(&x) {
            let conv = (x * S_15.reference).round() as i64;
            return Ok(Coerced::exact((conv & M16 as i64) as u32));
        }
        let freq = x.round() as i64;
        if (-0x8000..=M15 as i64).contains(&freq) {
            return Ok(Coerced::exact((freq & M16 as i64) as u32));
        }
        if self.clamp {
            let clamped = freq.clamp(-0x8000, M15 as i64);
            Ok(Coerced {
                value: (clamped & M16 as i64) as u32,
                warning: Some(format!(
                    "Frequency clamped to {clamped:#x} for {mnemonic}"
                )),
            })
        } else {
            Err(range_error(&format!("Invalid frequency {freq}"), mnemonic))
        }
    }

    /// Ramp LFO amplitude: 4096/2048/1024/512 samples, or the raw code.
    pub fn ramp_amp(&self, val: Value, mnemonic: &str) -> CoerceResult {
        let amp = match val.whole() {
            Some(4096) | Some(0) => 0,
            Some(2048) | Some(1) => 1,
            Some(1024) | Some(2) => 2,
            Some(512) | Some(3) => 3,
            _ => {
                return Err(range_error(&format!("Invalid amplitude {val}"), mnemonic));
            }
        };
        Ok(Coerced::exact(amp))
    }

    /// `cho` flag bits, 0..=63, masked down to the bits meaningful for the
    /// selected LFO family.
    pub fn cho_flags(&self, val: Value, lfo: u32) -> CoerceResult {
        let Some(flags) = val.whole() else {
            return Err(range_error(&format!("Invalid flags {val}"), "CHO"));
        };
        if !(0..=M6 as i64).contains(&flags) {
            return Err(range_error(&format!("Invalid flags {flags}"), "CHO"));
        }
        let flags = flags as u32;
        let (masked, family) = if lfo & 0x02 != 0 {
            (flags & 0x3e, "RMP")
        } else {
            (flags & 0x0f, "SIN")
        };
        if masked != flags {
            Ok(Coerced {
                value: masked,
                warning: Some(format!("{family} flags set to {masked:#x} for CHO")),
            })
        } else {
            Ok(Coerced::exact(masked))
        }
    }

    /// 15-bit delay address: reals inside the S_15 range scale by 32768,
    /// everything else rounds to a plain sample offset.
    pub fn d_15(&self, val: Value, mnemonic: &str) -> CoerceResult {
        let x = val.as_real();
        if (S_15.min..=S_15.max).contains(&x) {
            let conv = (x * S_15.reference).round() as i64;
            return Ok(Coerced::exact((conv & M15 as i64) as u32));
        }
        let addr = x.round() as i64;
        if (-0x8000..=M15 as i64).contains(&addr) {
            return Ok(Coerced::exact((addr & M15 as i64) as u32));
        }
        if self.clamp {
            let clamped = addr.clamp(-0x8000, M15 as i64);
            Ok(Coerced {
                value: (clamped & M15 as i64) as u32,
                warning: Some(format!("Address clamped to {clamped:#x} for {mnemonic}")),
            })
        } else {
            Err(range_error(&format!("Invalid address {addr}"), mnemonic))
        }
    }

    /// Raw 32-bit word.
    pub fn u_32(&self, val: Value, mnemonic: &str) -> CoerceResult {
        match val {
            Value::Int(word) => {
                if (-(1i64 << 31)..=M32 as i64).contains(&word) {
                    return Ok(Coerced::exact((word & M32 as i64) as u32));
                }
                if self.clamp {
                    let clamped = word.clamp(0, M32 as i64);
                    Ok(Coerced {
                        value: clamped as u32,
                        warning: Some(format!(
                            "U_32 arg clamped to {clamped:#x} for {mnemonic}"
                        )),
                    })
                } else {
                    Err(range_error(
                        &format!("U_32 arg {word} out of range"),
                        mnemonic,
                    ))
                }
            }
            Value::Real(_) => Err(range_error(&format!("Invalid U_32 arg {val}"), mnemonic)),
        }
    }

    pub fn s1_14(&self, val: Value, mnemonic: &str) -> CoerceResult {
        self.value_field(val, &S1_14, mnemonic)
    }

    pub fn s_10(&self, val: Value, mnemonic: &str) -> CoerceResult {
        self.value_field(val, &S_10, mnemonic)
    }

    pub fn s1_9(&self, val: Value, mnemonic: &str) -> CoerceResult {
        self.value_field(val, &S1_9, mnemonic)
    }

    pub fn s4_6(&self, val: Value, mnemonic: &str) -> CoerceResult {
        self.value_field(val, &S4_6, mnemonic)
    }

    pub fn s_23(&self, val: Value, mnemonic: &str) -> CoerceResult {
        self.value_field(val, &S_23, mnemonic)
    }

    /// 16-bit `cho` address. Under spinreals, whole reals demote back to
    /// integers so promoted address literals keep their sample meaning.
    pub fn s_15(&self, val: Value, mnemonic: &str) -> CoerceResult {
        let val = match val {
            Value::Real(r) if self.spinreals && r.fract() == 0.0 => match val.whole() {
                Some(i) => Value::Int(i),
                None => val,
            },
            _ => val,
        };
        self.value_field(val, &S_15, mnemonic)
    }

    /// Coerce into a value-shaped field: reals convert to fixed point,
    /// integers land as two's complement within the field mask.
    fn value_field(&self, val: Value, fmt: &FixedFormat, mnemonic: &str) -> CoerceResult {
        let mask = field_mask(fmt.bits);
        match val {
            Value::Int(arg) => {
                let max = mask as i64;
                let min = -(1i64 << (fmt.bits - 1));
                if (min..=max).contains(&arg) {
                    return Ok(Coerced::exact((arg & max) as u32));
                }
                if self.clamp {
                    let clamped = arg.clamp(min, max);
                    Ok(Coerced {
                        value: (clamped & max) as u32,
                        warning: Some(format!(
                            "{} arg clamped to {:#x} for {}",
                            fmt.name,
                            (clamped & max),
                            mnemonic
                        )),
                    })
                } else {
                    Err(range_error(
                        &format!("{} arg {} out of range", fmt.name, arg),
                        mnemonic,
                    ))
                }
            }
            Value::Real(arg) => {
                let (arg, warning) = if (fmt.min..=fmt.max).contains(&arg) {
                    (arg, None)
                } else if self.clamp {
                    let clamped = arg.clamp(fmt.min, fmt.max);
                    (
                        clamped,
                        Some(format!(
                            "{} arg clamped to {} for {}",
                            fmt.name, clamped, mnemonic
                        )),
                    )
                } else {
                    return Err(range_error(
                        &format!("{} arg {} out of range", fmt.name, arg),
                        mnemonic,
                    ));
                };
                let conv = (arg * fmt.reference).round() as i64;
                Ok(Coerced {
                    value: (conv & mask as i64) as u32,
                    warning,
                })
            }
        }
    }
}

fn field_mask(bits: u32) -> u32 {
    if bits >= 32 {
        M32
    } else {
        (1u32 << bits) - 1
    }
}

fn range_error(msg: &str, mnemonic: &str) -> AsmError {
    AsmError::new(
        AsmErrorKind::Instruction,
        &format!("{msg} for {mnemonic}"),
        None,
    )
}
