// Scanner/tokenizer for FV-1 assembly source.

use std::fmt;

/// Token kinds produced by the scanner. Whether a `Name` is a mnemonic,
/// a directive keyword or a plain symbol is decided by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    Name,
    Operator(Op),
    Label,
    ArgSep,
    Eol,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Integer(_) => "INTEGER",
            TokenKind::Float(_) => "FLOAT",
            TokenKind::Name => "NAME",
            TokenKind::Operator(_) => "OPERATOR",
            TokenKind::Label => "LABEL",
            TokenKind::ArgSep => "ARGSEP",
            TokenKind::Eol => "EOL",
            TokenKind::Eof => "EOF",
        }
    }
}

/// Expression operators. `Int` is the rounding keyword, recognised in
/// operator position; `!` scans as `BitNot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Or,
    Xor,
    And,
    Shl,
    Shr,
    Plus,
    Minus,
    Mul,
    Div,
    IntDiv,
    Pow,
    BitNot,
    Int,
    OpenParen,
    CloseParen,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Lexeme text; case-folded to upper for `Name` and `Label` tokens.
    pub text: String,
    /// 1-based source line.
    pub line: u32,
}

/// Scan failure with source position.
#[derive(Debug, Clone)]
pub struct ScanError {
    pub message: String,
    pub line: u32,
    pub column: usize,
}

impl ScanError {
    fn new(message: impl Into<String>, line: u32, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScanError {}

pub struct Scanner<'a> {
    src: &'a [u8],
    cursor: usize,
    line: u32,
    line_start: usize,
    spinreals: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str, spinreals: bool) -> Self {
        Self {
            src: source.as_bytes(),
            cursor: 0,
            line: 1,
            line_start: 0,
            spinreals,
        }
    }

    /// Tokenize an entire source buffer. The returned stream always ends
    /// with a single `Eof` token.
    pub fn tokenize(source: &str, spinreals: bool) -> Result<Vec<Token>, ScanError> {
        let mut scanner = Scanner::new(source, spinreals);
        let mut tokens = Vec::new();
        loop {
            let token = scanner.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ScanError> {
        self.skip_blank_and_comments();

        let line = self.line;
        let c = self.current();
        if c == 0 && self.cursor >= self.src.len() {
            return Ok(self.token(TokenKind::Eof, "", line));
        }
        if c == b'\n' {
            self.cursor += 1;
            let token = self.token(TokenKind::Eol, "\n", line);
            self.line += 1;
            self.line_start = self.cursor;
            return Ok(token);
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.scan_identifier();
        }
        if c.is_ascii_digit() {
            return self.scan_number();
        }
        if c == b'$' {
            return self.scan_prefixed(16, "$");
        }
        if c == b'%' {
            return self.scan_prefixed(2, "%");
        }
        self.scan_operator()
    }

    fn scan_identifier(&mut self) -> Result<Token, ScanError> {
        let line = self.line;
        let mut text = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        text.make_ascii_uppercase();
        if text == "INT" {
            return Ok(self.token(TokenKind::Operator(Op::Int), &text, line));
        }
        // A directly abutting ^ or # is part of the identifier; a later
        // ^ in the stream is the XOR operator.
        let suffix = self.current();
        if suffix == b'^' || suffix == b'#' {
            text.push(suffix as char);
            self.cursor += 1;
        }
        if self.current() == b':' {
            self.cursor += 1;
            return Ok(self.token(TokenKind::Label, &text, line));
        }
        Ok(self.token(TokenKind::Name, &text, line))
    }

    fn scan_number(&mut self) -> Result<Token, ScanError> {
        let line = self.line;
        let column = self.column();
        let run = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');

        if run.len() >= 2 && (run.starts_with("0x") || run.starts_with("0X")) {
            let digits = &run[2..];
            if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(ScanError::new(
                    format!("Invalid integer literal {run}"),
                    line,
                    column,
                ));
            }
            let val = i64::from_str_radix(digits, 16).map_err(|_| {
                ScanError::new(format!("Invalid integer literal {run}"), line, column)
            })?;
            return Ok(self.token(TokenKind::Integer(val), &run, line));
        }

        if run.len() >= 2 && (run.starts_with("0b") || run.starts_with("0B")) {
            let digits: String = run[2..].chars().filter(|&c| c != '_').collect();
            if digits.is_empty() || !digits.bytes().all(|c| c == b'0' || c == b'1') {
                return Err(ScanError::new(
                    format!("Invalid integer literal {run}"),
                    line,
                    column,
                ));
            }
            let val = i64::from_str_radix(&digits, 2).map_err(|_| {
                ScanError::new(format!("Invalid integer literal {run}"), line, column)
            })?;
            return Ok(self.token(TokenKind::Integer(val), &run, line));
        }

        // Floats need a decimal point, or an exponent directly after digits.
        if self.current() == b'.' {
            self.cursor += 1;
            let mut text = run;
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            if matches!(self.current(), b'e' | b'E') {
                self.cursor += 1;
                text.push('e');
                self.scan_exponent(&mut text, line, column)?;
            }
            let val: f64 = text.parse().map_err(|_| {
                ScanError::new(format!("Invalid numeric literal {text}"), line, column)
            })?;
            return Ok(self.token(TokenKind::Float(val), &text, line));
        }

        if let Some(split) = run.bytes().position(|c| c == b'e' || c == b'E') {
            let (mantissa, exponent) = (&run[..split], &run[split + 1..]);
            if mantissa.is_empty() || !mantissa.bytes().all(|c| c.is_ascii_digit()) {
                return Err(ScanError::new(
                    format!("Invalid numeric literal {run}"),
                    line,
                    column,
                ));
            }
            let mut text = format!("{mantissa}e");
            if exponent.is_empty() {
                self.scan_exponent(&mut text, line, column)?;
            } else {
                if !exponent.bytes().all(|c| c.is_ascii_digit()) {
                    return Err(ScanError::new(
                        format!("Invalid numeric literal {run}"),
                        line,
                        column,
                    ));
                }
                text.push_str(exponent);
            }
            let val: f64 = text.parse().map_err(|_| {
                ScanError::new(format!("Invalid numeric literal {text}"), line, column)
            })?;
            return Ok(self.token(TokenKind::Float(val), &text, line));
        }

        if !run.bytes().all(|c| c.is_ascii_digit()) {
            return Err(ScanError::new(
                format!("Invalid integer literal {run}"),
                line,
                column,
            ));
        }
        let val: i64 = run
            .parse()
            .map_err(|_| ScanError::new(format!("Invalid integer literal {run}"), line, column))?;
        // SpinASM sources write the literals 1 and 2 meaning 1.0 and 2.0.
        if self.spinreals && (run == "1" || run == "2") {
            return Ok(self.token(TokenKind::Float(val as f64), &run, line));
        }
        Ok(self.token(TokenKind::Integer(val), &run, line))
    }

    fn scan_exponent(
        &mut self,
        text: &mut String,
        line: u32,
        column: usize,
    ) -> Result<(), ScanError> {
        if matches!(self.current(), b'+' | b'-') {
            text.push(self.current() as char);
            self.cursor += 1;
        }
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(ScanError::new(
                format!("Invalid numeric literal {text}"),
                line,
                column,
            ));
        }
        text.push_str(&digits);
        Ok(())
    }

    fn scan_prefixed(&mut self, base: u32, prefix: &str) -> Result<Token, ScanError> {
        let line = self.line;
        let column = self.column();
        self.cursor += 1;
        let run = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        if run.is_empty() {
            return Err(ScanError::new(
                "End of line scanning for integer",
                line,
                column,
            ));
        }
        let digits: String = run.chars().filter(|&c| c != '_').collect();
        let valid = !digits.is_empty()
            && digits
                .bytes()
                .all(|c| (c as char).to_digit(base).is_some());
        if !valid {
            return Err(ScanError::new(
                format!("Invalid integer literal {prefix}{run}"),
                line,
                column,
            ));
        }
        let val = i64::from_str_radix(&digits, base).map_err(|_| {
            ScanError::new(format!("Invalid integer literal {prefix}{run}"), line, column)
        })?;
        Ok(self.token(TokenKind::Integer(val), &format!("{prefix}{run}"), line))
    }

    fn scan_operator(&mut self) -> Result<Token, ScanError> {
        let line = self.line;
        let column = self.column();
        let c = self.current();
        self.cursor += 1;
        let (op, text): (Op, &str) = match c {
            b',' => return Ok(self.token(TokenKind::ArgSep, ",", line)),
            b'(' => (Op::OpenParen, "("),
            b')' => (Op::CloseParen, ")"),
            b'|' => (Op::Or, "|"),
            b'^' => (Op::Xor, "^"),
            b'&' => (Op::And, "&"),
            b'~' => (Op::BitNot, "~"),
            b'!' => (Op::BitNot, "!"),
            b'+' => (Op::Plus, "+"),
            b'-' => (Op::Minus, "-"),
            b'*' => {
                if self.current() == b'*' {
                    self.cursor += 1;
                    (Op::Pow, "**")
                } else {
                    (Op::Mul, "*")
                }
            }
            b'/' => {
                if self.current() == b'/' {
                    self.cursor += 1;
                    (Op::IntDiv, "//")
                } else {
                    (Op::Div, "/")
                }
            }
            b'<' => {
                if self.current() == b'<' {
                    self.cursor += 1;
                    (Op::Shl, "<<")
                } else {
                    return Err(ScanError::new("Invalid operator <", line, column));
                }
            }
            b'>' => {
                if self.current() == b'>' {
                    self.cursor += 1;
                    (Op::Shr, ">>")
                } else {
                    return Err(ScanError::new("Invalid operator >", line, column));
                }
            }
            _ => {
                return Err(ScanError::new(
                    format!("Unrecognised input {}", c as char),
                    line,
                    column,
                ));
            }
        };
        Ok(self.token(TokenKind::Operator(op), text, line))
    }

    fn skip_blank_and_comments(&mut self) {
        loop {
            match self.current() {
                b' ' | b'\t' | b'\r' => self.cursor += 1,
                // UTF-8 BOM left over from decoding.
                0xEF if self.src[self.cursor..].starts_with(&[0xEF, 0xBB, 0xBF]) => {
                    self.cursor += 3;
                }
                b';' => {
                    while self.current() != b'\n' && self.cursor < self.src.len() {
                        self.cursor += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.cursor;
        while self.cursor < self.src.len() && pred(self.src[self.cursor]) {
            self.cursor += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.cursor]).into_owned()
    }

    fn current(&self) -> u8 {
        self.src.get(self.cursor).copied().unwrap_or(0)
    }

    fn column(&self) -> usize {
        self.cursor - self.line_start + 1
    }

    fn token(&self, kind: TokenKind, text: &str, line: u32) -> Token {
        Token {
            kind,
            text: text.to_string(),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Op, Scanner, TokenKind};
    use proptest::prelude::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::tokenize(source, false)
            .expect("scan")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn label_and_mnemonic_tokens() {
        let tokens = Scanner::tokenize("start:\tskp run,main", false).expect("scan");
        assert_eq!(tokens[0].kind, TokenKind::Label);
        assert_eq!(tokens[0].text, "START");
        assert_eq!(tokens[1].kind, TokenKind::Name);
        assert_eq!(tokens[1].text, "SKP");
        assert_eq!(tokens[2].kind, TokenKind::Name);
        assert_eq!(tokens[3].kind, TokenKind::ArgSep);
        assert_eq!(tokens[4].kind, TokenKind::Name);
        assert_eq!(tokens[4].text, "MAIN");
        assert_eq!(tokens[5].kind, TokenKind::Eof);
    }

    #[test]
    fn integer_bases() {
        assert_eq!(kinds("42")[0], TokenKind::Integer(42));
        assert_eq!(kinds("0x2A")[0], TokenKind::Integer(42));
        assert_eq!(kinds("$2a")[0], TokenKind::Integer(42));
        assert_eq!(kinds("0b101010")[0], TokenKind::Integer(42));
        assert_eq!(kinds("%10_1010")[0], TokenKind::Integer(42));
        assert_eq!(kinds("0b10_10")[0], TokenKind::Integer(10));
    }

    #[test]
    fn float_needs_dot_or_exponent() {
        assert_eq!(kinds("1")[0], TokenKind::Integer(1));
        assert_eq!(kinds("1.")[0], TokenKind::Float(1.0));
        assert_eq!(kinds("1.0")[0], TokenKind::Float(1.0));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
        assert_eq!(kinds("1.5e+2")[0], TokenKind::Float(150.0));
        assert_eq!(kinds("2E-1")[0], TokenKind::Float(0.2));
    }

    #[test]
    fn bad_literals_are_errors() {
        assert!(Scanner::tokenize("0xZZ", false).is_err());
        assert!(Scanner::tokenize("0b12", false).is_err());
        assert!(Scanner::tokenize("$", false).is_err());
        assert!(Scanner::tokenize("12abc", false).is_err());
        assert!(Scanner::tokenize("1e", false).is_err());
    }

    #[test]
    fn caret_fuses_into_identifier() {
        let tokens = Scanner::tokenize("delay^^0xff", false).expect("scan");
        assert_eq!(tokens[0].kind, TokenKind::Name);
        assert_eq!(tokens[0].text, "DELAY^");
        assert_eq!(tokens[1].kind, TokenKind::Operator(Op::Xor));
        assert_eq!(tokens[2].kind, TokenKind::Integer(0xff));
    }

    #[test]
    fn hash_fuses_into_identifier() {
        let tokens = Scanner::tokenize("delay# 1", false).expect("scan");
        assert_eq!(tokens[0].text, "DELAY#");
        assert_eq!(tokens[1].kind, TokenKind::Integer(1));
    }

    #[test]
    fn comments_and_newlines() {
        let tokens = Scanner::tokenize("clr ; wipe acc\nor 1", false).expect("scan");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["CLR", "\n", "OR", "1", ""]);
        assert_eq!(tokens[1].kind, TokenKind::Eol);
        assert_eq!(tokens[2].line, 2);
    }

    #[test]
    fn int_keyword_is_an_operator() {
        let tokens = Scanner::tokenize("int 1.5", false).expect("scan");
        assert_eq!(tokens[0].kind, TokenKind::Operator(Op::Int));
    }

    #[test]
    fn bang_is_bitwise_not() {
        assert_eq!(kinds("!0")[0], TokenKind::Operator(Op::BitNot));
    }

    #[test]
    fn single_angle_bracket_is_an_error() {
        assert!(Scanner::tokenize("1 < 2", false).is_err());
        assert!(Scanner::tokenize("1 > 2", false).is_err());
        assert_eq!(kinds("1<<2")[1], TokenKind::Operator(Op::Shl));
        assert_eq!(kinds("1>>2")[1], TokenKind::Operator(Op::Shr));
    }

    #[test]
    fn spinreals_promotes_one_and_two() {
        let tokens = Scanner::tokenize("1,2,3,0x1", true).expect("scan");
        assert_eq!(tokens[0].kind, TokenKind::Float(1.0));
        assert_eq!(tokens[2].kind, TokenKind::Float(2.0));
        assert_eq!(tokens[4].kind, TokenKind::Integer(3));
        assert_eq!(tokens[6].kind, TokenKind::Integer(1));
    }

    #[test]
    fn scan_error_carries_position() {
        let err = Scanner::tokenize("clr\n  @", false).expect_err("bad char");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
    }

    proptest! {
        #[test]
        fn decimal_round_trip_u32(value in any::<u32>()) {
            let text = value.to_string();
            prop_assert_eq!(kinds(&text)[0].clone(), TokenKind::Integer(value as i64));
        }

        #[test]
        fn hex_round_trip_u32(value in any::<u32>()) {
            let text = format!("0x{:X}", value);
            prop_assert_eq!(kinds(&text)[0].clone(), TokenKind::Integer(value as i64));
        }

        #[test]
        fn binary_round_trip_u16(value in any::<u16>()) {
            let text = format!("%{:b}", value);
            prop_assert_eq!(kinds(&text)[0].clone(), TokenKind::Integer(value as i64));
        }
    }
}
