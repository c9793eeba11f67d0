//! Python literal values.
//!
//! The drying table and every value in `mmu_vars.cfg` are written as Python
//! literals (`{'pla': (45, 300)}`, `[1, 2.5, -1]`, `'string'`, `True`, `None`).
//! [`Literal::parse`] reads them; `Display` writes them back in `repr` form.

use std::fmt;

use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    /// Insertion order and duplicate keys are kept; callers decide which wins.
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Parse a complete literal. Trailing input other than whitespace is an error.
    pub fn parse(text: &str) -> Result<Literal, AppError> {
        let mut p = Parser {
            src: text,
            pos: 0,
            depth: 0,
        };
        p.skip_ws();
        let value = p.value()?;
        p.skip_ws();
        if p.pos != text.len() {
            return Err(p.error("unexpected trailing input"));
        }
        Ok(value)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Ints widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Literal::Float(f) => Some(*f),
            Literal::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn as_items(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) | Literal::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Literal, Literal)]> {
        match self {
            Literal::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Literal::None)
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::None => "None",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::Str(_) => "str",
            Literal::List(_) => "list",
            Literal::Tuple(_) => "tuple",
            Literal::Dict(_) => "dict",
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Str(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Str(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl<T: Into<Literal>> From<Vec<T>> for Literal {
    fn from(v: Vec<T>) -> Self {
        Literal::List(v.into_iter().map(Into::into).collect())
    }
}

// ── repr ────────────────────────────────────────────────────────────────────

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write_float(f, *x),
            Literal::Str(s) => write_str_repr(f, s),
            Literal::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Literal::Tuple(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Literal::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Literal]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        f.write_str("nan")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "inf" } else { "-inf" })
    } else {
        f.write_str(&float_repr(x))
    }
}

/// Shortest round-trip digits, positional for exponents in `-4..16` and
/// `1e+20` / `1.5e-05` style otherwise.
fn float_repr(x: f64) -> String {
    let sci = format!("{x:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..16).contains(&exp) {
        let (first, rest) = digits.split_at(1);
        let dot = if rest.is_empty() { "" } else { "." };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{first}{dot}{rest}e{exp_sign}{:02}", exp.abs());
    }

    // Digits before the decimal point.
    let point = exp + 1;
    if point <= 0 {
        format!("{sign}0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{sign}{digits}{}.0", "0".repeat(point as usize - digits.len()))
    } else {
        let (int, frac) = digits.split_at(point as usize);
        format!("{sign}{int}.{frac}")
    }
}

fn write_str_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    write!(f, "{quote}")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => write!(f, "\\{c}")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "{quote}")
}

// ── parser ──────────────────────────────────────────────────────────────────

/// Containers nested deeper than this are rejected instead of recursing further.
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> AppError {
        AppError::Literal(format!("{message} at offset {} in '{}'", self.pos, self.src))
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<(), AppError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            _ => Err(self.error(&format!("expected '{want}'"))),
        }
    }

    fn value(&mut self) -> Result<Literal, AppError> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(c @ ('{' | '[' | '(')) => {
                if self.depth >= MAX_DEPTH {
                    return Err(self.error("nesting too deep"));
                }
                self.depth += 1;
                let nested = match c {
                    '{' => self.dict(),
                    '[' => self.seq('[', ']').map(Literal::List),
                    _ => self.tuple(),
                };
                self.depth -= 1;
                nested
            }
            Some(q @ ('\'' | '"')) => self.string(q).map(Literal::Str),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
        }
    }

    fn dict(&mut self) -> Result<Literal, AppError> {
        self.expect('{')?;
        let mut pairs = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Literal::Dict(pairs));
            }
            let key = self.value()?;
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value()?;
            pairs.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Literal::Dict(pairs)),
                _ => return Err(self.error("expected ',' or '}' in dict")),
            }
        }
    }

    fn seq(&mut self, open: char, close: char) -> Result<Vec<Literal>, AppError> {
        self.expect(open)?;
        self.items(Vec::new(), close)
    }

    /// Remaining items of a sequence whose opening bracket is consumed.
    fn items(&mut self, mut items: Vec<Literal>, close: char) -> Result<Vec<Literal>, AppError> {
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(items),
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    /// `(x)` is a parenthesised value, `(x,)` and `(x, y)` are tuples.
    fn tuple(&mut self) -> Result<Literal, AppError> {
        self.expect('(')?;
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Literal::Tuple(Vec::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        match self.bump() {
            Some(')') => Ok(first),
            Some(',') => self.items(vec![first], ')').map(Literal::Tuple),
            _ => Err(self.error("expected ',' or ')'")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, AppError> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Literal, AppError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let body_start = self.pos;
        if self.rest().starts_with("inf") {
            self.pos += 3;
            let neg = self.src[start..body_start].starts_with('-');
            return Ok(Literal::Float(if neg { f64::NEG_INFINITY } else { f64::INFINITY }));
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_') {
                self.bump();
            } else if matches!(c, '-' | '+')
                && matches!(self.src[..self.pos].chars().last(), Some('e' | 'E'))
            {
                self.bump();
            } else {
                break;
            }
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| self.error(&format!("invalid float '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| self.error(&format!("invalid integer '{text}'")))
        }
    }

    fn keyword(&mut self) -> Result<Literal, AppError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            "nan" => Ok(Literal::Float(f64::NAN)),
            "inf" => Ok(Literal::Float(f64::INFINITY)),
            other => {
                self.pos = start;
                Err(self.error(&format!("unknown name '{other}'")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(Literal::parse("300").unwrap(), Literal::Int(300));
        assert_eq!(Literal::parse("-1").unwrap(), Literal::Int(-1));
        assert_eq!(Literal::parse(" 2.5 ").unwrap(), Literal::Float(2.5));
        assert_eq!(Literal::parse("1e3").unwrap(), Literal::Float(1000.0));
        assert_eq!(Literal::parse("True").unwrap(), Literal::Bool(true));
        assert_eq!(Literal::parse("None").unwrap(), Literal::None);
        assert_eq!(Literal::parse("'pla+'").unwrap(), Literal::Str("pla+".into()));
        assert_eq!(Literal::parse("\"it's\"").unwrap(), Literal::Str("it's".into()));
    }

    #[test]
    fn drying_dict() {
        let lit = Literal::parse("{ 'pla': (45, 300), 'abs+': (75, 300) }").unwrap();
        let pairs = lit.as_dict().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, Literal::Str("pla".into()));
        assert_eq!(
            pairs[0].1,
            Literal::Tuple(vec![Literal::Int(45), Literal::Int(300)])
        );
        assert_eq!(pairs[1].0.as_str(), Some("abs+"));
    }

    #[test]
    fn nested_and_trailing_commas() {
        let lit = Literal::parse("[1, [2, 3,], {'a': None,},]").unwrap();
        let items = lit.as_items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_items().unwrap().len(), 2);
    }

    #[test]
    fn parenthesised_value_is_not_a_tuple() {
        assert_eq!(Literal::parse("(5)").unwrap(), Literal::Int(5));
        assert_eq!(
            Literal::parse("(5,)").unwrap(),
            Literal::Tuple(vec![Literal::Int(5)])
        );
    }

    #[test]
    fn errors() {
        assert!(Literal::parse("").is_err());
        assert!(Literal::parse("{'a' 1}").is_err());
        assert!(Literal::parse("[1, 2").is_err());
        assert!(Literal::parse("'open").is_err());
        assert!(Literal::parse("pla").is_err());
        assert!(Literal::parse("1 2").is_err());
    }

    #[test]
    fn repr_keeps_fractional_part() {
        let lit = Literal::parse("{'pla': (45, 300), 'x': [1.0, -1, True, None, (7,)]}").unwrap();
        assert_eq!(
            lit.to_string(),
            "{'pla': (45, 300), 'x': [1.0, -1, True, None, (7,)]}"
        );
        assert_eq!(Literal::Float(0.1).to_string(), "0.1");
        assert_eq!(Literal::Float(-0.0).to_string(), "-0.0");
        assert_eq!(Literal::Str("it's".into()).to_string(), "\"it's\"");
        assert_eq!(Literal::Str("a\\b".into()).to_string(), "'a\\\\b'");
    }

    #[test]
    fn float_exponents_match_python_repr() {
        let cases = [
            (1e20, "1e+20"),
            (1e16, "1e+16"),
            (1e-5, "1e-05"),
            (-1.5e-7, "-1.5e-07"),
            (2.5e300, "2.5e+300"),
            (0.0001, "0.0001"),
            (1.0, "1.0"),
            (0.0, "0.0"),
            (123.456, "123.456"),
            (123456789012345.0, "123456789012345.0"),
            (1e15, "1000000000000000.0"),
        ];
        for (x, expected) in cases {
            assert_eq!(Literal::Float(x).to_string(), expected, "{x}");
            assert_eq!(Literal::parse(expected).unwrap(), Literal::Float(x));
        }
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let deep = "[".repeat(10_000);
        let err = Literal::parse(&deep).unwrap_err();
        assert!(matches!(err, AppError::Literal(ref m) if m.contains("nesting too deep")));

        let ok = format!("{}1{}", "(".repeat(20), ",)".repeat(20));
        assert!(Literal::parse(&ok).is_ok());
    }

    #[test]
    fn widening_accessors() {
        assert_eq!(Literal::Int(3).as_float(), Some(3.0));
        assert_eq!(Literal::Float(3.5).as_int(), None);
        assert_eq!(Literal::Bool(true).as_int(), Some(1));
    }
}
