//! Structural parser for bracketed list literals such as `['pop', "r&b", 3]`.

use roster_core::quote_literal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("trailing input at offset {0}")]
    Trailing(usize),
    #[error("value is not a list")]
    NotAList,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(String),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
}

impl Literal {
    /// Text form of an element as it appears once pulled out of the list.
    fn display(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    fn repr(&self) -> String {
        match self {
            Self::Str(s) => quote_literal(s),
            Self::Int(digits) => digits.clone(),
            Self::Float(value) => format_float(*value),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::None => "None".to_string(),
            Self::List(items) => format!(
                "[{}]",
                items.iter().map(Literal::repr).collect::<Vec<_>>().join(", ")
            ),
            Self::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Self::Tuple(items) => format!(
                "({})",
                items.iter().map(Literal::repr).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Parses `input` as a list literal and returns the text form of each element.
pub fn parse_list_literal(input: &str) -> Result<Vec<String>, LiteralError> {
    let mut parser = Parser {
        chars: input.char_indices().collect(),
        pos: 0,
    };
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if let Some(&(offset, _)) = parser.chars.get(parser.pos) {
        return Err(LiteralError::Trailing(offset));
    }
    match value {
        Literal::List(items) => Ok(items.iter().map(Literal::display).collect()),
        _ => Err(LiteralError::NotAList),
    }
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.peek();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some((_, c)) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        let (offset, ch) = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        match ch {
            '[' => {
                self.pos += 1;
                self.sequence(']').map(Literal::List)
            }
            '(' => {
                self.pos += 1;
                self.sequence(')').map(Literal::Tuple)
            }
            '\'' | '"' => self.string(),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_ascii_alphabetic() => {
                let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                match word.as_str() {
                    "True" => Ok(Literal::Bool(true)),
                    "False" => Ok(Literal::Bool(false)),
                    "None" => Ok(Literal::None),
                    _ => Err(LiteralError::Unexpected { found: ch, offset }),
                }
            }
            found => Err(LiteralError::Unexpected { found, offset }),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Vec<Literal>, LiteralError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(LiteralError::UnexpectedEnd),
                Some((_, c)) if c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                None => return Err(LiteralError::UnexpectedEnd),
                Some((_, ',')) => {}
                Some((_, c)) if c == close => return Ok(items),
                Some((offset, found)) => return Err(LiteralError::Unexpected { found, offset }),
            }
        }
    }

    fn string(&mut self) -> Result<Literal, LiteralError> {
        let (start, quote) = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            let (offset, ch) = self.bump().ok_or(LiteralError::UnterminatedString(start))?;
            match ch {
                c if c == quote => return Ok(Literal::Str(out)),
                '\n' => return Err(LiteralError::UnterminatedString(start)),
                '\\' => {
                    let (_, esc) = self.bump().ok_or(LiteralError::UnterminatedString(start))?;
                    match esc {
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        '0' => out.push('\0'),
                        '\n' => {}
                        'x' => {
                            let hex: String = (0..2).filter_map(|_| self.bump().map(|(_, c)| c)).collect();
                            let code = u32::from_str_radix(&hex, 16)
                                .map_err(|_| LiteralError::InvalidEscape(offset))?;
                            out.push(char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))?);
                        }
                        // Unknown escapes are kept verbatim.
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Literal, LiteralError> {
        let (offset, first) = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        let text = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
        let cleaned = text.replace('_', "");
        let unsigned = cleaned.trim_start_matches(['-', '+']);
        let is_int = !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit());
        if is_int {
            if unsigned.len() > 1 && unsigned.starts_with('0') {
                return Err(LiteralError::Unexpected { found: first, offset });
            }
            let normalized = cleaned.trim_start_matches('+').to_string();
            let normalized = if normalized.trim_start_matches('-').bytes().all(|b| b == b'0') {
                "0".to_string()
            } else {
                normalized
            };
            return Ok(Literal::Int(normalized));
        }
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Literal::Float)
            .ok_or(LiteralError::Unexpected { found: first, offset })
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some((_, c)) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }
}
