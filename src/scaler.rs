//! Gear-score scaling for perk descriptions.
//!
//! Descriptions embed placeholders shaped `{[expr]}` or `${expr}` (treated the
//! same). `expr` is arithmetic over numbers and `perkMultiplier`, with `+ - * /`
//! (also `×` and `÷`), parentheses, and the functions `abs`, `min`, `max` and
//! `round`. Nothing else is reachable from an expression. An expression that
//! never mentions `perkMultiplier` is multiplied by it anyway.

use thiserror::Error;

pub const BASE_GEAR_SCORE: f64 = 500.0;
const MULTIPLIER_IDENT: &str = "perkmultiplier";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("{name} takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("result is not a finite number")]
    NonFinite,
}

/// Replace every placeholder in `text` with its value at `gear_score`. Broken expressions become an
/// inline `[scale-error: ...]` token; the rest of the text is untouched.
pub fn scale_description(text: &str, gear_score: f64) -> String {
    let multiplier = gear_score / BASE_GEAR_SCORE;
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some((start, open_len, close)) = next_placeholder(rest) {
        out.push_str(&rest[..start]);
        let body_start = start + open_len;
        let Some(close_offset) = rest[body_start..].find(close) else {
            // Unclosed opener stays literal; a later placeholder may still close.
            out.push_str(&rest[start..body_start]);
            rest = &rest[body_start..];
            continue;
        };
        let expr = &rest[body_start..body_start + close_offset];
        match evaluate(expr, multiplier) {
            Ok(value) => out.push_str(&format_number(value)),
            Err(_) => {
                out.push_str("[scale-error: ");
                out.push_str(expr.trim());
                out.push(']');
            }
        }
        rest = &rest[body_start + close_offset + close.len()..];
    }
    out.push_str(rest);
    out
}

/// Earliest placeholder opener in `text`: (byte offset, opener length, closer).
fn next_placeholder(text: &str) -> Option<(usize, usize, &'static str)> {
    let bracket = text.find("{[").map(|pos| (pos, 2, "]}"));
    let dollar = text.find("${").map(|pos| (pos, 2, "}"));
    match (bracket, dollar) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Evaluate `expr` with `perkMultiplier = multiplier`.
pub fn evaluate(expr: &str, multiplier: f64) -> Result<f64, ScaleError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        multiplier,
        uses_multiplier: false,
    };
    let value = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(ScaleError::UnexpectedToken(format!("{token:?}")));
    }
    let value = if parser.uses_multiplier { value } else { value * multiplier };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScaleError::NonFinite)
    }
}

/// Integers print bare; everything else gets at most three decimals, trailing zeros dropped.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        let whole = rounded as i64;
        return whole.to_string();
    }
    let fixed = format!("{rounded:.3}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ScaleError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ScaleError::UnexpectedToken(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                let token = match other {
                    '+' => Token::Plus,
                    '-' | '−' => Token::Minus,
                    '*' | '×' => Token::Star,
                    '/' | '÷' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    unexpected => return Err(ScaleError::UnexpectedChar(unexpected)),
                };
                tokens.push(token);
                chars.next();
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    multiplier: f64,
    uses_multiplier: bool,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ScaleError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ScaleError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ScaleError::UnexpectedEnd),
        }
    }

    fn expression(&mut self) -> Result<f64, ScaleError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.position += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.position += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ScaleError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.position += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.position += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(ScaleError::NonFinite);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ScaleError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.position += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.position += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, ScaleError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => self.identifier(name),
            Some(token) => Err(ScaleError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ScaleError::UnexpectedEnd),
        }
    }

    fn identifier(&mut self, name: String) -> Result<f64, ScaleError> {
        let lowered = name.to_ascii_lowercase();
        if lowered == MULTIPLIER_IDENT {
            self.uses_multiplier = true;
            return Ok(self.multiplier);
        }
        if !matches!(lowered.as_str(), "abs" | "min" | "max" | "round") {
            return Err(ScaleError::UnknownIdentifier(name));
        }

        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(token) => return Err(ScaleError::UnexpectedToken(format!("{token:?}"))),
                    None => return Err(ScaleError::UnexpectedEnd),
                }
            }
        } else {
            self.position += 1;
        }

        let arity = |expected: &'static str| ScaleError::Arity {
            name: lowered.clone(),
            expected,
            got: args.len(),
        };
        match (lowered.as_str(), args.as_slice()) {
            ("abs", [x]) => Ok(x.abs()),
            ("abs", _) => Err(arity("1")),
            ("round", [x]) => Ok(x.round()),
            ("round", [x, digits]) => {
                let factor = 10f64.powi(digits.round() as i32);
                Ok((x * factor).round() / factor)
            }
            ("round", _) => Err(arity("1 or 2")),
            ("min", [first, rest @ ..]) => Ok(rest.iter().fold(*first, |acc, v| acc.min(*v))),
            ("max", [first, rest @ ..]) => Ok(rest.iter().fold(*first, |acc, v| acc.max(*v))),
            _ => Err(arity("at least 1")),
        }
    }
}
