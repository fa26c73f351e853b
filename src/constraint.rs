//! Evaluation of `version_constraint` expressions.
//!
//! ```text
//! expr    := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | primary
//! primary := "true" | "false" | "(" expr ")"
//!          | "semver(" STRING ")"
//!          | "Version" ("==" | "!=") STRING
//! ```

use semver::{Version, VersionReq};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Not,
    And,
    Or,
    Eq,
    Ne,
}

/// Evaluates `expression` for the package version `version`.
pub fn evaluate(expression: &str, version: &str) -> Result<bool> {
    let fail = |reason: String| Error::ConstraintEval {
        expression: expression.to_string(),
        reason,
    };
    let tokens = tokenize(expression).map_err(fail)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        version,
    };
    let value = parser.expr().map_err(fail)?;
    if parser.pos != parser.tokens.len() {
        return Err(fail(format!("unexpected token {:?}", parser.tokens[parser.pos])));
    }
    Ok(value)
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err("expected `==`".to_string());
                }
                tokens.push(Token::Eq);
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if_eq(&c).is_none() {
                    return Err(format!("expected `{c}{c}`"));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
                    ident.push(ch);
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    version: &'a str,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn expr(&mut self) -> ParseResult<bool> {
        let mut value = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> ParseResult<bool> {
        let mut value = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn unary(&mut self) -> ParseResult<bool> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(!self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<bool> {
        match self.next() {
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                "semver" => {
                    self.expect(Token::LParen)?;
                    let req = self.string()?;
                    self.expect(Token::RParen)?;
                    self.semver(&req)
                }
                "Version" => match self.next() {
                    Some(Token::Eq) => Ok(self.string()? == self.version),
                    Some(Token::Ne) => Ok(self.string()? != self.version),
                    _ => Err("expected `==` or `!=` after Version".to_string()),
                },
                other => Err(format!("unknown identifier `{other}`")),
            },
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn string(&mut self) -> ParseResult<String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err("expected a string literal".to_string()),
        }
    }

    fn semver(&self, req: &str) -> ParseResult<bool> {
        let req = VersionReq::parse(req).map_err(|e| format!("invalid version requirement `{req}`: {e}"))?;
        let raw = self.version.strip_prefix('v').unwrap_or(self.version);
        let version = Version::parse(raw).map_err(|e| format!("version `{}` isn't semver: {e}", self.version))?;
        Ok(req.matches(&version))
    }
}
