//! Extended visual-format constraint strings.
//!
//! One constraint per line (lines may also be separated by `;`):
//!
//! ```text
//! ['identifier'] item.attribute  rel  item.attribute [* multiplier] [+|- constant] [@priority]
//! ['identifier'] item.attribute  rel  [-]constant [@priority]
//! ```
//!
//! - `rel` is one of `=`, `==`, `>=`, `<=`, `≥`, `≤`.
//! - The multiplier may be introduced by `*` or by a standalone `x`.
//! - `center` and `size` are shorthands that expand into the
//!   `centerX`/`centerY` and `width`/`height` pairs.
//! - Margin variants (`leftMargin`, `centerXWithinMargins`, ...) map onto the
//!   plain attribute.
//!
//! Items are names, not elements: resolving them against a graph is the
//! caller's job (see `ConstraintManager::set_constraints_from_string`).

use std::fmt;

use thiserror::Error;

use crate::domain::constraint::{LayoutAttribute, LayoutConstraint, Relation, PRIORITY_REQUIRED};
use crate::domain::element::ElementId;

/// Parse errors, tagged with the 1-based line they occurred on.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum FormatError {
    #[error("line {line}: unexpected character '{found}'")]
    UnexpectedCharacter { line: usize, found: char },

    #[error("line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: unknown attribute '{name}'")]
    UnknownAttribute { line: usize, name: String },

    #[error("line {line}: unknown element '{name}'")]
    UnknownElement { line: usize, name: String },

    #[error("line {line}: {reason}")]
    Invalid { line: usize, reason: String },
}

/// A constraint whose items are still names.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoConstraint {
    pub identifier: Option<String>,
    pub first_item: String,
    pub first_attribute: LayoutAttribute,
    pub relation: Relation,
    pub second_item: Option<String>,
    pub second_attribute: LayoutAttribute,
    pub multiplier: f64,
    pub constant: f64,
    pub priority: f32,
    /// Source line, for error reporting.
    pub line: usize,
}

impl PseudoConstraint {
    /// Describes `constraint` using `name_of` to name its items.
    pub fn from_constraint(
        constraint: &LayoutConstraint,
        name_of: impl Fn(ElementId) -> String,
    ) -> Self {
        Self {
            identifier: constraint.identifier.clone(),
            first_item: name_of(constraint.first_item),
            first_attribute: constraint.first_attribute,
            relation: constraint.relation,
            second_item: constraint.second_item.map(&name_of),
            second_attribute: constraint.second_attribute,
            multiplier: constraint.multiplier,
            constant: constraint.constant,
            priority: constraint.priority,
            line: 0,
        }
    }
}

impl fmt::Display for PseudoConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(identifier) = &self.identifier {
            write!(f, "'{identifier}' ")?;
        }
        write!(
            f,
            "{}.{} {} ",
            self.first_item,
            self.first_attribute,
            self.relation.symbol()
        )?;
        match &self.second_item {
            Some(second) => {
                write!(f, "{}.{}", second, self.second_attribute)?;
                if self.multiplier != 1.0 {
                    write!(f, " * {}", number(self.multiplier))?;
                }
                if self.constant > 0.0 {
                    write!(f, " + {}", number(self.constant))?;
                } else if self.constant < 0.0 {
                    write!(f, " - {}", number(-self.constant))?;
                }
            }
            None => write!(f, "{}", number(self.constant))?,
        }
        if self.priority != PRIORITY_REQUIRED {
            write!(f, " @{}", number(f64::from(self.priority)))?;
        }
        Ok(())
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Parses every line of `format`, expanding shorthands.
///
/// Blank lines and lines starting with `//` are skipped.
pub fn parse(format: &str) -> Result<Vec<PseudoConstraint>, FormatError> {
    let mut out = Vec::new();
    for (index, raw) in format.lines().enumerate() {
        for statement in raw.split(';') {
            let statement = statement.trim();
            if statement.is_empty() || statement.starts_with("//") {
                continue;
            }
            out.extend(parse_line(statement, index + 1)?);
        }
    }
    Ok(out)
}

/// Parses a single statement.  `line` is only used in errors.
pub fn parse_line(statement: &str, line: usize) -> Result<Vec<PseudoConstraint>, FormatError> {
    let tokens = tokenize(statement, line)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        line,
    };
    let raw = parser.statement()?;
    raw.expand(line)
}

/// Prints `constraints` one per line.
pub fn print(constraints: &[PseudoConstraint]) -> String {
    constraints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tokenizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Quoted(String),
    Name(String),
    Number(f64),
    Dot,
    Relation(Relation),
    Star,
    Plus,
    Minus,
    At,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Quoted(s) => write!(f, "'{s}'"),
            Token::Name(s) => write!(f, "{s}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::Dot => f.write_str("."),
            Token::Relation(r) => f.write_str(r.symbol()),
            Token::Star => f.write_str("*"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::At => f.write_str("@"),
        }
    }
}

fn tokenize(input: &str, line: usize) -> Result<Vec<Token>, FormatError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|x| *x == c)
                    .ok_or(FormatError::UnexpectedToken {
                        line,
                        expected: "closing quote",
                        found: "end of line".into(),
                    })?;
                tokens.push(Token::Quoted(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            '.' if chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())
                && !matches!(tokens.last(), Some(Token::Name(_))) =>
            {
                let (n, len) = read_number(&chars[i..], line)?;
                tokens.push(Token::Number(n));
                i += len;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            '≥' | '≤' => {
                let symbol = c.to_string();
                if let Some(r) = Relation::from_symbol(&symbol) {
                    tokens.push(Token::Relation(r));
                }
                i += 1;
            }
            '=' | '>' | '<' => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                if let Some(r) = Relation::from_symbol(&two) {
                    tokens.push(Token::Relation(r));
                    i += 2;
                } else if c == '=' {
                    tokens.push(Token::Relation(Relation::Equal));
                    i += 1;
                } else {
                    return Err(FormatError::UnexpectedCharacter { line, found: c });
                }
            }
            c if c.is_ascii_digit() => {
                let (n, len) = read_number(&chars[i..], line)?;
                tokens.push(Token::Number(n));
                i += len;
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|x| x.is_alphanumeric() || **x == '_')
                    .count();
                tokens.push(Token::Name(chars[i..i + len].iter().collect()));
                i += len;
            }
            other => return Err(FormatError::UnexpectedCharacter { line, found: other }),
        }
    }
    Ok(tokens)
}

fn read_number(chars: &[char], line: usize) -> Result<(f64, usize), FormatError> {
    let len = chars
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == '.')
        .count();
    let text: String = chars[..len].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, len))
        .map_err(|_| FormatError::UnexpectedToken {
            line,
            expected: "number",
            found: text,
        })
}

// ── Parser ───────────────────────────────────────────────────────────────────

/// Attribute as written, before shorthand expansion.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Written {
    Plain(LayoutAttribute),
    Center,
    Size,
}

impl Written {
    fn parse(name: &str, line: usize) -> Result<Self, FormatError> {
        match name {
            "center" => Ok(Written::Center),
            "size" => Ok(Written::Size),
            other => LayoutAttribute::from_name(other)
                .filter(|a| *a != LayoutAttribute::NotAnAttribute)
                .map(Written::Plain)
                .ok_or_else(|| FormatError::UnknownAttribute {
                    line,
                    name: other.to_string(),
                }),
        }
    }

    fn parts(&self) -> Vec<LayoutAttribute> {
        match self {
            Written::Plain(a) => vec![*a],
            Written::Center => vec![LayoutAttribute::CenterX, LayoutAttribute::CenterY],
            Written::Size => vec![LayoutAttribute::Width, LayoutAttribute::Height],
        }
    }
}

struct RawStatement {
    identifier: Option<String>,
    first_item: String,
    first_attribute: Written,
    relation: Relation,
    second: Option<(String, Written)>,
    multiplier: f64,
    constant: f64,
    priority: f32,
}

impl RawStatement {
    fn expand(self, line: usize) -> Result<Vec<PseudoConstraint>, FormatError> {
        let firsts = self.first_attribute.parts();
        let seconds = match &self.second {
            Some((_, written)) => written.parts(),
            None => vec![LayoutAttribute::NotAnAttribute; firsts.len()],
        };
        if firsts.len() != seconds.len() {
            return Err(FormatError::Invalid {
                line,
                reason: "shorthand attributes must appear on both sides".into(),
            });
        }
        if self.second.is_none() && self.first_attribute == Written::Center {
            return Err(FormatError::Invalid {
                line,
                reason: "center cannot be fixed to a constant".into(),
            });
        }
        Ok(firsts
            .into_iter()
            .zip(seconds)
            .map(|(first_attribute, second_attribute)| PseudoConstraint {
                identifier: self.identifier.clone(),
                first_item: self.first_item.clone(),
                first_attribute,
                relation: self.relation,
                second_item: self.second.as_ref().map(|(name, _)| name.clone()),
                second_attribute,
                multiplier: self.multiplier,
                constant: self.constant,
                priority: self.priority,
                line,
            })
            .collect())
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn unexpected(&self, expected: &'static str, found: Option<Token>) -> FormatError {
        FormatError::UnexpectedToken {
            line: self.line,
            expected,
            found: found.map_or_else(|| "end of line".to_string(), |t| t.to_string()),
        }
    }

    fn name(&mut self, expected: &'static str) -> Result<String, FormatError> {
        match self.next() {
            Some(Token::Name(n)) => Ok(n),
            other => Err(self.unexpected(expected, other)),
        }
    }

    fn number(&mut self) -> Result<f64, FormatError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            other => Err(self.unexpected("number", other)),
        }
    }

    fn item_attribute(&mut self) -> Result<(String, Written), FormatError> {
        let item = self.name("element name")?;
        match self.next() {
            Some(Token::Dot) => {}
            other => return Err(self.unexpected("'.'", other)),
        }
        let attribute = self.name("attribute")?;
        Ok((item, Written::parse(&attribute, self.line)?))
    }

    fn statement(&mut self) -> Result<RawStatement, FormatError> {
        let identifier = match self.peek() {
            Some(Token::Quoted(_)) => match self.next() {
                Some(Token::Quoted(s)) => Some(s),
                _ => None,
            },
            _ => None,
        };
        let (first_item, first_attribute) = self.item_attribute()?;
        let relation = match self.next() {
            Some(Token::Relation(r)) => r,
            other => return Err(self.unexpected("relation", other)),
        };

        let mut second = None;
        let mut multiplier = 1.0;
        let mut constant = 0.0;
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                constant = -self.number()?;
            }
            Some(Token::Number(_)) => constant = self.number()?,
            _ => {
                second = Some(self.item_attribute()?);
                let is_multiplier = match self.peek() {
                    Some(Token::Star) => true,
                    Some(Token::Name(n)) => n == "x",
                    _ => false,
                };
                if is_multiplier {
                    self.next();
                    multiplier = self.number()?;
                }
                match self.peek() {
                    Some(Token::Plus) => {
                        self.next();
                        constant = self.number()?;
                    }
                    Some(Token::Minus) => {
                        self.next();
                        constant = -self.number()?;
                    }
                    _ => {}
                }
            }
        }

        let mut priority = PRIORITY_REQUIRED;
        if let Some(Token::At) = self.peek() {
            self.next();
            priority = self.number()? as f32;
            if !(1.0..=PRIORITY_REQUIRED).contains(&priority) {
                return Err(FormatError::Invalid {
                    line: self.line,
                    reason: format!("priority {priority} outside 1..=1000"),
                });
            }
        }

        if let Some(extra) = self.next() {
            return Err(self.unexpected("end of line", Some(extra)));
        }

        Ok(RawStatement {
            identifier,
            first_item,
            first_attribute,
            relation,
            second,
            multiplier,
            constant,
            priority,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
