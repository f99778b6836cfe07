//! Query pattern micro-language.
//!
//! A pattern is literal SQL with two kinds of placeholder:
//!
//! - `{n}`: parameter `n`, rendered for the active dialect
//! - `{n,choice,0#...|1#...}`: one of two sub-patterns, selected by
//!   parameter `n` being `0`/`false` or `1`/`true`
//!
//! Sub-patterns may themselves contain placeholders. Patterns are parsed
//! once, when the template table is built, so a malformed pattern fails
//! at construction rather than at render time.

use std::fmt::Write;

use super::{Dialect, SqlParam};

/// A parsed pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(usize),
    Choice {
        index: usize,
        when_zero: Pattern,
        when_one: Pattern,
    },
}

impl Pattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns a description of the first syntax error.
    pub fn parse(text: &str) -> Result<Self, String> {
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0;
        let pattern = parse_until(&chars, &mut pos, &[])?;
        if pos != chars.len() {
            return Err(format!("unexpected '{}' at offset {pos}", chars[pos]));
        }
        Ok(pattern)
    }

    /// One past the highest parameter index referenced anywhere in the
    /// pattern, including unselected choice branches.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(_) => 0,
                Segment::Param(index) => index + 1,
                Segment::Choice {
                    index,
                    when_zero,
                    when_one,
                } => (index + 1).max(when_zero.arity()).max(when_one.arity()),
            })
            .max()
            .unwrap_or(0)
    }

    /// Renders the pattern with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if a parameter is missing or a
    /// choice selector is not `0`/`1`.
    pub fn render(&self, params: &[SqlParam], dialect: Dialect) -> Result<String, String> {
        let arity = self.arity();
        if arity > params.len() {
            return Err(format!(
                "pattern references parameter {} but only {} supplied",
                arity - 1,
                params.len()
            ));
        }
        let mut out = String::new();
        self.render_into(&mut out, params, dialect)?;
        Ok(out)
    }

    fn render_into(
        &self,
        out: &mut String,
        params: &[SqlParam],
        dialect: Dialect,
    ) -> Result<(), String> {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(index) => {
                    let _ = write!(out, "{}", params[*index].render(dialect));
                }
                Segment::Choice {
                    index,
                    when_zero,
                    when_one,
                } => {
                    let branch = match params[*index].selector() {
                        Some(false) => when_zero,
                        Some(true) => when_one,
                        None => {
                            return Err(format!(
                                "choice selector {index} must be 0 or 1, got {:?}",
                                params[*index]
                            ))
                        }
                    };
                    branch.render_into(out, params, dialect)?;
                }
            }
        }
        Ok(())
    }
}

fn parse_until(chars: &[char], pos: &mut usize, stops: &[char]) -> Result<Pattern, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();

    while *pos < chars.len() {
        let c = chars[*pos];
        if stops.contains(&c) {
            break;
        }
        if c == '{' {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            *pos += 1;
            segments.push(parse_placeholder(chars, pos)?);
        } else if c == '}' {
            return Err(format!("unmatched '}}' at offset {pos}"));
        } else {
            literal.push(c);
            *pos += 1;
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(Pattern { segments })
}

/// Parses the inside of `{...}`; `pos` is just past the opening brace.
fn parse_placeholder(chars: &[char], pos: &mut usize) -> Result<Segment, String> {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos == start {
        return Err(format!("expected parameter index at offset {start}"));
    }
    let index: usize = chars[start..*pos]
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|e| format!("bad parameter index at offset {start}: {e}"))?;

    match chars.get(*pos) {
        Some('}') => {
            *pos += 1;
            Ok(Segment::Param(index))
        }
        Some(',') => {
            *pos += 1;
            expect(chars, pos, "choice,0#")?;
            let when_zero = parse_until(chars, pos, &['|'])?;
            expect(chars, pos, "|1#")?;
            let when_one = parse_until(chars, pos, &['}'])?;
            expect(chars, pos, "}")?;
            Ok(Segment::Choice {
                index,
                when_zero,
                when_one,
            })
        }
        _ => Err(format!("unterminated placeholder at offset {start}")),
    }
}

fn expect(chars: &[char], pos: &mut usize, token: &str) -> Result<(), String> {
    for expected in token.chars() {
        if chars.get(*pos) != Some(&expected) {
            return Err(format!("expected '{token}' at offset {pos}"));
        }
        *pos += 1;
    }
    Ok(())
}
