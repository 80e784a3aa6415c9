//! A small recursive-descent reader for the UCI config grammar used by
//! `original_source`'s deployment target (OpenWrt-style `/etc/config/*`
//! files): a flat sequence of `config TYPE ['NAME']` sections, each
//! followed by indented `option KEY 'VALUE'` (single-valued) and
//! `list KEY 'VALUE'` (multi-valued, repeatable) statements. Comments start
//! with `#` and run to end of line; values may be single- or
//! double-quoted, or bare (no embedded whitespace).
//!
//! This is a hand-rolled tokenizer rather than a parser-combinator crate —
//! the grammar is small enough (three keywords, no nesting) that pulling in
//! a dependency for it would be more ceremony than the grammar itself.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub section_type: String,
    pub name: Option<String>,
    /// Single-valued `option` statements, in file order.
    pub options: Vec<(String, String)>,
    /// Multi-valued `list` statements, grouped by key, values in file order.
    pub lists: Vec<(String, Vec<String>)>,
}

impl RawSection {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.lists.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawConfig {
    pub sections: Vec<RawSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse the full text of one UCI-style config file.
pub fn parse(text: &str) -> Result<RawConfig, ParseError> {
    let mut config = RawConfig::default();
    let mut current: Option<RawSection> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = tokenize(line, line_no)?;
        if tokens.is_empty() {
            continue;
        }
        let keyword = tokens.remove(0);
        match keyword.as_str() {
            "config" => {
                if let Some(section) = current.take() {
                    config.sections.push(section);
                }
                if tokens.is_empty() {
                    return Err(ParseError {
                        line: line_no,
                        message: "`config` requires a section type".to_string(),
                    });
                }
                let section_type = tokens.remove(0);
                let name = tokens.pop();
                if !tokens.is_empty() {
                    return Err(ParseError {
                        line: line_no,
                        message: "too many tokens after `config TYPE NAME`".to_string(),
                    });
                }
                current = Some(RawSection {
                    section_type,
                    name,
                    options: Vec::new(),
                    lists: Vec::new(),
                });
            }
            "option" => {
                let section = current.as_mut().ok_or_else(|| ParseError {
                    line: line_no,
                    message: "`option` outside of any `config` section".to_string(),
                })?;
                let (key, value) = option_pair(&tokens, line_no)?;
                section.options.push((key, value));
            }
            "list" => {
                let section = current.as_mut().ok_or_else(|| ParseError {
                    line: line_no,
                    message: "`list` outside of any `config` section".to_string(),
                })?;
                let (key, value) = option_pair(&tokens, line_no)?;
                match section.lists.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, values)) => values.push(value),
                    None => section.lists.push((key, vec![value])),
                }
            }
            other => {
                return Err(ParseError {
                    line: line_no,
                    message: format!("unknown keyword `{other}`"),
                });
            }
        }
    }
    if let Some(section) = current.take() {
        config.sections.push(section);
    }
    Ok(config)
}

fn option_pair(tokens: &[String], line: usize) -> Result<(String, String), ParseError> {
    if tokens.len() != 2 {
        return Err(ParseError {
            line,
            message: "expected `KEY VALUE`".to_string(),
        });
    }
    Ok((tokens[0].clone(), tokens[1].clone()))
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Split a line into whitespace-separated tokens, honoring single and
/// double quotes around a value.
fn tokenize(line: &str, line_no: usize) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == quote {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                return Err(ParseError {
                    line: line_no,
                    message: "unterminated quoted value".to_string(),
                });
            }
            tokens.push(value);
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
            tokens.push(value);
        }
    }
    Ok(tokens)
}
