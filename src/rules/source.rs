//! Rule source text parsing.
//!
//! The repository serves rules as plain text in a YARA-style format:
//!
//! ```text
//! rule ransomnote
//! {
//!     meta:
//!         description = "Ransom note dropped by encryptors"
//!     strings:
//!         $a = "your files have been encrypted" nocase
//!         $b = { 4D 5A 90 00 }
//!         $c = /pay.{0,16}bitcoin/
//!     condition:
//!         any of them
//! }
//! ```
//!
//! Supported string forms: quoted text (with optional `nocase` and `wide`
//! modifiers), hex byte sequences in braces, and regular expressions between
//! slashes. Supported conditions: `any of them`, `all of them`, `N of them`,
//! and pattern identifiers combined with `and` / `or`.

use std::collections::HashMap;

use super::engine::{CompiledRule, Condition, RuleSet, StringPattern};
use crate::core::error::{Error, Result};

/// Parse and compile rule source text into a single [`CompiledRule`].
pub fn compile_source(source: &str) -> Result<CompiledRule> {
    let parsed = parse(source)?;
    CompiledRule::compile(parsed.name, parsed.meta, parsed.patterns, parsed.condition)
}

/// Parse and compile a rule file that may declare several rules.
///
/// The file is split at top-level `rule` declarations and each chunk is
/// compiled independently; any chunk failing to compile fails the whole set.
pub fn compile_ruleset(source: &str) -> Result<RuleSet> {
    let mut chunks: Vec<String> = Vec::new();

    for raw_line in source.lines() {
        let trimmed = strip_comment(raw_line).trim_start();
        if trimmed
            .strip_prefix("rule")
            .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        {
            chunks.push(String::new());
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.push_str(raw_line);
            chunk.push('\n');
        }
    }

    if chunks.is_empty() {
        return Err(Error::RuleCompile("No rule declaration found".to_string()));
    }

    let rules = chunks
        .iter()
        .map(|chunk| compile_source(chunk))
        .collect::<Result<Vec<_>>>()?;

    RuleSet::new(rules)
}

struct ParsedRule {
    name: String,
    meta: HashMap<String, String>,
    patterns: Vec<StringPattern>,
    condition: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Meta,
    Strings,
    Condition,
}

fn parse(source: &str) -> Result<ParsedRule> {
    let mut name = None;
    let mut meta = HashMap::new();
    let mut patterns = Vec::new();
    let mut condition_text = String::new();
    let mut section = Section::None;
    let mut in_body = false;

    for raw_line in source.lines() {
        let line = strip_comment(raw_line).trim().to_string();
        if line.is_empty() {
            continue;
        }

        if !in_body {
            if let Some(rest) = line.strip_prefix("rule") {
                let rest = rest.trim();
                let rule_name: String = rest
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if rule_name.is_empty() {
                    return Err(Error::RuleCompile("Rule declaration has no name".to_string()));
                }
                name = Some(rule_name);
                if rest.contains('{') {
                    in_body = true;
                }
            } else if line.starts_with('{') && name.is_some() {
                in_body = true;
            } else {
                return Err(Error::RuleCompile(format!(
                    "Expected rule declaration, found: {}",
                    line
                )));
            }
            continue;
        }

        match line.as_str() {
            "meta:" => {
                section = Section::Meta;
                continue;
            }
            "strings:" => {
                section = Section::Strings;
                continue;
            }
            "condition:" => {
                section = Section::Condition;
                continue;
            }
            "}" => break,
            _ => {}
        }

        match section {
            Section::Meta => {
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"').to_string();
                    meta.insert(key.trim().to_string(), value);
                }
            }
            Section::Strings => {
                patterns.push(parse_string_line(&line)?);
            }
            Section::Condition => {
                if !condition_text.is_empty() {
                    condition_text.push(' ');
                }
                condition_text.push_str(&line);
            }
            Section::None => {
                return Err(Error::RuleCompile(format!(
                    "Statement outside any section: {}",
                    line
                )));
            }
        }
    }

    let name = name.ok_or_else(|| Error::RuleCompile("No rule declaration found".to_string()))?;

    if condition_text.is_empty() {
        return Err(Error::RuleCompile(format!(
            "Rule '{}' has no condition section",
            name
        )));
    }

    let condition = parse_condition(&condition_text)?;

    Ok(ParsedRule {
        name,
        meta,
        patterns,
        condition,
    })
}

/// Strip a trailing `//` comment, ignoring slashes inside quotes or regexes.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_quote = false;
    let mut in_regex = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_quote || in_regex => i += 1,
            b'"' if !in_regex => in_quote = !in_quote,
            b'/' if !in_quote => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'/' && !in_regex {
                    return &line[..i];
                }
                in_regex = !in_regex;
            }
            _ => {}
        }
        i += 1;
    }

    line
}

/// Parse one `$id = <pattern> [modifiers]` line from the strings section.
fn parse_string_line(line: &str) -> Result<StringPattern> {
    let (id, rhs) = line
        .split_once('=')
        .ok_or_else(|| Error::RuleCompile(format!("Malformed string definition: {}", line)))?;

    let id = id.trim();
    if !id.starts_with('$') {
        return Err(Error::RuleCompile(format!(
            "String identifier must start with '$': {}",
            id
        )));
    }
    let rhs = rhs.trim();

    if let Some(rest) = rhs.strip_prefix('"') {
        let (text, modifiers) = parse_quoted(rest)
            .ok_or_else(|| Error::RuleCompile(format!("Unterminated string literal: {}", line)))?;
        let nocase = modifiers.contains(&"nocase");
        let wide = modifiers.contains(&"wide");

        if wide {
            Ok(StringPattern::wide(id, &text))
        } else if nocase {
            Ok(StringPattern::text_nocase(id, &text))
        } else {
            Ok(StringPattern::text(id, &text))
        }
    } else if rhs.starts_with('{') {
        let end = rhs
            .rfind('}')
            .ok_or_else(|| Error::RuleCompile(format!("Unterminated hex sequence: {}", line)))?;
        Ok(StringPattern::hex(id, rhs[1..end].trim()))
    } else if let Some(rest) = rhs.strip_prefix('/') {
        let end = rest
            .rfind('/')
            .ok_or_else(|| Error::RuleCompile(format!("Unterminated regex: {}", line)))?;
        Ok(StringPattern::regex(id, &rest[..end]))
    } else {
        Err(Error::RuleCompile(format!(
            "Unrecognized pattern syntax: {}",
            rhs
        )))
    }
}

/// Parse a quoted literal body (opening quote already consumed) and its
/// trailing modifiers. Returns the unescaped text and modifier tokens.
fn parse_quoted(rest: &str) -> Option<(String, Vec<&str>)> {
    let mut text = String::new();
    let mut chars = rest.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, other)) => text.push(other),
                None => return None,
            },
            '"' => {
                let modifiers = rest[i + 1..].split_whitespace().collect();
                return Some((text, modifiers));
            }
            _ => text.push(c),
        }
    }

    None
}

/// Parse the condition expression.
fn parse_condition(text: &str) -> Result<Condition> {
    let text = text.trim();
    let lower = text.to_lowercase();

    if lower == "any of them" {
        return Ok(Condition::Any);
    }
    if lower == "all of them" {
        return Ok(Condition::All);
    }
    if let Some(count) = lower.strip_suffix(" of them") {
        if let Ok(n) = count.trim().parse::<usize>() {
            return Ok(Condition::AtLeast(n));
        }
    }

    // Identifier expression: $a and $b or $c (left-associative)
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut iter = tokens.iter();

    let first = iter
        .next()
        .ok_or_else(|| Error::RuleCompile("Empty condition".to_string()))?;
    let mut condition = parse_operand(first)?;

    while let Some(op) = iter.next() {
        let rhs = iter.next().ok_or_else(|| {
            Error::RuleCompile(format!("Dangling operator in condition: {}", op))
        })?;
        let rhs = parse_operand(rhs)?;

        condition = match op.to_lowercase().as_str() {
            "and" => Condition::And(Box::new(condition), Box::new(rhs)),
            "or" => Condition::Or(Box::new(condition), Box::new(rhs)),
            other => {
                return Err(Error::RuleCompile(format!(
                    "Unsupported condition operator: {}",
                    other
                )))
            }
        };
    }

    Ok(condition)
}

fn parse_operand(token: &str) -> Result<Condition> {
    if token.starts_with('$') {
        Ok(Condition::Pattern(token.to_string()))
    } else {
        Err(Error::RuleCompile(format!(
            "Unsupported condition term: {}",
            token
        )))
    }
}
