//! Compiled detection rules.
//!
//! A rule arrives from the repository as source text, is parsed by
//! [`crate::rules::source`], and is compiled here exactly once per
//! invocation. The compiled form is immutable and can be matched against any
//! byte buffer or file.

use regex::bytes::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::core::error::{Error, Result};

/// Pattern type for string matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternType {
    /// Plain text (case-sensitive)
    Text,
    /// Plain text (case-insensitive)
    TextNocase,
    /// Hex bytes pattern
    Hex,
    /// Regular expression
    Regex,
    /// Wide string (UTF-16LE)
    Wide,
}

/// A string pattern in a rule.
#[derive(Debug, Clone)]
pub struct StringPattern {
    /// Pattern identifier (e.g., "$a")
    pub id: String,
    /// The pattern content as written in the rule source
    pub pattern: String,
    /// Pattern type
    pub pattern_type: PatternType,
    /// Compiled regex (for text and regex patterns)
    compiled: Option<Regex>,
    /// Compiled byte sequence (for hex and wide patterns)
    raw_bytes: Option<Vec<u8>>,
}

impl StringPattern {
    /// Create a new text pattern.
    pub fn text(id: &str, pattern: &str) -> Self {
        Self::new(id, pattern, PatternType::Text)
    }

    /// Create a case-insensitive text pattern.
    pub fn text_nocase(id: &str, pattern: &str) -> Self {
        Self::new(id, pattern, PatternType::TextNocase)
    }

    /// Create a hex pattern.
    pub fn hex(id: &str, hex: &str) -> Self {
        Self::new(id, hex, PatternType::Hex)
    }

    /// Create a regex pattern.
    pub fn regex(id: &str, pattern: &str) -> Self {
        Self::new(id, pattern, PatternType::Regex)
    }

    /// Create a wide (UTF-16LE) pattern.
    pub fn wide(id: &str, pattern: &str) -> Self {
        Self::new(id, pattern, PatternType::Wide)
    }

    fn new(id: &str, pattern: &str, pattern_type: PatternType) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            pattern_type,
            compiled: None,
            raw_bytes: None,
        }
    }

    /// Compile the pattern for matching.
    pub fn compile(&mut self) -> std::result::Result<(), String> {
        match self.pattern_type {
            PatternType::Text => {
                let escaped = regex::escape(&self.pattern);
                self.compiled = Some(
                    Regex::new(&escaped)
                        .map_err(|e| format!("Failed to compile pattern: {}", e))?,
                );
            }
            PatternType::TextNocase => {
                let escaped = regex::escape(&self.pattern);
                self.compiled = Some(
                    Regex::new(&format!("(?i){}", escaped))
                        .map_err(|e| format!("Failed to compile pattern: {}", e))?,
                );
            }
            PatternType::Regex => {
                self.compiled = Some(
                    Regex::new(&self.pattern)
                        .map_err(|e| format!("Failed to compile regex: {}", e))?,
                );
            }
            PatternType::Hex => {
                self.raw_bytes = Some(Self::parse_hex(&self.pattern)?);
            }
            PatternType::Wide => {
                let wide: Vec<u8> = self
                    .pattern
                    .encode_utf16()
                    .flat_map(|c| c.to_le_bytes())
                    .collect();
                self.raw_bytes = Some(wide);
            }
        }
        Ok(())
    }

    /// Parse a hex string like "4D 5A 90 00" to bytes.
    fn parse_hex(hex: &str) -> std::result::Result<Vec<u8>, String> {
        let hex = hex.replace([' ', '\n', '\r', '\t'], "");

        if hex.contains('?') {
            return Err("Hex wildcards not supported".to_string());
        }

        hex::decode(&hex).map_err(|e| format!("Invalid hex: {}", e))
    }

    /// Find all match offsets of this pattern in data.
    pub fn matches(&self, data: &[u8]) -> Vec<usize> {
        let mut offsets = Vec::new();

        match self.pattern_type {
            PatternType::Text | PatternType::TextNocase | PatternType::Regex => {
                if let Some(ref regex) = self.compiled {
                    for m in regex.find_iter(data) {
                        offsets.push(m.start());
                    }
                }
            }
            PatternType::Hex | PatternType::Wide => {
                if let Some(ref bytes) = self.raw_bytes {
                    if bytes.is_empty() {
                        return offsets;
                    }
                    for i in 0..=data.len().saturating_sub(bytes.len()) {
                        if data[i..].starts_with(bytes) {
                            offsets.push(i);
                        }
                    }
                }
            }
        }

        offsets
    }
}

/// Condition for rule matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// All patterns must match
    All,
    /// Any pattern must match
    Any,
    /// At least N patterns must match
    AtLeast(usize),
    /// Specific pattern must match
    Pattern(String),
    /// Logical AND
    And(Box<Condition>, Box<Condition>),
    /// Logical OR
    Or(Box<Condition>, Box<Condition>),
    /// Logical NOT
    Not(Box<Condition>),
}

impl Condition {
    /// Evaluate the condition against per-pattern match offsets.
    pub fn evaluate(&self, matches: &HashMap<String, Vec<usize>>) -> bool {
        match self {
            Condition::All => matches.values().all(|m| !m.is_empty()),
            Condition::Any => matches.values().any(|m| !m.is_empty()),
            Condition::AtLeast(n) => matches.values().filter(|m| !m.is_empty()).count() >= *n,
            Condition::Pattern(id) => matches.get(id).is_some_and(|m| !m.is_empty()),
            Condition::And(a, b) => a.evaluate(matches) && b.evaluate(matches),
            Condition::Or(a, b) => a.evaluate(matches) || b.evaluate(matches),
            Condition::Not(c) => !c.evaluate(matches),
        }
    }
}

/// A detection rule compiled from repository source text.
///
/// Compiled exactly once, before any matching begins; immutable thereafter.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule name as declared in the source
    pub name: String,
    /// Metadata key-value pairs from the meta section
    pub meta: HashMap<String, String>,
    /// String patterns
    patterns: Vec<StringPattern>,
    /// Condition for matching
    condition: Condition,
}

impl CompiledRule {
    /// Build and compile a rule from its parts.
    pub fn compile(
        name: String,
        meta: HashMap<String, String>,
        mut patterns: Vec<StringPattern>,
        condition: Condition,
    ) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::RuleCompile(format!(
                "Rule '{}' declares no string patterns",
                name
            )));
        }

        for pattern in &mut patterns {
            pattern
                .compile()
                .map_err(|e| Error::RuleCompile(format!("Rule '{}': {}", name, e)))?;
        }

        Ok(Self {
            name,
            meta,
            patterns,
            condition,
        })
    }

    /// Number of string patterns in the rule.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Match the rule against a byte buffer.
    pub fn matches(&self, data: &[u8]) -> Option<RuleMatch> {
        let mut pattern_matches: HashMap<String, Vec<usize>> = HashMap::new();

        for pattern in &self.patterns {
            pattern_matches.insert(pattern.id.clone(), pattern.matches(data));
        }

        if self.condition.evaluate(&pattern_matches) {
            Some(RuleMatch {
                rule_name: self.name.clone(),
                matches: pattern_matches,
            })
        } else {
            None
        }
    }

    /// Match the rule against a file's bytes on disk.
    pub fn matches_file(&self, path: &Path) -> Result<Option<RuleMatch>> {
        let data = fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Ok(self.matches(&data))
    }
}

/// Result of a rule match.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    /// Name of the matched rule
    pub rule_name: String,
    /// Pattern matches with offsets
    pub matches: HashMap<String, Vec<usize>>,
}

/// All rules compiled from one fetched rule file.
///
/// A repository entry may declare several rules. Engines match a subject
/// against the set and report the first rule that hits, so a subject still
/// yields at most one record no matter how many rules it trips.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Build a set from already-compiled rules.
    pub fn new(rules: Vec<CompiledRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(Error::RuleCompile(
                "Rule file declares no rules".to_string(),
            ));
        }
        Ok(Self { rules })
    }

    /// Number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty. Never true for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The compiled rules, in declaration order.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// The first rule that matches the buffer, in declaration order.
    pub fn first_match(&self, data: &[u8]) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matches(data).is_some())
    }

    /// The first rule that matches a file's bytes on disk.
    pub fn first_match_file(&self, path: &Path) -> Result<Option<&CompiledRule>> {
        let data = fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Ok(self.first_match(&data))
    }
}
