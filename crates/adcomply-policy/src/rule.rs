//! Rule definitions and compiled rule sets

use adcomply_core::{normalize_format, Error, Result, ALL_PLATFORMS};
use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A single static policy rule as written in a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier
    pub id: String,

    /// Short name
    pub name: String,

    /// Description of what this rule enforces
    #[serde(default)]
    pub description: String,

    /// Platform scope (`all` or a platform name)
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Free-form grouping (ad_content, campaign_settings, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Disabled rules stay in the set but are never evaluated
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prohibited_words: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regex_patterns: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_elements: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_kb: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_formats: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_budget: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

fn default_platform() -> String {
    ALL_PLATFORMS.to_string()
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Whether the rule constrains the creative image
    pub fn has_image_constraints(&self) -> bool {
        self.min_width.is_some()
            || self.min_height.is_some()
            || self.max_size_kb.is_some()
            || !self.allowed_formats.is_empty()
    }

    /// Whether the rule constrains the campaign budget
    pub fn has_budget_constraints(&self) -> bool {
        self.min_budget.is_some() || self.max_budget.is_some() || self.currency.is_some()
    }

    /// Whether the rule constrains the ad copy
    pub fn has_text_constraints(&self) -> bool {
        !self.prohibited_words.is_empty()
            || !self.regex_patterns.is_empty()
            || !self.required_elements.is_empty()
            || self.min_length.is_some()
            || self.max_length.is_some()
    }

    /// Structural checks that do not need compilation
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::rule_load("rule with empty id"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::rule_load(format!("rule {} has no name", self.id)));
        }
        if self.platform.trim().is_empty() {
            return Err(Error::rule_load(format!("rule {} has an empty platform", self.id)));
        }
        if !self.has_text_constraints() && !self.has_image_constraints() && !self.has_budget_constraints() {
            return Err(Error::rule_load(format!(
                "rule {} has no populated constraint",
                self.id
            )));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(Error::rule_load(format!(
                    "rule {}: min_length {} exceeds max_length {}",
                    self.id, min, max
                )));
            }
        }
        for bound in [self.min_budget, self.max_budget].into_iter().flatten() {
            if !bound.is_finite() || bound < 0.0 {
                return Err(Error::rule_load(format!(
                    "rule {}: invalid budget bound {}",
                    self.id, bound
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_budget, self.max_budget) {
            if min > max {
                return Err(Error::rule_load(format!(
                    "rule {}: min_budget {} exceeds max_budget {}",
                    self.id, min, max
                )));
            }
        }
        if self.prohibited_words.iter().any(|w| w.trim().is_empty()) {
            return Err(Error::rule_load(format!("rule {} has an empty prohibited word", self.id)));
        }
        if self.required_elements.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::rule_load(format!("rule {} has an empty required element", self.id)));
        }
        Ok(())
    }
}

/// On-disk rule file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    pub rules: Vec<Rule>,
}

impl RuleFile {
    /// Parse a JSON rule file
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::rule_load(format!("invalid rule JSON: {}", e)))
    }

    /// Parse a YAML rule file
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::rule_load(format!("invalid rule YAML: {}", e)))
    }

    /// Parse rule file contents, picking the format from the file extension
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(content),
            _ => Self::from_json(content),
        }
    }
}

/// A rule with its patterns compiled for evaluation
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    pub(crate) patterns: Vec<Regex>,
    pub(crate) prohibited: Option<WordMatcher>,
    pub(crate) required_lower: Vec<String>,
    pub(crate) allowed_formats: Vec<String>,
}

impl CompiledRule {
    /// Validate and compile a rule
    pub fn compile(rule: Rule) -> Result<Self> {
        rule.validate()?;

        let patterns = rule
            .regex_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::rule_load(format!("rule {}: invalid regex {:?}: {}", rule.id, p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let prohibited = if rule.prohibited_words.is_empty() {
            None
        } else {
            Some(WordMatcher::new(&rule.prohibited_words).map_err(|e| {
                Error::rule_load(format!("rule {}: {}", rule.id, e))
            })?)
        };

        let required_lower = rule.required_elements.iter().map(|e| e.to_lowercase()).collect();
        let allowed_formats = rule.allowed_formats.iter().map(|f| normalize_format(f)).collect();

        Ok(Self {
            rule,
            patterns,
            prohibited,
            required_lower,
            allowed_formats,
        })
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }
}

/// Case-insensitive multi-word matcher honouring word boundaries
#[derive(Debug, Clone)]
pub(crate) struct WordMatcher {
    automaton: AhoCorasick,
    words: Vec<String>,
}

impl WordMatcher {
    fn new(words: &[String]) -> std::result::Result<Self, aho_corasick::BuildError> {
        let words: Vec<String> = words.iter().map(|w| w.trim().to_lowercase()).collect();
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&words)?;
        Ok(Self { automaton, words })
    }

    /// Distinct prohibited words found in `text`, in first-occurrence order
    pub(crate) fn find_all(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut found: Vec<String> = Vec::new();
        for m in self.automaton.find_overlapping_iter(&lower) {
            if !is_word_boundary(&lower, m.start(), m.end()) {
                continue;
            }
            let word = &self.words[m.pattern().as_usize()];
            if !found.iter().any(|w| w == word) {
                found.push(word.clone());
            }
        }
        found
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
}

/// An immutable, versioned set of compiled rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: u64,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// The empty set published before the first load
    pub fn empty() -> Self {
        Self {
            version: 0,
            rules: Vec::new(),
        }
    }

    /// Validate and compile `rules` into a set with the given version
    pub fn compile(rules: Vec<Rule>, version: u64) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(Error::rule_load(format!("duplicate rule id {}", rule.id)));
            }
        }
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { version, rules })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.rule.id == id)
    }
}
