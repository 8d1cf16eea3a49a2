//! Regulations and their field requirements

use adcomply_core::{CampaignArtifact, Error, Result, Violation, ViolationSource};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Industry scope that matches every industry
pub const ALL_INDUSTRIES: &str = "all";

/// A regional regulatory requirement as published by a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    pub id: String,

    /// Region code (EU, US-CA, ...)
    pub region: String,

    /// Industry scope, `all` for every industry
    #[serde(default = "default_industry")]
    pub industry: String,

    #[serde(default)]
    pub description: String,

    /// `field:condition` expressions
    #[serde(default)]
    pub requirements: Vec<String>,

    #[serde(deserialize_with = "deserialize_date")]
    pub effective_date: DateTime<Utc>,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub expiry_date: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Feed version or timestamp this entry came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
}

fn default_industry() -> String {
    ALL_INDUSTRIES.to_string()
}

fn default_true() -> bool {
    true
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC)
fn parse_date(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date {raw:?}"))
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_date(&raw).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// A single condition on an artifact field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Contains(String),
    NotContains(String),
    Min(f64),
    Max(f64),
}

/// Parsed `field:condition` requirement
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub field: String,
    pub condition: Condition,
}

impl Requirement {
    /// Parse `field:condition`; a bare field means `required`
    pub fn parse(raw: &str) -> Result<Self> {
        let (field, condition) = match raw.split_once(':') {
            Some((field, condition)) => (field.trim(), condition.trim()),
            None => (raw.trim(), "required"),
        };
        if field.is_empty() {
            return Err(Error::regulatory_fetch(format!("requirement {raw:?} has no field")));
        }

        let invalid = |what: &str| Error::regulatory_fetch(format!("requirement {raw:?}: {what}"));
        let condition = match condition.split_once('=') {
            None if condition == "required" => Condition::Required,
            None => return Err(invalid("unknown condition")),
            Some((name, value)) => match name.trim() {
                "min_length" => Condition::MinLength(value.trim().parse().map_err(|_| invalid("bad length"))?),
                "max_length" => Condition::MaxLength(value.trim().parse().map_err(|_| invalid("bad length"))?),
                "contains" if !value.is_empty() => Condition::Contains(value.to_lowercase()),
                "not_contains" if !value.is_empty() => Condition::NotContains(value.to_lowercase()),
                "min" => Condition::Min(parse_number(value).ok_or_else(|| invalid("bad number"))?),
                "max" => Condition::Max(parse_number(value).ok_or_else(|| invalid("bad number"))?),
                _ => return Err(invalid("unknown condition")),
            },
        };
        Ok(Self {
            field: field.to_string(),
            condition,
        })
    }

    /// Reason the artifact fails this requirement, if it does
    pub fn unmet(&self, artifact: &CampaignArtifact) -> Option<String> {
        let value = artifact.field_value(&self.field).filter(|v| !v.trim().is_empty());
        let field = &self.field;
        match (&self.condition, value) {
            (_, None) => Some(format!("{field} is missing")),
            (Condition::Required, Some(_)) => None,
            (Condition::MinLength(min), Some(v)) => {
                let len = v.chars().count();
                (len < *min).then(|| format!("{field} length {len} below {min}"))
            }
            (Condition::MaxLength(max), Some(v)) => {
                let len = v.chars().count();
                (len > *max).then(|| format!("{field} length {len} exceeds {max}"))
            }
            (Condition::Contains(needle), Some(v)) => {
                (!v.to_lowercase().contains(needle.as_str())).then(|| format!("{field} must contain {needle:?}"))
            }
            (Condition::NotContains(needle), Some(v)) => {
                v.to_lowercase().contains(needle.as_str()).then(|| format!("{field} must not contain {needle:?}"))
            }
            (Condition::Min(min), Some(v)) => match parse_number(&v) {
                Some(n) if n >= *min => None,
                Some(n) => Some(format!("{field} {n} below {min}")),
                None => Some(format!("{field} is not numeric")),
            },
            (Condition::Max(max), Some(v)) => match parse_number(&v) {
                Some(n) if n <= *max => None,
                Some(n) => Some(format!("{field} {n} exceeds {max}")),
                None => Some(format!("{field} is not numeric")),
            },
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Condition::Required => write!(f, "{}:required", self.field),
            Condition::MinLength(n) => write!(f, "{}:min_length={}", self.field, n),
            Condition::MaxLength(n) => write!(f, "{}:max_length={}", self.field, n),
            Condition::Contains(s) => write!(f, "{}:contains={}", self.field, s),
            Condition::NotContains(s) => write!(f, "{}:not_contains={}", self.field, s),
            Condition::Min(n) => write!(f, "{}:min={}", self.field, n),
            Condition::Max(n) => write!(f, "{}:max={}", self.field, n),
        }
    }
}

/// A validated regulation with parsed requirements
#[derive(Debug, Clone)]
pub struct CompiledRegulation {
    pub regulation: Regulation,
    pub requirements: Vec<Requirement>,
}

impl CompiledRegulation {
    pub fn compile(regulation: Regulation) -> Result<Self> {
        if regulation.id.trim().is_empty() {
            return Err(Error::regulatory_fetch("regulation with empty id"));
        }
        if regulation.region.trim().is_empty() {
            return Err(Error::regulatory_fetch(format!("regulation {} has no region", regulation.id)));
        }
        if regulation.requirements.is_empty() {
            return Err(Error::regulatory_fetch(format!(
                "regulation {} has no requirements",
                regulation.id
            )));
        }
        if let Some(expiry) = regulation.expiry_date {
            if expiry <= regulation.effective_date {
                return Err(Error::regulatory_fetch(format!(
                    "regulation {} expires before it takes effect",
                    regulation.id
                )));
            }
        }
        let requirements = regulation
            .requirements
            .iter()
            .map(|r| Requirement::parse(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            regulation,
            requirements,
        })
    }

    pub fn id(&self) -> &str {
        &self.regulation.id
    }

    /// Active, in force at `now`, and scoped to the artifact's region and industry
    pub fn applies_to(&self, artifact: &CampaignArtifact, now: DateTime<Utc>) -> bool {
        let reg = &self.regulation;
        if !reg.is_active || reg.effective_date > now {
            return false;
        }
        if reg.expiry_date.map_or(false, |expiry| expiry <= now) {
            return false;
        }
        let Some(region) = artifact.region.as_deref() else {
            return false;
        };
        if !reg.region.eq_ignore_ascii_case(region) {
            return false;
        }
        reg.industry.eq_ignore_ascii_case(ALL_INDUSTRIES)
            || artifact
                .industry
                .as_deref()
                .map_or(false, |industry| reg.industry.eq_ignore_ascii_case(industry))
    }

    /// One violation per unmet requirement
    pub fn check(&self, artifact: &CampaignArtifact) -> Vec<Violation> {
        self.requirements
            .iter()
            .filter_map(|requirement| {
                requirement.unmet(artifact).map(|reason| {
                    let description = if self.regulation.description.is_empty() {
                        self.regulation.id.as_str()
                    } else {
                        self.regulation.description.as_str()
                    };
                    Violation::new(
                        ViolationSource::Regulatory,
                        self.regulation.id.clone(),
                        1.0,
                        format!("{description}: {reason}"),
                    )
                    .with_category(self.regulation.region.to_uppercase())
                    .with_context(requirement.to_string())
                })
            })
            .collect()
    }
}
