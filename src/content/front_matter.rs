//! Front-matter parsing.
//!
//! | Fence | Format |
//! |-------|--------|
//! | `---` | YAML   |
//! | `+++` | TOML   |
//!
//! Values are flattened into [`FrontValue`]: scalars and sequences of
//! scalars. Nested mappings are rejected.

use std::collections::BTreeMap;
use thiserror::Error;

/// A single front-matter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Seq(Vec<FrontValue>),
}

/// Front-matter mapping, ordered by key.
pub type FrontMatter = BTreeMap<String, FrontValue>;

impl FrontValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Scalar rendered as text; `None` for null and sequences.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null | Self::Seq(_) => None,
        }
    }

    /// Convert into JSON for structured artifact data.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Null => serde_json::Value::Null,
            Self::Seq(items) => items.iter().map(Self::to_json).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("unterminated `{0}` block")]
    Unterminated(&'static str),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("front-matter must be a mapping")]
    NotMapping,

    #[error("key `{0}` holds a nested mapping")]
    Nested(String),

    #[error("front-matter keys must be strings")]
    InvalidKey,
}

const YAML_FENCE: &str = "---";
const TOML_FENCE: &str = "+++";

/// Split `text` into its front-matter and the remaining body.
///
/// Text that does not open with a fence has no front-matter: the map is
/// empty and the body is the whole input.
pub fn parse_front_matter(text: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));

    let fence = match first.trim_end() {
        YAML_FENCE => YAML_FENCE,
        TOML_FENCE => TOML_FENCE,
        _ => return Ok((FrontMatter::new(), text)),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == fence {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let front_matter = match fence {
                YAML_FENCE => parse_yaml(block)?,
                _ => parse_toml(block)?,
            };
            return Ok((front_matter, body));
        }
        offset += line.len();
    }

    Err(FrontMatterError::Unterminated(fence))
}

fn parse_yaml(block: &str) -> Result<FrontMatter, FrontMatterError> {
    let value: serde_yaml::Value = if block.trim().is_empty() {
        serde_yaml::Value::Null
    } else {
        serde_yaml::from_str(block)?
    };

    match value {
        serde_yaml::Value::Null => Ok(FrontMatter::new()),
        serde_yaml::Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    _ => return Err(FrontMatterError::InvalidKey),
                };
                let value = from_yaml(&key, value)?;
                Ok((key, value))
            })
            .collect(),
        _ => Err(FrontMatterError::NotMapping),
    }
}

fn from_yaml(key: &str, value: serde_yaml::Value) -> Result<FrontValue, FrontMatterError> {
    use serde_yaml::Value;

    Ok(match value {
        Value::Null => FrontValue::Null,
        Value::Bool(b) => FrontValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FrontValue::Int(i),
            None => FrontValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => FrontValue::String(s),
        Value::Sequence(items) => FrontValue::Seq(
            items
                .into_iter()
                .map(|item| from_yaml(key, item))
                .collect::<Result<_, _>>()?,
        ),
        Value::Mapping(_) => return Err(FrontMatterError::Nested(key.to_owned())),
        Value::Tagged(tagged) => from_yaml(key, tagged.value)?,
    })
}

fn parse_toml(block: &str) -> Result<FrontMatter, FrontMatterError> {
    let table: toml::Table = toml::from_str(block)?;
    table
        .into_iter()
        .map(|(key, value)| {
            let value = from_toml(&key, value)?;
            Ok((key, value))
        })
        .collect()
}

fn from_toml(key: &str, value: toml::Value) -> Result<FrontValue, FrontMatterError> {
    use toml::Value;

    Ok(match value {
        Value::String(s) => FrontValue::String(s),
        Value::Integer(i) => FrontValue::Int(i),
        Value::Float(f) => FrontValue::Float(f),
        Value::Boolean(b) => FrontValue::Bool(b),
        Value::Datetime(dt) => FrontValue::String(dt.to_string()),
        Value::Array(items) => FrontValue::Seq(
            items
                .into_iter()
                .map(|item| from_toml(key, item))
                .collect::<Result<_, _>>()?,
        ),
        Value::Table(_) => return Err(FrontMatterError::Nested(key.to_owned())),
    })
}
