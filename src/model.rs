use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.is_finite() && value.fract() == 0.0 => Some(*value as i64),
            Self::Text(value) => value.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn to_integer(&self) -> Self {
        self.as_i64().map_or(Self::Null, Self::Integer)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) => 1,
            Self::Real(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) if value.is_finite() && value.fract() == 0.0 => write!(f, "{value:.0}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AttributeValue {}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Integer(value) => value.hash(state),
            Self::Real(value) => value.to_bits().hash(state),
            Self::Text(value) => value.hash(state),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDescriptor {
    pub date: NaiveDateTime,
    pub file_path: PathBuf,
    pub release: String,
    pub test_name: String,
    pub calendar_week: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub qa_dir: String,
    pub search_root: String,
    pub release: String,
    pub test_name: String,
    pub start_date: String,
    pub end_date: String,
    pub regions: String,
    pub group_by: Vec<String>,
    pub output: String,
    pub located_count: usize,
    pub processed: Vec<ProcessedSnapshot>,
    pub skipped: Vec<SkippedSnapshot>,
    pub chart_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedSnapshot {
    pub date: NaiveDateTime,
    pub file_path: String,
    pub calendar_week: String,
    pub source_issues: usize,
    pub issue_records: usize,
    pub grouped_rows: usize,
    pub issue_count: u64,
    pub outside_territory: Option<usize>,
    pub report_path: Option<String>,
    pub report_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSnapshot {
    pub date: NaiveDateTime,
    pub file_path: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::AttributeValue;

    #[test]
    fn integer_coercion_accepts_digits_and_integral_reals() {
        assert_eq!(AttributeValue::Real(8.0).to_integer(), AttributeValue::Integer(8));
        assert_eq!(AttributeValue::from(" 10 ").to_integer(), AttributeValue::Integer(10));
        assert_eq!(AttributeValue::Real(2.5).to_integer(), AttributeValue::Null);
        assert_eq!(AttributeValue::from("CH").to_integer(), AttributeValue::Null);
    }

    #[test]
    fn null_sorts_before_values_and_displays_empty() {
        let mut values = vec![
            AttributeValue::from("Error"),
            AttributeValue::Integer(2),
            AttributeValue::Null,
        ];
        values.sort();
        assert_eq!(values[0], AttributeValue::Null);
        assert_eq!(values[2], AttributeValue::from("Error"));
        assert_eq!(AttributeValue::Null.to_string(), "");
        assert_eq!(AttributeValue::Real(3.0).to_string(), "3");
    }
}
