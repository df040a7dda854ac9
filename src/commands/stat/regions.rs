use std::fmt;

use crate::model::AttributeValue;
use crate::qa::aggregate::GroupedStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKey {
    Integer(i64),
    Text(String),
}

impl RegionKey {
    fn matches(&self, value: &AttributeValue) -> bool {
        match self {
            Self::Integer(id) => value.as_i64() == Some(*id),
            Self::Text(id) => !value.is_null() && value.to_string() == *id,
        }
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionFilter {
    All,
    Only(Vec<RegionKey>),
}

impl RegionFilter {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return Self::All;
        }

        let keys: Vec<RegionKey> = raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| match token.parse::<i64>() {
                Ok(id) => RegionKey::Integer(id),
                Err(_) => RegionKey::Text(token.to_string()),
            })
            .collect();

        if keys.is_empty() {
            Self::All
        } else {
            Self::Only(keys)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn matches(&self, value: &AttributeValue) -> bool {
        match self {
            Self::All => true,
            Self::Only(keys) => keys.iter().any(|key| key.matches(value)),
        }
    }

    // Returns false when the stats carry no region column to filter on.
    pub fn apply(&self, stats: &mut GroupedStats, region_column: &str) -> bool {
        if self.is_all() {
            return true;
        }
        let Some(idx) = stats.column_index(region_column) else {
            return false;
        };
        stats.rows.retain(|row| self.matches(&row.group_key[idx]));
        true
    }
}

impl fmt::Display for RegionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(keys) => {
                let joined: Vec<String> = keys.iter().map(ToString::to_string).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}
