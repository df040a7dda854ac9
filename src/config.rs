use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EPSG: u32 = 2056;
pub const TERRITORY_REGION_ID: &str = "CH";
pub const TERRITORY_BBOX: [f64; 4] = [2.480e6, 1.065e6, 2.840e6, 1.305e6];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    pub grammar: HierarchyGrammar,
    pub epsg: u32,
    pub territory_region_id: String,
    pub territory_bbox: [f64; 4],
    pub region_column: String,
    pub identity_column: String,
    pub issue_layers: IssueLayers,
    pub snapshot_package: String,
    pub outline_layer: String,
    pub group_by: Vec<String>,
    pub pivot_columns: Vec<String>,
    pub log_scale_tests: Vec<String>,
    pub report_column_aliases: BTreeMap<String, String>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            grammar: HierarchyGrammar::default(),
            epsg: DEFAULT_EPSG,
            territory_region_id: TERRITORY_REGION_ID.to_string(),
            territory_bbox: TERRITORY_BBOX,
            region_column: "Lot".to_string(),
            identity_column: "Id".to_string(),
            issue_layers: IssueLayers::default(),
            snapshot_package: "issue.gpkg".to_string(),
            outline_layer: "ch".to_string(),
            group_by: ["Id", "IssueType", "Code", "CodeDescription", "QualityCondition"]
                .map(String::from)
                .to_vec(),
            pivot_columns: ["Lot", "IssueType"].map(String::from).to_vec(),
            log_scale_tests: vec!["Topology".to_string()],
            report_column_aliases: BTreeMap::from([(
                "MSH_MAP_TITLE".to_string(),
                "Sheet".to_string(),
            )]),
        }
    }
}

impl QaConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn uses_log_scale(&self, test_name: &str) -> bool {
        self.log_scale_tests.iter().any(|name| name == test_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueLayers {
    pub points: String,
    pub lines: String,
    pub polygons: String,
}

impl Default for IssueLayers {
    fn default() -> Self {
        Self {
            points: "IssuePoints".to_string(),
            lines: "IssueLines".to_string(),
            polygons: "IssuePolygons".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyGrammar {
    pub root_markers: Vec<(String, String)>,
    pub test_name_pattern: String,
    pub release_pattern: String,
    pub timestamp_pattern: String,
    pub timestamp_format: String,
    pub terminal_marker: String,
}

impl Default for HierarchyGrammar {
    fn default() -> Self {
        Self {
            root_markers: vec![
                ("QA".to_string(), "Vérifications".to_string()),
                ("QA".to_string(), "Verifications".to_string()),
            ],
            test_name_pattern: "Topology|QualityAssuranceTest".to_string(),
            release_pattern: r"RC_\d{4}-\d{2}-\d{2}".to_string(),
            timestamp_pattern: r"\d{8}_\d{2}-\d{2}-\d{2}".to_string(),
            timestamp_format: "%Y%m%d_%H-%M-%S".to_string(),
            terminal_marker: "issue.gdb".to_string(),
        }
    }
}

impl HierarchyGrammar {
    pub fn compile(&self) -> Result<CompiledGrammar> {
        let full = |pattern: &str| {
            Regex::new(&format!("^(?:{pattern})$"))
                .with_context(|| format!("failed to compile hierarchy pattern: {pattern}"))
        };

        let levels = [
            full(&self.test_name_pattern)?,
            full(&self.release_pattern)?,
            full(&self.timestamp_pattern)?,
            full(&regex::escape(&self.terminal_marker))?,
        ];
        let timestamp_prefix = Regex::new(&format!("^({})", self.timestamp_pattern))
            .with_context(|| {
                format!("failed to compile timestamp pattern: {}", self.timestamp_pattern)
            })?;

        Ok(CompiledGrammar {
            root_markers: self.root_markers.clone(),
            levels,
            timestamp_prefix,
            timestamp_format: self.timestamp_format.clone(),
            terminal_marker: self.terminal_marker.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    pub root_markers: Vec<(String, String)>,
    pub levels: [Regex; 4],
    pub timestamp_prefix: Regex,
    pub timestamp_format: String,
    pub terminal_marker: String,
}

#[cfg(test)]
impl Default for CompiledGrammar {
    fn default() -> Self {
        HierarchyGrammar::default()
            .compile()
            .expect("built-in hierarchy grammar compiles")
    }
}
