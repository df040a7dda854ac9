use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Geometry, Intersects};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::QaConfig;
use crate::error::QaResult;
use crate::gpkg::{GeoPackage, Layer};
use crate::model::AttributeValue;
use crate::qa::reference::{ReferencePartition, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

#[derive(Debug, Clone)]
pub struct IssueRecord<'p> {
    pub kind: GeometryKind,
    pub feature_index: usize,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub geometry: Option<Geometry<f64>>,
    pub region: Option<&'p Region>,
}

impl IssueRecord<'_> {
    pub fn value(&self, column: &str) -> AttributeValue {
        let region_value = |name: &str| self.region.and_then(|region| region.attributes.get(name));

        if let Some(base) = column.strip_suffix("_left") {
            if region_value(base).is_some() {
                if let Some(value) = self.attributes.get(base) {
                    return value.clone();
                }
            }
        }
        if let Some(base) = column.strip_suffix("_right") {
            if self.attributes.contains_key(base) {
                if let Some(value) = region_value(base) {
                    return value.clone();
                }
            }
        }

        self.attributes
            .get(column)
            .or_else(|| region_value(column))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedStat {
    pub group_key: Vec<AttributeValue>,
    pub issue_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedStats {
    pub columns: Vec<String>,
    pub rows: Vec<GroupedStat>,
}

impl GroupedStats {
    pub fn total(&self) -> u64 {
        self.rows.iter().map(|row| row.issue_count).sum()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
}

impl SourceCounts {
    pub fn total(&self) -> usize {
        self.points + self.lines + self.polygons
    }
}

#[derive(Debug, Clone)]
pub struct Aggregation<'p> {
    pub source_counts: SourceCounts,
    pub issues: Vec<IssueRecord<'p>>,
    pub stats: GroupedStats,
}

pub fn snapshot_package_path(snapshot_path: &Path, config: &QaConfig) -> PathBuf {
    if snapshot_path.is_dir() {
        snapshot_path.join(&config.snapshot_package)
    } else {
        snapshot_path.to_path_buf()
    }
}

pub fn aggregate<'p>(
    snapshot_path: &Path,
    partition: &'p ReferencePartition,
    group_by: &[String],
    config: &QaConfig,
) -> QaResult<Aggregation<'p>> {
    let package_path = snapshot_package_path(snapshot_path, config);
    let package = GeoPackage::open(&package_path)?;

    let layers = &config.issue_layers;
    let mut points = package.layer(&layers.points)?;
    let mut lines = package.layer(&layers.lines)?;
    let mut polygons = package.layer(&layers.polygons)?;
    for layer in [&mut points, &mut lines, &mut polygons] {
        layer.force_crs(config.epsg);
    }

    let source_counts = SourceCounts {
        points: points.features.len(),
        lines: lines.features.len(),
        polygons: polygons.features.len(),
    };

    let mut issues = spatial_join(points, GeometryKind::Point, partition);
    issues.extend(spatial_join(lines, GeometryKind::Line, partition));
    issues.extend(spatial_join(polygons, GeometryKind::Polygon, partition));

    let stats = group_issues(&issues, group_by, config);

    info!(
        snapshot = %snapshot_path.display(),
        points = source_counts.points,
        lines = source_counts.lines,
        polygons = source_counts.polygons,
        joined = issues.len(),
        groups = stats.rows.len(),
        "aggregated snapshot"
    );

    Ok(Aggregation {
        source_counts,
        issues,
        stats,
    })
}

pub fn spatial_join<'p>(
    layer: Layer,
    kind: GeometryKind,
    partition: &'p ReferencePartition,
) -> Vec<IssueRecord<'p>> {
    let mut joined = Vec::with_capacity(layer.features.len());
    let mut unmatched = 0_usize;

    for (feature_index, feature) in layer.features.into_iter().enumerate() {
        let matches: Vec<&Region> = match feature.geometry.as_ref() {
            Some(geometry) => {
                let bbox = geometry.bounding_rect();
                partition
                    .regions()
                    .iter()
                    .filter(|region| region.intersects(geometry, bbox.as_ref()))
                    .collect()
            }
            None => Vec::new(),
        };

        if matches.is_empty() {
            unmatched += 1;
            joined.push(IssueRecord {
                kind,
                feature_index,
                attributes: feature.attributes,
                geometry: feature.geometry,
                region: None,
            });
            continue;
        }

        for region in matches {
            joined.push(IssueRecord {
                kind,
                feature_index,
                attributes: feature.attributes.clone(),
                geometry: feature.geometry.clone(),
                region: Some(region),
            });
        }
    }

    debug!(
        layer = %layer.name,
        joined = joined.len(),
        unmatched,
        "spatial join complete"
    );

    joined
}

pub fn group_issues(issues: &[IssueRecord<'_>], group_by: &[String], config: &QaConfig) -> GroupedStats {
    let mut columns = group_by.to_vec();
    let identity_index = if columns.iter().any(|column| *column == config.region_column) {
        None
    } else {
        columns
            .iter()
            .position(|column| *column == config.identity_column)
    };
    if let Some(idx) = identity_index {
        columns[idx] = config.region_column.clone();
    }

    let mut counts: BTreeMap<Vec<AttributeValue>, u64> = BTreeMap::new();
    for issue in issues {
        let mut key: Vec<AttributeValue> = group_by.iter().map(|column| issue.value(column)).collect();
        if let Some(idx) = identity_index {
            key[idx] = match key[idx].to_integer() {
                AttributeValue::Null => issue.region.map_or(AttributeValue::Null, region_key),
                value => value,
            };
        }
        *counts.entry(key).or_default() += 1;
    }

    GroupedStats {
        columns,
        rows: counts
            .into_iter()
            .map(|(group_key, issue_count)| GroupedStat {
                group_key,
                issue_count,
            })
            .collect(),
    }
}

// Regions without an identity (the territory) still group under their region id.
fn region_key(region: &Region) -> AttributeValue {
    region
        .region_id
        .parse::<i64>()
        .map_or_else(|_| AttributeValue::Text(region.region_id.clone()), AttributeValue::Integer)
}

pub fn count_outside(issues: &[IssueRecord<'_>], outline: &[Geometry<f64>]) -> usize {
    let mut seen = HashSet::new();
    issues
        .iter()
        .filter(|issue| seen.insert((issue.kind, issue.feature_index)))
        .filter(|issue| {
            issue.geometry.as_ref().is_some_and(|geometry| {
                !outline.iter().any(|territory| territory.intersects(geometry))
            })
        })
        .count()
}
