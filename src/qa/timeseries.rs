use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::{AttributeValue, SnapshotDescriptor};
use crate::qa::aggregate::GroupedStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDateTime,
    pub group_key: Vec<AttributeValue>,
    pub issue_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeSeries {
    pub columns: Vec<String>,
    pub points: Vec<TimeSeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    pub dates: Vec<NaiveDateTime>,
    pub columns: Vec<Vec<AttributeValue>>,
    pub values: Vec<Vec<u64>>,
}

impl PivotTable {
    pub fn column_label(&self, idx: usize) -> String {
        self.columns[idx]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" - ")
    }

    pub fn series(&self, idx: usize) -> impl Iterator<Item = (NaiveDateTime, u64)> + '_ {
        self.dates
            .iter()
            .zip(&self.values)
            .map(move |(date, row)| (*date, row[idx]))
    }

    pub fn max_value(&self) -> u64 {
        self.values.iter().flatten().copied().max().unwrap_or(0)
    }
}

impl TimeSeries {
    pub fn assemble(per_snapshot: &[(NaiveDateTime, GroupedStats)]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for (_, stats) in per_snapshot {
            for column in &stats.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut points = Vec::new();
        for (date, stats) in per_snapshot {
            let positions: Vec<Option<usize>> = columns
                .iter()
                .map(|column| stats.column_index(column))
                .collect();
            for row in &stats.rows {
                let group_key = positions
                    .iter()
                    .map(|position| {
                        position
                            .and_then(|idx| row.group_key.get(idx).cloned())
                            .unwrap_or_default()
                    })
                    .collect();
                points.push(TimeSeriesPoint {
                    date: *date,
                    group_key,
                    issue_count: row.issue_count,
                });
            }
        }

        Self { columns, points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn pivot(&self, pivot_columns: &[String]) -> Result<PivotTable> {
        let mut positions = Vec::with_capacity(pivot_columns.len());
        for column in pivot_columns {
            let Some(idx) = self.columns.iter().position(|name| name == column) else {
                bail!(
                    "pivot column `{column}` is not part of the grouping ({})",
                    self.columns.join(", ")
                );
            };
            positions.push(idx);
        }

        let mut cells: BTreeMap<(NaiveDateTime, Vec<AttributeValue>), u64> = BTreeMap::new();
        let mut dates = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for point in &self.points {
            let key: Vec<AttributeValue> = positions
                .iter()
                .map(|idx| point.group_key[*idx].clone())
                .collect();
            dates.insert(point.date);
            columns.insert(key.clone());
            *cells.entry((point.date, key)).or_default() += point.issue_count;
        }

        let dates: Vec<NaiveDateTime> = dates.into_iter().collect();
        let columns: Vec<Vec<AttributeValue>> = columns.into_iter().collect();
        let values = dates
            .iter()
            .map(|date| {
                columns
                    .iter()
                    .map(|column| {
                        cells
                            .get(&(*date, column.clone()))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect()
            })
            .collect();

        Ok(PivotTable {
            dates,
            columns,
            values,
        })
    }
}

pub fn date_window(snapshots: &[SnapshotDescriptor]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first = snapshots.iter().map(|snapshot| snapshot.date).min()?;
    let last = snapshots.iter().map(|snapshot| snapshot.date).max()?;
    Some((first, last))
}
