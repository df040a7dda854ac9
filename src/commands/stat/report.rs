use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, Workbook};

use crate::model::AttributeValue;
use crate::qa::aggregate::GroupedStats;

pub const REPORT_SHEET: &str = "Issue";
pub const COUNT_HEADER: &str = "IssueCount";

pub fn report_file_name(date: NaiveDateTime, release: &str, test_name: &str) -> String {
    format!("{}_{release}_{test_name}.xlsx", date.format("%Y-%m-%d"))
}

pub fn chart_file_name(
    start: NaiveDateTime,
    end: NaiveDateTime,
    release: &str,
    test_name: &str,
) -> String {
    let start = start.format("%Y-%m-%d").to_string();
    let end = end.format("%Y-%m-%d").to_string();
    if start == end {
        format!("{start}_{release}_{test_name}.svg")
    } else {
        format!("{start}_{end}_{release}_{test_name}.svg")
    }
}

pub fn report_headers(columns: &[String], aliases: &BTreeMap<String, String>) -> Vec<String> {
    columns
        .iter()
        .map(|column| aliases.get(column).unwrap_or(column).clone())
        .collect()
}

pub fn write_report(
    path: &Path,
    stats: &GroupedStats,
    aliases: &BTreeMap<String, String>,
) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let count_col = u16::try_from(stats.columns.len()).context("too many group columns")?;

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(REPORT_SHEET)?;
    worksheet.set_freeze_panes(1, 0)?;

    for (col, name) in report_headers(&stats.columns, aliases).iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header)?;
    }
    worksheet.write_string_with_format(0, count_col, COUNT_HEADER, &header)?;

    for (idx, row) in stats.rows.iter().enumerate() {
        let row_num = u32::try_from(idx + 1).context("too many rows for one sheet")?;
        for (col, value) in row.group_key.iter().enumerate() {
            let col = col as u16;
            match value {
                AttributeValue::Null => {}
                AttributeValue::Integer(value) => {
                    worksheet.write_number(row_num, col, *value as f64)?;
                }
                AttributeValue::Real(value) => {
                    worksheet.write_number(row_num, col, *value)?;
                }
                AttributeValue::Text(value) => {
                    worksheet.write_string(row_num, col, value)?;
                }
            }
        }
        worksheet.write_number(row_num, count_col, row.issue_count as f64)?;
    }
    worksheet.autofit();

    workbook
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
