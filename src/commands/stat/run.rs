use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::cli::StatArgs;
use crate::commands::selection::{SearchTarget, locate_snapshots};
use crate::commands::stat::chart::{chart_title, render_chart};
use crate::commands::stat::regions::RegionFilter;
use crate::commands::stat::report::{chart_file_name, report_file_name, write_report};
use crate::config::QaConfig;
use crate::model::{ProcessedSnapshot, SkippedSnapshot, SnapshotDescriptor, StatRunManifest};
use crate::qa::aggregate::{GroupedStats, aggregate, count_outside};
use crate::qa::reference::{ReferencePartition, load_outline, load_reference};
use crate::qa::timeseries::{TimeSeries, date_window};
use crate::util::{
    end_of_day, ensure_directory, now_utc_string, sha256_file, start_of_day, utc_compact_string,
    write_json_pretty,
};

pub fn run(args: StatArgs, config: &QaConfig) -> Result<()> {
    let grammar = config.grammar.compile()?;
    let (target, located) = locate_snapshots(&args.selection, &grammar)?;
    let regions = RegionFilter::parse(&args.regions);
    let group_by = args
        .group_by
        .clone()
        .filter(|columns| !columns.is_empty())
        .unwrap_or_else(|| config.group_by.clone());

    let window = date_window(&located);
    let start = args
        .selection
        .start_date
        .map(start_of_day)
        .or(window.map(|(first, _)| first));
    let end = args
        .selection
        .end_date
        .map(end_of_day)
        .or(window.map(|(_, last)| last));

    let mut manifest = StatRunManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        qa_dir: args.selection.qa_dir.display().to_string(),
        search_root: target.root.display().to_string(),
        release: target.release.clone(),
        test_name: target.test_name.clone(),
        start_date: start.map(|date| date.to_string()).unwrap_or_default(),
        end_date: end.map(|date| date.to_string()).unwrap_or_default(),
        regions: regions.to_string(),
        group_by: group_by.clone(),
        output: args.output.as_str().to_string(),
        located_count: located.len(),
        processed: Vec::new(),
        skipped: Vec::new(),
        chart_path: None,
    };

    if located.is_empty() {
        warn!(
            search_root = %target.root.display(),
            "no snapshots to process; no reports written"
        );
    } else {
        let partition = load_reference(&args.reference, &args.reference_layer, config)
            .with_context(|| format!("failed to load reference {}", args.reference.display()))?;
        let outline = match load_outline(&args.reference, config) {
            Ok(outline) => Some(outline),
            Err(err) => {
                warn!(error = %err, "territory outline unavailable; outside counts skipped");
                None
            }
        };

        if !args.dry_run {
            ensure_directory(&args.output_dir)?;
        }

        let context = SnapshotContext {
            args: &args,
            config,
            target: &target,
            partition: &partition,
            outline: outline.as_deref(),
            regions: &regions,
            group_by: &group_by,
        };

        let mut per_snapshot = Vec::with_capacity(located.len());
        for snapshot in &located {
            match process_snapshot(&context, snapshot)? {
                SnapshotOutcome::Processed(entry, stats) => {
                    per_snapshot.push((snapshot.date, stats));
                    manifest.processed.push(entry);
                }
                SnapshotOutcome::Skipped(entry) => manifest.skipped.push(entry),
            }
        }

        if args.output.charts() {
            manifest.chart_path = write_chart(&context, &per_snapshot, start, end)?
                .map(|path| path.display().to_string());
        }
    }

    info!(
        located = manifest.located_count,
        processed = manifest.processed.len(),
        skipped = manifest.skipped.len(),
        dry_run = args.dry_run,
        "stat run complete"
    );

    if args.dry_run {
        info!("dry-run: no files written");
        return Ok(());
    }

    ensure_directory(&args.output_dir)?;
    let manifest_path = args.output_dir.join(format!(
        "stat_run_{}.json",
        utc_compact_string(Utc::now())
    ));
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote stat run manifest");

    Ok(())
}

struct SnapshotContext<'a> {
    args: &'a StatArgs,
    config: &'a QaConfig,
    target: &'a SearchTarget,
    partition: &'a ReferencePartition,
    outline: Option<&'a [geo::Geometry<f64>]>,
    regions: &'a RegionFilter,
    group_by: &'a [String],
}

enum SnapshotOutcome {
    Processed(ProcessedSnapshot, GroupedStats),
    Skipped(SkippedSnapshot),
}

fn process_snapshot(
    context: &SnapshotContext<'_>,
    snapshot: &SnapshotDescriptor,
) -> Result<SnapshotOutcome> {
    let aggregation = match aggregate(
        &snapshot.file_path,
        context.partition,
        context.group_by,
        context.config,
    ) {
        Ok(aggregation) => aggregation,
        Err(err) => {
            warn!(
                snapshot = %snapshot.file_path.display(),
                error = %err,
                "skipping snapshot"
            );
            return Ok(SnapshotOutcome::Skipped(SkippedSnapshot {
                date: snapshot.date,
                file_path: snapshot.file_path.display().to_string(),
                reason: err.to_string(),
            }));
        }
    };

    let mut stats = aggregation.stats;
    if !context.regions.apply(&mut stats, &context.config.region_column) {
        warn!(
            region_column = %context.config.region_column,
            regions = %context.regions,
            "grouping has no region column; region filter ignored"
        );
    }

    let outside_territory = context
        .outline
        .map(|outline| count_outside(&aggregation.issues, outline));
    if let Some(outside) = outside_territory.filter(|count| *count > 0) {
        warn!(
            snapshot = %snapshot.file_path.display(),
            outside,
            "issues found outside the territory outline"
        );
    }

    let mut entry = ProcessedSnapshot {
        date: snapshot.date,
        file_path: snapshot.file_path.display().to_string(),
        calendar_week: snapshot.calendar_week.clone(),
        source_issues: aggregation.source_counts.total(),
        issue_records: aggregation.issues.len(),
        grouped_rows: stats.rows.len(),
        issue_count: stats.total(),
        outside_territory,
        report_path: None,
        report_sha256: None,
    };

    if context.args.output.tables() {
        let report_path = context.args.output_dir.join(report_file_name(
            snapshot.date,
            &context.target.release,
            &context.target.test_name,
        ));
        if context.args.dry_run {
            info!(path = %report_path.display(), "dry-run: would write report");
        } else {
            write_report(&report_path, &stats, &context.config.report_column_aliases)?;
            entry.report_sha256 = Some(sha256_file(&report_path)?);
            info!(path = %report_path.display(), rows = stats.rows.len(), "wrote report");
        }
        entry.report_path = Some(report_path.display().to_string());
    }

    Ok(SnapshotOutcome::Processed(entry, stats))
}

fn write_chart(
    context: &SnapshotContext<'_>,
    per_snapshot: &[(NaiveDateTime, GroupedStats)],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Option<PathBuf>> {
    let series = TimeSeries::assemble(per_snapshot);
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(None);
    };
    if series.is_empty() {
        warn!("time series is empty; chart skipped");
        return Ok(None);
    }

    let pivot = match series.pivot(&context.config.pivot_columns) {
        Ok(pivot) => pivot,
        Err(err) => {
            warn!(error = %err, "chart skipped");
            return Ok(None);
        }
    };

    let target = context.target;
    let path = context.args.output_dir.join(chart_file_name(
        start,
        end,
        &target.release,
        &target.test_name,
    ));
    if context.args.dry_run {
        info!(path = %path.display(), "dry-run: would write chart");
        return Ok(Some(path));
    }

    let log_scale = context.config.uses_log_scale(&target.test_name);
    render_chart(
        &path,
        &pivot,
        &chart_title(&target.test_name, &target.release),
        log_scale,
    )?;
    info!(
        path = %path.display(),
        series = pivot.columns.len(),
        dates = pivot.dates.len(),
        log_scale,
        "wrote chart"
    );

    Ok(Some(path))
}
