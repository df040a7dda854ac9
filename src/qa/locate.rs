use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::CompiledGrammar;
use crate::model::SnapshotDescriptor;
use crate::qa::path_level::{HierarchyLevel, classify_path, path_segments};
use crate::util::calendar_week;

#[derive(Debug, Clone)]
pub struct LocateQuery<'a> {
    pub base_dir: &'a Path,
    pub test_name: &'a str,
    pub release: &'a str,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub most_recent_only: bool,
}

pub fn locate(query: &LocateQuery<'_>, grammar: &CompiledGrammar) -> Vec<SnapshotDescriptor> {
    let is_snapshot =
        classify_path(query.base_dir, grammar).level() == Some(HierarchyLevel::Snapshot);
    let candidates = if is_snapshot {
        debug!(path = %query.base_dir.display(), "base directory is a snapshot");
        vec![query.base_dir.to_path_buf()]
    } else {
        info!(base_dir = %query.base_dir.display(), "looking for QA test results");
        scan_candidates(query.base_dir, &grammar.terminal_marker)
    };

    let mut found: Vec<SnapshotDescriptor> = candidates
        .iter()
        .filter_map(|path| describe_snapshot(path, query.release, query.test_name, grammar))
        .collect();

    found.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });

    if let Some(start) = query.start_date {
        found.retain(|snapshot| snapshot.date >= start);
    }
    if let Some(end) = query.end_date {
        found.retain(|snapshot| snapshot.date <= end);
    }
    if query.most_recent_only {
        found.truncate(1);
    }

    if found.is_empty() {
        warn!(
            base_dir = %query.base_dir.display(),
            release = %query.release,
            test_name = %query.test_name,
            "no QA snapshots matched"
        );
    } else {
        info!(found = found.len(), "located QA snapshots");
    }

    found
}

fn scan_candidates(base_dir: &Path, terminal_marker: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let mut walker = WalkDir::new(base_dir).follow_links(false).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "failed to read entry during snapshot scan");
                continue;
            }
        };

        if entry.depth() == 0 || !entry.file_type().is_dir() {
            continue;
        }

        if entry.file_name().to_string_lossy().ends_with(terminal_marker) {
            walker.skip_current_dir();
            candidates.push(entry.into_path());
        }
    }

    candidates
}

pub fn describe_snapshot(
    path: &Path,
    release: &str,
    test_name: &str,
    grammar: &CompiledGrammar,
) -> Option<SnapshotDescriptor> {
    let segments = path_segments(&path.to_string_lossy());
    let [.., release_dir, timestamp_dir, _] = segments.as_slice() else {
        debug!(path = %path.display(), "candidate too shallow for release/timestamp parents");
        return None;
    };

    if !release_dir.contains(release) {
        debug!(path = %path.display(), release_dir = %release_dir, "release mismatch");
        return None;
    }

    let Some(raw) = grammar
        .timestamp_prefix
        .captures(timestamp_dir)
        .and_then(|captures| captures.get(1))
    else {
        debug!(path = %path.display(), timestamp_dir = %timestamp_dir, "timestamp mismatch");
        return None;
    };

    let date = match NaiveDateTime::parse_from_str(raw.as_str(), &grammar.timestamp_format) {
        Ok(date) => date,
        Err(err) => {
            warn!(path = %path.display(), raw = raw.as_str(), error = %err, "invalid snapshot timestamp");
            return None;
        }
    };

    Some(SnapshotDescriptor {
        date,
        file_path: path.to_path_buf(),
        release: release_dir.clone(),
        test_name: test_name.to_string(),
        calendar_week: calendar_week(date),
    })
}
