use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cli::SelectionArgs;
use crate::config::CompiledGrammar;
use crate::error::{QaError, QaResult};
use crate::model::SnapshotDescriptor;
use crate::qa::locate::{LocateQuery, locate};
use crate::qa::path_level::{HierarchyLevel, PathMatch, classify_path};
use crate::util::{end_of_day, start_of_day};

const RELEASE_PREFIX: &str = "RC_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub root: PathBuf,
    pub level: HierarchyLevel,
    pub test_name: String,
    pub release: String,
}

pub fn normalize_release(release: &str) -> Option<String> {
    let release = release.trim();
    if release.is_empty() {
        return None;
    }
    if release.starts_with(RELEASE_PREFIX) {
        Some(release.to_string())
    } else {
        Some(format!("{RELEASE_PREFIX}{release}"))
    }
}

pub fn resolve_search_target(
    qa_dir: &Path,
    test_name: Option<&str>,
    release: Option<&str>,
    grammar: &CompiledGrammar,
) -> QaResult<SearchTarget> {
    let matched = classify_path(qa_dir, grammar);
    let PathMatch::Matched { level, .. } = &matched else {
        return Err(QaError::PathGrammarMismatch {
            path: qa_dir.display().to_string(),
        });
    };
    let level = *level;

    let test_name = test_name.map(str::trim).filter(|name| !name.is_empty());
    let release = release.and_then(normalize_release);

    let test_name = pick("test-name", test_name, matched.test_name());
    let release = pick("release", release.as_deref(), matched.release());

    let required = |option: &'static str, value: Option<String>| {
        value.ok_or_else(|| QaError::Configuration {
            option,
            path: qa_dir.to_path_buf(),
        })
    };

    let (root, test_name, release) = match level {
        HierarchyLevel::Root => {
            let test_name = required("test-name", test_name)?;
            let release = required("release", release)?;
            (qa_dir.join(&test_name).join(&release), test_name, release)
        }
        HierarchyLevel::TestName => {
            let release = required("release", release)?;
            let test_name = required("test-name", test_name)?;
            (qa_dir.join(&release), test_name, release)
        }
        HierarchyLevel::Release | HierarchyLevel::Timestamp | HierarchyLevel::Snapshot => (
            qa_dir.to_path_buf(),
            required("test-name", test_name)?,
            required("release", release)?,
        ),
    };

    info!(
        qa_dir = %qa_dir.display(),
        qa_level = ?level,
        search_root = %root.display(),
        test_name = %test_name,
        release = %release,
        "resolved search root"
    );

    Ok(SearchTarget {
        root,
        level,
        test_name,
        release,
    })
}

fn pick(option: &str, selector: Option<&str>, from_path: Option<&str>) -> Option<String> {
    match (selector, from_path) {
        (Some(selector), Some(from_path)) => {
            if selector != from_path {
                warn!(
                    option,
                    selector,
                    path_value = from_path,
                    "selector conflicts with the QA directory; using the path value"
                );
            }
            Some(from_path.to_string())
        }
        (selector, from_path) => from_path.or(selector).map(ToString::to_string),
    }
}

pub fn locate_snapshots(
    selection: &SelectionArgs,
    grammar: &CompiledGrammar,
) -> QaResult<(SearchTarget, Vec<SnapshotDescriptor>)> {
    let target = resolve_search_target(
        &selection.qa_dir,
        selection.test_name.as_deref(),
        selection.release.as_deref(),
        grammar,
    )?;

    let query = LocateQuery {
        base_dir: &target.root,
        test_name: &target.test_name,
        release: &target.release,
        start_date: selection.start_date.map(start_of_day),
        end_date: selection.end_date.map(end_of_day),
        most_recent_only: selection.last,
    };
    let snapshots = locate(&query, grammar);

    Ok((target, snapshots))
}
