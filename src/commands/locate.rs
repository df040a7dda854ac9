use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::LocateArgs;
use crate::commands::selection::locate_snapshots;
use crate::config::QaConfig;
use crate::model::SnapshotDescriptor;
use crate::qa::path_level::HierarchyLevel;

#[derive(Debug, Serialize)]
struct LocateResponse {
    search_root: String,
    qa_dir_level: HierarchyLevel,
    test_name: String,
    release: String,
    returned: usize,
    snapshots: Vec<SnapshotDescriptor>,
}

pub fn run(args: LocateArgs, config: &QaConfig) -> Result<()> {
    let grammar = config.grammar.compile()?;
    let (target, snapshots) = locate_snapshots(&args.selection, &grammar)?;

    let response = LocateResponse {
        search_root: target.root.display().to_string(),
        qa_dir_level: target.level,
        test_name: target.test_name,
        release: target.release,
        returned: snapshots.len(),
        snapshots,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize locate json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
