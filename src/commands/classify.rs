use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ClassifyArgs;
use crate::config::QaConfig;
use crate::qa::path_level::{HierarchyLevel, classify_path};

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    path: String,
    matched: bool,
    level: Option<HierarchyLevel>,
    depth: i32,
    tokens: Vec<String>,
}

pub fn run(args: ClassifyArgs, config: &QaConfig) -> Result<()> {
    let grammar = config.grammar.compile()?;
    let matched = classify_path(&args.path, &grammar);

    info!(
        path = %args.path.display(),
        depth = matched.level_value(),
        "classified path"
    );

    let response = ClassifyResponse {
        path: args.path.display().to_string(),
        matched: matched.level().is_some(),
        level: matched.level(),
        depth: matched.level_value(),
        tokens: matched.tokens().to_vec(),
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize classify json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
