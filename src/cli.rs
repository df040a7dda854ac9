use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "geocover-qa",
    version,
    about = "Locate, aggregate and chart GeoCover QA test snapshots"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Classify(ClassifyArgs),
    Locate(LocateArgs),
    Stat(StatArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    #[arg(long)]
    pub qa_dir: PathBuf,

    #[arg(long)]
    pub release: Option<String>,

    #[arg(long)]
    pub test_name: Option<String>,

    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    #[arg(long, default_value_t = false)]
    pub last: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LocateArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputKind {
    #[value(alias = "xlsx")]
    Tables,
    #[value(alias = "plots")]
    Charts,
    Both,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Charts => "charts",
            Self::Both => "both",
        }
    }

    pub fn tables(self) -> bool {
        matches!(self, Self::Tables | Self::Both)
    }

    pub fn charts(self) -> bool {
        matches!(self, Self::Charts | Self::Both)
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long, default_value = "outputs")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "all")]
    pub regions: String,

    #[arg(long, value_enum, default_value_t = OutputKind::Both)]
    pub output: OutputKind,

    #[arg(long)]
    pub reference: PathBuf,

    #[arg(long, default_value = "lots")]
    pub reference_layer: String,

    #[arg(long, value_delimiter = ',')]
    pub group_by: Option<Vec<String>>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
