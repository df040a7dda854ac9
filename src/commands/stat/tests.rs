use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo::{Geometry, Point};

use super::chart::plotted_value;
use super::regions::{RegionFilter, RegionKey};
use super::report::{chart_file_name, report_file_name, report_headers};
use super::run;
use crate::cli::{OutputKind, SelectionArgs, StatArgs};
use crate::config::QaConfig;
use crate::error::QaError;
use crate::gpkg::testing::{PackageBuilder, Row, square};
use crate::model::AttributeValue;
use crate::qa::aggregate::{GeometryKind, GroupedStat, GroupedStats, IssueRecord, group_issues};
use crate::qa::reference::territory_region;

const ISSUE_COLUMNS: [&str; 4] = ["IssueType", "Code", "CodeDescription", "QualityCondition"];

fn issue_row(x: f64, issue_type: &str) -> Row {
    (
        Some(Geometry::Point(Point::new(x, 1_200_500.0))),
        vec![
            issue_type.into(),
            "T-01".into(),
            "Self overlap".into(),
            "QC topology".into(),
        ],
    )
}

fn write_snapshot(topology_dir: &Path, stamp: &str, points: Vec<Row>) -> PathBuf {
    let snapshot = topology_dir.join("RC_2030-12-31").join(stamp).join("issue.gdb");
    fs::create_dir_all(&snapshot).expect("snapshot dir");
    PackageBuilder::create(&snapshot.join("issue.gpkg"))
        .layer("IssuePoints", &ISSUE_COLUMNS, points)
        .layer("IssueLines", &ISSUE_COLUMNS, Vec::new())
        .layer("IssuePolygons", &ISSUE_COLUMNS, Vec::new())
        .finish();
    snapshot
}

fn write_reference(dir: &Path) -> PathBuf {
    let path = dir.join("lots_mapsheets.gpkg");
    PackageBuilder::create(&path)
        .layer(
            "lots",
            &["Id"],
            vec![
                (Some(square(2.600e6, 1.2e6, 1000.0)), vec![AttributeValue::Integer(1)]),
                (Some(square(2.601e6, 1.2e6, 1000.0)), vec![AttributeValue::Integer(2)]),
            ],
        )
        .layer(
            "ch",
            &["Name"],
            vec![(Some(square(2.5e6, 1.1e6, 300_000.0)), vec!["Schweiz".into()])],
        )
        .finish();
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    qa_root: PathBuf,
    reference: PathBuf,
    output_dir: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let qa_root = dir.path().join("QA").join("Verifications");
    let topology = qa_root.join("Topology");

    write_snapshot(
        &topology,
        "20240101_03-01-10",
        vec![issue_row(2_600_100.0, "Error"), issue_row(2_601_100.0, "Warning")],
    );
    write_snapshot(
        &topology,
        "20240301_03-01-10",
        vec![issue_row(2_600_200.0, "Error")],
    );
    let broken = topology
        .join("RC_2030-12-31")
        .join("20240201_03-01-10")
        .join("issue.gdb");
    fs::create_dir_all(&broken).expect("broken snapshot dir");

    let reference = write_reference(dir.path());
    let output_dir = dir.path().join("outputs");
    Fixture {
        qa_root,
        reference,
        output_dir,
        _dir: dir,
    }
}

fn stat_args(fixture: &Fixture, release: Option<&str>) -> StatArgs {
    StatArgs {
        selection: SelectionArgs {
            qa_dir: fixture.qa_root.clone(),
            release: release.map(ToString::to_string),
            test_name: Some("Topology".to_string()),
            start_date: None,
            end_date: None,
            last: false,
        },
        output_dir: fixture.output_dir.clone(),
        regions: "all".to_string(),
        output: OutputKind::Both,
        reference: fixture.reference.clone(),
        reference_layer: "lots".to_string(),
        group_by: None,
        dry_run: false,
    }
}

fn output_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read output dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[test]
fn stat_run_writes_reports_chart_and_manifest() {
    let fixture = fixture();
    run(stat_args(&fixture, Some("2030-12-31")), &QaConfig::default()).expect("stat run");

    let names = output_names(&fixture.output_dir);
    assert!(names.contains(&"2024-01-01_RC_2030-12-31_Topology.xlsx".to_string()));
    assert!(names.contains(&"2024-03-01_RC_2030-12-31_Topology.xlsx".to_string()));
    assert!(names.contains(&"2024-01-01_2024-03-01_RC_2030-12-31_Topology.svg".to_string()));

    let manifest_name = names
        .iter()
        .find(|name| name.starts_with("stat_run_") && name.ends_with(".json"))
        .expect("manifest written");
    let raw = fs::read(fixture.output_dir.join(manifest_name)).expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_slice(&raw).expect("parse manifest");

    assert_eq!(manifest["located_count"], 3);
    assert_eq!(manifest["release"], "RC_2030-12-31");
    assert_eq!(manifest["processed"].as_array().map(Vec::len), Some(2));
    assert_eq!(manifest["skipped"].as_array().map(Vec::len), Some(1));
    assert_eq!(manifest["processed"][1]["source_issues"], 2);
    assert_eq!(manifest["processed"][1]["issue_records"], 4);
    assert_eq!(manifest["processed"][1]["outside_territory"], 0);
    assert_eq!(
        manifest["processed"][0]["report_sha256"]
            .as_str()
            .map(str::len),
        Some(64)
    );

    let svg = fs::read_to_string(
        fixture
            .output_dir
            .join("2024-01-01_2024-03-01_RC_2030-12-31_Topology.svg"),
    )
    .expect("read chart");
    assert!(svg.contains("Evolution of Topology issues over time"));
}

#[test]
fn dry_run_writes_nothing() {
    let fixture = fixture();
    let mut args = stat_args(&fixture, Some("RC_2030-12-31"));
    args.dry_run = true;

    run(args, &QaConfig::default()).expect("dry run");
    assert!(!fixture.output_dir.exists());
}

#[test]
fn missing_release_fails_before_touching_disk() {
    let fixture = fixture();
    let err = run(stat_args(&fixture, None), &QaConfig::default()).expect_err("configuration error");

    assert!(matches!(
        err.downcast_ref::<QaError>(),
        Some(QaError::Configuration {
            option: "release",
            ..
        })
    ));
    assert!(!fixture.output_dir.exists());
}

#[test]
fn empty_located_set_succeeds_without_reports() {
    let fixture = fixture();
    let mut args = stat_args(&fixture, Some("2099-12-31"));
    args.reference = fixture.output_dir.join("absent.gpkg");

    run(args, &QaConfig::default()).expect("empty run");
    let names = output_names(&fixture.output_dir);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("stat_run_"));
}

#[test]
fn region_filter_parses_ids_and_names() {
    assert_eq!(RegionFilter::parse("ALL"), RegionFilter::All);
    assert_eq!(RegionFilter::parse(" "), RegionFilter::All);
    assert_eq!(RegionFilter::parse(" , "), RegionFilter::All);
    assert_eq!(
        RegionFilter::parse("1, 8,CH,"),
        RegionFilter::Only(vec![
            RegionKey::Integer(1),
            RegionKey::Integer(8),
            RegionKey::Text("CH".to_string()),
        ])
    );
    assert_eq!(RegionFilter::parse("1, 8,CH").to_string(), "1,8,CH");
}

#[test]
fn region_filter_compares_ids_and_their_text_equally() {
    let filter = RegionFilter::parse("8,CH");
    assert!(filter.matches(&AttributeValue::Integer(8)));
    assert!(filter.matches(&AttributeValue::from("8")));
    assert!(filter.matches(&AttributeValue::Real(8.0)));
    assert!(filter.matches(&AttributeValue::from("CH")));
    assert!(!filter.matches(&AttributeValue::Integer(1)));
    assert!(!filter.matches(&AttributeValue::Null));
}

#[test]
fn region_filter_retains_matching_rows_only() {
    let mut stats = GroupedStats {
        columns: vec!["Lot".to_string(), "IssueType".to_string()],
        rows: vec![
            GroupedStat {
                group_key: vec![AttributeValue::Integer(1), "Error".into()],
                issue_count: 2,
            },
            GroupedStat {
                group_key: vec![AttributeValue::Integer(8), "Error".into()],
                issue_count: 5,
            },
        ],
    };

    assert!(RegionFilter::parse("8").apply(&mut stats, "Lot"));
    assert_eq!(stats.total(), 5);

    let mut no_lot = GroupedStats {
        columns: vec!["IssueType".to_string()],
        rows: Vec::new(),
    };
    assert!(!RegionFilter::parse("8").apply(&mut no_lot, "Lot"));
    assert!(RegionFilter::All.apply(&mut no_lot, "Lot"));
}

#[test]
fn territory_rows_survive_a_text_region_filter_under_the_default_key() {
    let config = QaConfig::default();
    let territory = territory_region(&config);
    let issue = |feature_index: usize, region| IssueRecord {
        kind: GeometryKind::Point,
        feature_index,
        attributes: [("IssueType".to_string(), AttributeValue::from("Error"))].into(),
        geometry: Some(Geometry::Point(Point::new(2_600_000.0, 1_200_000.0))),
        region,
    };
    let issues = vec![issue(0, Some(&territory)), issue(1, None)];

    let mut stats = group_issues(&issues, &config.group_by, &config);
    assert_eq!(stats.columns[0], "Lot");
    assert!(RegionFilter::parse("CH").apply(&mut stats, &config.region_column));
    assert_eq!(stats.rows.len(), 1);
    assert_eq!(stats.rows[0].group_key[0], AttributeValue::from("CH"));
    assert_eq!(stats.total(), 1);
}

#[test]
fn output_file_names_follow_dates_release_and_test() {
    let day = |d: u32| {
        NaiveDate::from_ymd_opt(2024, 12, d)
            .and_then(|date| date.and_hms_opt(3, 1, 10))
            .expect("valid date")
    };

    assert_eq!(
        report_file_name(day(7), "RC_2030-12-31", "Topology"),
        "2024-12-07_RC_2030-12-31_Topology.xlsx"
    );
    assert_eq!(
        chart_file_name(day(1), day(7), "RC_2030-12-31", "Topology"),
        "2024-12-01_2024-12-07_RC_2030-12-31_Topology.svg"
    );
    assert_eq!(
        chart_file_name(day(7), day(7), "RC_2030-12-31", "Topology"),
        "2024-12-07_RC_2030-12-31_Topology.svg"
    );
}

#[test]
fn report_headers_rename_aliased_columns_only() {
    let config = QaConfig::default();
    let columns: Vec<String> = ["Lot", "MSH_MAP_TITLE", "IssueType"].map(String::from).to_vec();

    assert_eq!(
        report_headers(&columns, &config.report_column_aliases),
        vec!["Lot", "Sheet", "IssueType"]
    );
    assert_eq!(report_headers(&columns, &Default::default()), columns);
}

#[test]
fn log_scale_drops_zero_counts() {
    assert_eq!(plotted_value(0, false), Some(0.0));
    assert_eq!(plotted_value(0, true), None);
    assert_eq!(plotted_value(100, true), Some(2.0));
}
