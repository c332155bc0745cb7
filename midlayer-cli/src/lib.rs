//! `midlayer`: a small inspection tool over the OSM middle layer and
//! multipolygon assembler, for poking at a flat node file or replaying a
//! relation's member-way coordinates through the assembler without
//! standing up a full reader/writer pipeline.

#![forbid(unsafe_code)]

pub mod error;

use std::io::Write as _;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use geo::Area;
use midlayer_geom::{AssemblerConfig, assemble_multipolygon};
use midlayer_store::FlatNodeStore;
use serde::{Deserialize, Serialize};

pub use error::CliError;

/// Run the CLI with the current process arguments.
///
/// # Errors
///
/// Returns [`CliError`] if argument parsing fails or the selected
/// subcommand cannot complete (missing file, malformed JSON, I/O
/// failure).
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::DumpFlatNodes(args) => dump_flat_nodes(&args),
        Command::Assemble(args) => assemble(&args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "midlayer",
    about = "Inspect the OSM middle layer's flat node file and replay the multipolygon assembler",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved location (or its absence) for a list of node ids.
    DumpFlatNodes(DumpFlatNodesArgs),
    /// Assemble a relation's member-way coordinate lists into polygons.
    Assemble(AssembleArgs),
}

/// Arguments for the `dump-flat-nodes` subcommand.
#[derive(Debug, Parser)]
struct DumpFlatNodesArgs {
    /// Path to the flat node file (4.C, §6).
    #[arg(long)]
    file: Utf8PathBuf,
    /// Node ids to resolve, in the order given.
    #[arg(long = "id", required = true)]
    ids: Vec<i64>,
}

/// One entry of the `dump-flat-nodes` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct NodeDump {
    id: i64,
    lon: Option<f64>,
    lat: Option<f64>,
}

fn dump_flat_nodes(args: &DumpFlatNodesArgs) -> Result<(), CliError> {
    let dumps = collect_node_dumps(args)?;
    write_json(&dumps)
}

fn collect_node_dumps(args: &DumpFlatNodesArgs) -> Result<Vec<NodeDump>, CliError> {
    let mut store =
        FlatNodeStore::open(&args.file).map_err(|source| CliError::FlatNodeFile {
            path: args.file.clone(),
            source,
        })?;
    let mut dumps = Vec::with_capacity(args.ids.len());
    for &id in &args.ids {
        let location = store
            .get(id)
            .map_err(|source| CliError::FlatNodeFile {
                path: args.file.clone(),
                source,
            })?;
        dumps.push(NodeDump {
            id,
            lon: location.map(|coord| coord.x),
            lat: location.map(|coord| coord.y),
        });
    }
    Ok(dumps)
}

/// Arguments for the `assemble` subcommand.
#[derive(Debug, Parser)]
struct AssembleArgs {
    /// Path to a JSON file describing the relation's member-way
    /// coordinate lists: `{"way_coords": [[[lon, lat], ...], ...]}`.
    #[arg(long)]
    relation: Utf8PathBuf,
    /// Package more than one top-level outer ring as a single
    /// multipolygon rather than emitting separate polygons (step 8).
    #[arg(long)]
    multi_output: bool,
    /// Drop an invalid top-level polygon outright instead of attempting
    /// the zero-width-buffer repair (step 7(a)).
    #[arg(long)]
    exclude_broken: bool,
}

/// The JSON shape read by the `assemble` subcommand.
#[derive(Debug, Deserialize)]
struct RelationDescription {
    way_coords: Vec<Vec<[f64; 2]>>,
}

/// The JSON shape written by the `assemble` subcommand.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct AssembleSummary {
    polygon_count: usize,
    polygon_areas: Vec<f64>,
    multi_polygon_emitted: bool,
    discarded: Vec<String>,
}

fn assemble(args: &AssembleArgs) -> Result<(), CliError> {
    let summary = build_assemble_summary(args)?;
    write_json(&summary)
}

fn build_assemble_summary(args: &AssembleArgs) -> Result<AssembleSummary, CliError> {
    let raw = std::fs::read_to_string(&args.relation).map_err(|source| CliError::OpenRelation {
        path: args.relation.clone(),
        source,
    })?;
    let description: RelationDescription =
        serde_json::from_str(&raw).map_err(|source| CliError::ParseRelation {
            path: args.relation.clone(),
            source,
        })?;

    let way_coords: Vec<Vec<geo::Coord<f64>>> = description
        .way_coords
        .into_iter()
        .map(|way| {
            way.into_iter()
                .map(|[lon, lat]| geo::Coord { x: lon, y: lat })
                .collect()
        })
        .collect();

    let config = AssemblerConfig {
        multi_output: args.multi_output,
        exclude_broken: args.exclude_broken,
    };
    let assembled = assemble_multipolygon(&way_coords, config);

    Ok(AssembleSummary {
        polygon_count: assembled.polygons.len(),
        polygon_areas: assembled
            .polygons
            .iter()
            .map(Area::unsigned_area)
            .collect(),
        multi_polygon_emitted: assembled.multi_polygon.is_some(),
        discarded: assembled
            .discarded
            .iter()
            .map(|reason| format!("{reason:?}"))
            .collect(),
    })
}

fn write_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(CliError::SerializeOutput)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(CliError::WriteOutput)
}

#[cfg(test)]
mod tests {
    use super::{
        AssembleArgs, CliError, DumpFlatNodesArgs, build_assemble_summary, collect_node_dumps,
    };
    use camino::Utf8PathBuf;
    use geo::Coord;
    use midlayer_store::FlatNodeStore;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn utf8_temp_path(file: &NamedTempFile) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 temp path")
    }

    #[rstest]
    fn dump_flat_nodes_resolves_stored_and_missing_ids() {
        let file = NamedTempFile::new().expect("create temp file");
        let path = utf8_temp_path(&file);
        {
            let mut store = FlatNodeStore::open(&path).expect("open flat node store");
            store
                .set(7, Coord { x: 13.405, y: 52.52 })
                .expect("store node 7");
        }

        let args = DumpFlatNodesArgs {
            file: path,
            ids: vec![7, 99],
        };
        let dumps = collect_node_dumps(&args).expect("collect dumps");

        assert_eq!(dumps.len(), 2);
        assert_eq!(dumps[0].id, 7);
        assert!((dumps[0].lon.expect("lon present") - 13.405).abs() < 1e-6);
        assert!((dumps[0].lat.expect("lat present") - 52.52).abs() < 1e-6);
        assert_eq!(dumps[1].id, 99);
        assert_eq!(dumps[1].lon, None);
        assert_eq!(dumps[1].lat, None);
    }

    #[rstest]
    fn dump_flat_nodes_reports_the_offending_path_on_failure() {
        let missing_dir =
            Utf8PathBuf::from("/nonexistent-directory-for-midlayer-cli-tests/flat.nodes");
        let args = DumpFlatNodesArgs {
            file: missing_dir.clone(),
            ids: vec![1],
        };
        let err = collect_node_dumps(&args).expect_err("open should fail");
        match err {
            CliError::FlatNodeFile { path, .. } => assert_eq!(path, missing_dir),
            other => panic!("expected FlatNodeFile, found {other:?}"),
        }
    }

    #[rstest]
    fn assemble_reports_the_square_with_a_hole() {
        let file = NamedTempFile::new().expect("create temp file");
        let path = utf8_temp_path(&file);
        std::fs::write(
            file.path(),
            r#"{
                "way_coords": [
                    [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
                    [[2.0, 2.0], [8.0, 2.0], [8.0, 8.0], [2.0, 8.0], [2.0, 2.0]]
                ]
            }"#,
        )
        .expect("write relation description");

        let args = AssembleArgs {
            relation: path,
            multi_output: false,
            exclude_broken: false,
        };
        let summary = build_assemble_summary(&args).expect("assemble summary");

        assert_eq!(summary.polygon_count, 1);
        assert_eq!(summary.polygon_areas.len(), 1);
        assert!((summary.polygon_areas[0] - 64.0).abs() < 1e-6);
        assert!(!summary.multi_polygon_emitted);
        assert!(summary.discarded.is_empty());
    }

    #[rstest]
    fn assemble_rejects_malformed_json() {
        let file = NamedTempFile::new().expect("create temp file");
        let path = utf8_temp_path(&file);
        std::fs::write(file.path(), b"not json").expect("write malformed file");

        let args = AssembleArgs {
            relation: path.clone(),
            multi_output: false,
            exclude_broken: false,
        };
        let err = build_assemble_summary(&args).expect_err("parse should fail");
        match err {
            CliError::ParseRelation { path: bad_path, .. } => assert_eq!(bad_path, path),
            other => panic!("expected ParseRelation, found {other:?}"),
        }
    }
}
