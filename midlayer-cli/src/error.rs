//! Errors emitted by the `midlayer` inspection CLI.

use camino::Utf8PathBuf;
use midlayer_store::FlatNodeStoreError;
use thiserror::Error;

/// Errors surfaced by the CLI's subcommands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// The flat node file could not be opened or read.
    #[error("flat node file {path}: {source}")]
    FlatNodeFile {
        /// Path of the flat node file.
        path: Utf8PathBuf,
        /// Underlying store error.
        #[source]
        source: FlatNodeStoreError,
    },
    /// Opening the relation description file failed.
    #[error("failed to open relation description at {path}: {source}")]
    OpenRelation {
        /// Path of the relation description file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The relation description JSON could not be decoded.
    #[error("failed to parse relation description at {path}: {source}")]
    ParseRelation {
        /// Path of the relation description file.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing a command's result to JSON failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing a command's result to stdout failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
