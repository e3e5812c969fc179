//! Error type shared by every subcommand.
use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

use crate::taxonomy::Txid;

#[derive(Debug, Error)]
pub enum MbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not read FASTQ file {path:?}: {msg}")]
    Fastq { path: PathBuf, msg: String },

    #[error("Input path does not exist: {0:?}")]
    MissingInput(PathBuf),

    #[error("Malformed line {line} in {path:?}: {msg}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("names.dmp references unknown taxid {0}")]
    UnknownTaxid(Txid),

    #[error("Lineage of taxid {txid} does not reach the root: {msg}")]
    BrokenLineage { txid: Txid, msg: String },

    #[error("Can't process {0}. Has this file already been processed?")]
    UnexpectedName(String),

    #[error("{file} does not follow the expected naming: {msg}")]
    NameConvention { file: String, msg: String },

    #[error("Unparseable barcode token {token:?} in {file}")]
    BadBarcodeToken { file: String, token: String },

    #[error("Barcode {0} is not in the barcode sheet")]
    UnknownBarcode(u32),

    #[error("Missing column {column:?} in {path:?}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Not every sample has both R1 and R2: {0}")]
    IncompletePairs(String),

    #[error("No usable primers selected from {0:?}")]
    EmptyPrimerSelection(String),

    #[error("Failed to spawn {tool}: {source}. Is {tool} installed?")]
    ToolSpawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Could not parse {value:?} as a number in column {column:?}")]
    BadNumber { column: String, value: String },

    #[error("Sample {0:?} appears more than once")]
    DuplicateSample(String),

    #[error("A tree needs at least 3 samples, found {0}")]
    TooFewSamples(usize),
}

pub type Result<T> = std::result::Result<T, MbError>;
