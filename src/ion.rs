//! IonTorrent read files: renaming to CASAVA layout and QIIME manifests.
//!
//! IonTorrent names look like
//! `L2S357-2019-08-20T08-21_IonXpress_015_1.fastq.gz`: sample name and run dates,
//! then the IonXpress barcode number, then a lane-like counter. CASAVA naming is
//! `<sample>_<barcode sequence>_L<lane>_R1_001.fastq.gz`.
use fnv::FnvHashMap;
use fnv::FnvHashSet;
use log::{debug, info, warn};
use std::{
    fs,
    io::BufRead,
    path::{Path, PathBuf},
};

use crate::_files::{ensure_exists, list_files, open_text, split_fastq_name, FastqSuffix};
use crate::error::{MbError, Result};

/// Lines before the header row of an IonXpress barcode sheet.
const BARCODE_SHEET_PREAMBLE: usize = 4;

const METADATA_HEADER: [&str; 7] = [
    "sample-id",
    "barcode-sequence",
    "year",
    "start-month",
    "start-day",
    "end-month",
    "end-day",
];
const METADATA_TYPES: [&str; 7] = [
    "#q2:types",
    "categorical",
    "numeric",
    "numeric",
    "numeric",
    "numeric",
    "numeric",
];

/// Read an IonXpress barcode sheet into barcode number -> barcode sequence.
pub fn read_barcode_sheet(path: &Path) -> Result<FnvHashMap<u32, String>> {
    let mut lines = Vec::new();
    for line in open_text(path)?.lines().skip(BARCODE_SHEET_PREAMBLE) {
        lines.push(line?);
    }
    let table = lines.join("\n");
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());
    let seq_col = rdr
        .headers()?
        .iter()
        .position(|h| h == "sequence")
        .ok_or_else(|| MbError::MissingColumn {
            path: path.to_path_buf(),
            column: "sequence".to_owned(),
        })?;

    let mut barcodes = FnvHashMap::default();
    for record in rdr.records() {
        let record = record?;
        let id = record.get(0).unwrap_or("");
        if id.is_empty() {
            continue;
        }
        let number = id
            .split('_')
            .nth(1)
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| MbError::BadBarcodeToken {
                file: path.display().to_string(),
                token: id.to_owned(),
            })?;
        barcodes.insert(number, record.get(seq_col).unwrap_or("").to_owned());
    }
    debug!("Read {} barcodes from {:?}", barcodes.len(), path);
    Ok(barcodes)
}

/// Position of the first `IonXpress` token.
fn ion_token_index(tokens: &[&str], file: &str) -> Result<usize> {
    tokens
        .iter()
        .position(|t| t.contains("IonXpress"))
        .ok_or_else(|| MbError::UnexpectedName(file.to_owned()))
}

/// The run date is `YYYY-MM-DDTHH-MM`, so its year is a bare four-digit piece.
fn is_year(piece: &str) -> bool {
    piece.len() == 4 && piece.bytes().all(|b| b.is_ascii_digit())
}

/// What an IonTorrent file name says about its read.
#[derive(Debug, Clone, PartialEq)]
pub struct IonRead {
    pub sample: String,
    pub barcode: u32,
    pub lane: String,
    pub year: String,
    pub start_month: String,
    pub start_day: String,
    pub end_month: String,
    pub end_day: String,
    pub suffix: FastqSuffix,
}

impl IonRead {
    /// Parse an IonTorrent FASTQ file name.
    pub fn parse(file_name: &str) -> Result<Self> {
        let convention = |msg: &str| MbError::NameConvention {
            file: file_name.to_owned(),
            msg: msg.to_owned(),
        };
        let (stem, suffix) =
            split_fastq_name(file_name).ok_or_else(|| convention("not a .fastq(.gz) file"))?;
        let tokens: Vec<&str> = stem.split('_').collect();
        let lane = format!("{:0>3}", tokens.last().copied().unwrap_or(""));

        let ion = ion_token_index(&tokens, file_name)?;
        let barcode_token = tokens.get(ion + 1).copied().unwrap_or("");
        let barcode = barcode_token
            .parse::<u32>()
            .map_err(|_| MbError::BadBarcodeToken {
                file: file_name.to_owned(),
                token: barcode_token.to_owned(),
            })?;

        let sample_info = tokens[..ion].join("-");
        let pieces: Vec<&str> = sample_info
            .split('-')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let year_at = pieces
            .iter()
            .position(|p| is_year(p))
            .ok_or_else(|| convention("no run date found"))?;
        let sample = pieces[..year_at].join("-");
        if sample.is_empty() {
            return Err(convention("no sample name before the run date"));
        }
        let run: Vec<&str> = pieces[year_at..]
            .iter()
            .flat_map(|p| p.split('T'))
            .collect();
        if run.len() < 5 {
            return Err(convention("run date needs year, start and end month/day"));
        }
        Ok(IonRead {
            sample,
            barcode,
            lane,
            year: run[0].to_owned(),
            start_month: run[1].to_owned(),
            start_day: run[2].to_owned(),
            end_month: run[3].to_owned(),
            end_day: run[4].to_owned(),
            suffix,
        })
    }

    pub fn casava_name(&self, barcode_sequence: &str) -> String {
        format!(
            "{}_{}_L{}_R1_001{}",
            self.sample,
            barcode_sequence,
            self.lane,
            self.suffix.as_str()
        )
    }

    fn metadata_row(&self, barcode_sequence: &str) -> [String; 7] {
        [
            self.sample.clone(),
            barcode_sequence.to_owned(),
            self.year.clone(),
            self.start_month.clone(),
            self.start_day.clone(),
            self.end_month.clone(),
            self.end_day.clone(),
        ]
    }
}

fn is_fastq(name: &str) -> bool {
    split_fastq_name(name).is_some()
}

/// Rename the IonTorrent FASTQ files in `input_dir` to CASAVA names and write
/// the matching QIIME sample metadata.
///
/// Every file is parsed and checked before anything is renamed. `metadata`
/// defaults to `metadata.tsv` next to `input_dir`.
pub fn ion_to_casava(
    input_dir: PathBuf,
    barcodes: PathBuf,
    metadata: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    ensure_exists(&input_dir)?;
    let input_dir = input_dir.canonicalize()?;
    let barcode_sheet = read_barcode_sheet(&barcodes)?;
    let metadata = metadata.unwrap_or_else(|| {
        input_dir
            .parent()
            .unwrap_or(&input_dir)
            .join("metadata.tsv")
    });

    let mut plans = Vec::new();
    let mut targets = FnvHashSet::default();
    for file in list_files(&input_dir, is_fastq)? {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        let read = IonRead::parse(&name)?;
        let sequence = barcode_sheet
            .get(&read.barcode)
            .ok_or(MbError::UnknownBarcode(read.barcode))?;
        let target = input_dir.join(read.casava_name(sequence));
        if target.exists() || !targets.insert(target.clone()) {
            return Err(MbError::NameConvention {
                file: name,
                msg: format!("target {:?} already exists", target),
            });
        }
        plans.push((file, target, read.metadata_row(sequence)));
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&metadata)?;
    wtr.write_record(METADATA_HEADER)?;
    wtr.write_record(METADATA_TYPES)?;
    for (_, _, row) in &plans {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    info!("Wrote metadata for {} files to {:?}", plans.len(), metadata);

    for (from, to, _) in &plans {
        if dry_run {
            info!("Would rename {:?} -> {:?}", from, to);
        } else {
            debug!("Renaming {:?} -> {:?}", from, to);
            fs::rename(from, to)?;
        }
    }
    if plans.is_empty() {
        warn!("No .fastq(.gz) files found in {:?}", input_dir);
    }
    Ok(())
}

/// Write a single-end QIIME manifest for the IonTorrent FASTQ files in `input_dir`.
///
/// `output` defaults to `manifest.tsv` inside `input_dir`.
pub fn ion_manifest(input_dir: PathBuf, output: Option<PathBuf>) -> Result<()> {
    ensure_exists(&input_dir)?;
    let input_dir = input_dir.canonicalize()?;
    let output = output.unwrap_or_else(|| input_dir.join("manifest.tsv"));

    let mut rows = Vec::new();
    for file in list_files(&input_dir, |n| n.contains(".fastq"))? {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let stem = match split_fastq_name(name) {
            Some((stem, _)) => stem,
            None => {
                warn!("Skipping {}: not a .fastq(.gz) file", name);
                continue;
            }
        };
        let tokens: Vec<&str> = stem.split('_').collect();
        let ion = ion_token_index(&tokens, name)?;
        rows.push([tokens[ion..].join("_"), file.display().to_string()]);
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&output)?;
    wtr.write_record(["sample-id", "absolute-filepath"])?;
    for row in &rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    info!("Wrote manifest with {} samples to {:?}", rows.len(), output);
    Ok(())
}
