//! Agreement between two demultiplexers, measured on the read ids each one put into a region file.
use fnv::FnvHashSet;
use log::{debug, info, warn};
use needletail::parse_fastx_file;
use std::path::{Path, PathBuf};

use crate::_files::{ensure_exists, list_files, progress_bar};
use crate::error::{MbError, Result};
use crate::pivot::Pivot;

pub const READS: [&str; 2] = ["R1", "R2"];
pub const BY_REGION: &str = "results_by-region.csv";
pub const BY_READ: &str = "results_r1-r2.csv";

/// Read id: the FASTQ header up to the first whitespace.
fn header_to_id(bytes: &[u8]) -> String {
    let id = match bytes.iter().position(|c| c.is_ascii_whitespace()) {
        None => bytes,
        Some(x) => &bytes[..x],
    };
    String::from_utf8_lossy(id).into_owned()
}

pub fn read_ids(path: &Path) -> Result<Vec<String>> {
    let fastq_error = |msg: String| MbError::Fastq {
        path: path.to_path_buf(),
        msg,
    };
    let mut reader = parse_fastx_file(path).map_err(|e| fastq_error(e.to_string()))?;
    let mut ids = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| fastq_error(e.to_string()))?;
        ids.push(header_to_id(record.id()));
    }
    Ok(ids)
}

/// `1 - (|clc \ orig| + |orig \ clc|) / (|orig| + |clc|)`, counting duplicate ids each time they occur.
///
/// Two empty files agree completely.
pub fn similarity(orig: &[String], clc: &[String]) -> f64 {
    let total = orig.len() + clc.len();
    if total == 0 {
        return 1.0;
    }
    let orig_set: FnvHashSet<&str> = orig.iter().map(String::as_str).collect();
    let clc_set: FnvHashSet<&str> = clc.iter().map(String::as_str).collect();
    let not_in_orig = clc.iter().filter(|id| !orig_set.contains(id.as_str())).count();
    let not_in_clc = orig.iter().filter(|id| !clc_set.contains(id.as_str())).count();
    1.0 - (not_in_orig + not_in_clc) as f64 / total as f64
}

/// True when `name` starts with `<sample>_` and then contains `region` and, after it, `read`.
fn is_counterpart(name: &str, sample: &str, region: &str, read: &str) -> bool {
    let rest = match name.strip_prefix(sample).and_then(|r| r.strip_prefix('_')) {
        Some(rest) => rest,
        None => return false,
    };
    match rest.find(region) {
        Some(i) => rest[i + region.len()..].contains(read),
        None => false,
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

pub struct CompareArgs {
    pub custom_dir: PathBuf,
    pub other_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Compare every region file of `custom_dir` with its counterpart in `other_dir`.
pub fn compare_demux(args: CompareArgs) -> Result<(Pivot, Pivot)> {
    ensure_exists(&args.custom_dir)?;
    ensure_exists(&args.other_dir)?;
    let custom = list_files(&args.custom_dir, |_| true)?;
    let other = list_files(&args.other_dir, |_| true)?;

    let mut by_region = Pivot::new();
    let mut by_read = Pivot::new();
    let bar = progress_bar((custom.len() * READS.len()) as u64, "files compared");
    for read in READS {
        for path in &custom {
            bar.inc(1);
            let name = file_name(path);
            if !name.contains(read) {
                continue;
            }
            let fields: Vec<&str> = name.split('_').collect();
            if fields.len() < 4 {
                warn!("Skipping {}: no region field", name);
                continue;
            }
            let (sample, region) = (fields[0], fields[3]);
            let counterpart = match other
                .iter()
                .find(|p| is_counterpart(file_name(p), sample, region, read))
            {
                Some(p) => p,
                None => {
                    warn!("No counterpart for {} in {:?}", name, args.other_dir);
                    continue;
                }
            };
            debug!("{}_{}_{}: {:?}", sample, region, read, counterpart);
            let value = similarity(&read_ids(path)?, &read_ids(counterpart)?);
            by_region.insert(sample, &format!("{}_{}", read, region), value);
            by_read.insert(&format!("{}_{}", sample, region), read, value);
        }
    }
    bar.finish_and_clear();

    std::fs::create_dir_all(&args.output_dir)?;
    for (table, file) in [(&by_region, BY_REGION), (&by_read, BY_READ)] {
        let out = args.output_dir.join(file);
        table.write(&mut csv::Writer::from_path(&out)?, "")?;
        info!("Wrote {:?}", out);
    }
    Ok((by_region, by_read))
}
