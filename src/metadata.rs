//! QIIME sample metadata tables.
//!
//! - [`casava_metadata`](fn.casava_metadata.html): metadata from a directory of CASAVA named read pairs.
//! - [`samplesheet_metadata`](fn.samplesheet_metadata.html): metadata from an import manifest and a MiSeq sample sheet.
use fnv::FnvHashSet;
use log::{info, warn};
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use crate::_files::{ensure_exists, list_files, open_text};
use crate::error::{MbError, Result};

const TYPES_DIRECTIVE: &str = "#q2:types";

/// Write `metadata.tab` for a directory of `<sample>_S1_L001_R{1,2}_001.fastq.gz` files.
///
/// Fails without writing anything if any sample is missing one of its two read files.
pub fn casava_metadata(input_dir: PathBuf, output: Option<PathBuf>) -> Result<()> {
    ensure_exists(&input_dir)?;
    let output = output.unwrap_or_else(|| input_dir.join("metadata.tab"));

    let files: FnvHashSet<String> = list_files(&input_dir, |n| n.ends_with(".gz"))?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .collect();
    let mut samples: Vec<&str> = files
        .iter()
        .filter_map(|f| f.split('_').next())
        .collect();
    samples.sort_unstable();
    samples.dedup();

    let incomplete: Vec<String> = samples
        .iter()
        .filter_map(|s| {
            let missing: Vec<&str> = ["R1", "R2"]
                .into_iter()
                .filter(|r| !files.contains(&format!("{}_S1_L001_{}_001.fastq.gz", s, r)))
                .collect();
            if missing.is_empty() {
                None
            } else {
                Some(format!("{} (missing {})", s, missing.join(", ")))
            }
        })
        .collect();
    if !incomplete.is_empty() {
        return Err(MbError::IncompletePairs(incomplete.join("; ")));
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&output)?;
    wtr.write_record(["sample-id", ""])?;
    wtr.write_record([TYPES_DIRECTIVE, ""])?;
    for sample in &samples {
        wtr.write_record([*sample, ""])?;
    }
    wtr.flush()?;
    info!("Wrote {} samples to {:?}", samples.len(), output);
    Ok(())
}

fn column_values<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    column: &str,
    path: &Path,
) -> Result<Vec<String>> {
    let idx = rdr
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| MbError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_owned(),
        })?;
    let mut values = Vec::new();
    for record in rdr.records() {
        values.push(record?.get(idx).unwrap_or("").trim().to_owned());
    }
    Ok(values)
}

/// Sorted sample ids of a QIIME import manifest, without the types directive row.
pub fn manifest_sample_ids(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(open_text(path)?);
    let mut ids: Vec<String> = column_values(&mut rdr, "sample-id", path)?
        .into_iter()
        .filter(|id| id != TYPES_DIRECTIVE)
        .collect();
    ids.sort();
    Ok(ids)
}

/// Sorted `Sample_ID` values from the `[Data]` section of a MiSeq sample sheet.
pub fn samplesheet_ids(path: &Path) -> Result<Vec<String>> {
    let mut data = Vec::new();
    let mut in_data = false;
    for line in open_text(path)?.lines() {
        let line = line?;
        if in_data {
            data.push(line);
        } else if line.trim() == "[Data]" {
            in_data = true;
        }
    }
    if !in_data {
        return Err(MbError::MalformedLine {
            path: path.to_path_buf(),
            line: 0,
            msg: "no [Data] section".to_owned(),
        });
    }
    let table = data.join("\n");
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(table.as_bytes());
    let mut ids = column_values(&mut rdr, "Sample_ID", path)?;
    ids.sort();
    Ok(ids)
}

/// Merge the sample ids of an import manifest and a sample sheet into a QIIME metadata TSV.
pub fn samplesheet_metadata(manifest: PathBuf, samplesheet: PathBuf, output: PathBuf) -> Result<()> {
    let qiime_ids = manifest_sample_ids(&manifest)?;
    let sheet_ids = samplesheet_ids(&samplesheet)?;
    if qiime_ids.len() != sheet_ids.len() {
        warn!(
            "Manifest has {} samples but the sample sheet has {}; missing cells left empty",
            qiime_ids.len(),
            sheet_ids.len()
        );
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&output)?;
    wtr.write_record(["sample-id", "Sample_ID"])?;
    wtr.write_record([TYPES_DIRECTIVE, "categorical"])?;
    let rows = qiime_ids.len().max(sheet_ids.len());
    for i in 0..rows {
        let cell = |ids: &[String]| ids.get(i).cloned().unwrap_or_default();
        wtr.write_record([cell(&qiime_ids), cell(&sheet_ids)])?;
    }
    wtr.flush()?;
    info!("Wrote sample metadata for {} samples to {:?}", rows, output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "").unwrap();
        }
    }

    #[test]
    fn test_casava_metadata_complete() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "S2_S1_L001_R1_001.fastq.gz",
                "S2_S1_L001_R2_001.fastq.gz",
                "S1_S1_L001_R1_001.fastq.gz",
                "S1_S1_L001_R2_001.fastq.gz",
            ],
        );
        casava_metadata(dir.path().to_path_buf(), None).unwrap();
        let text = fs::read_to_string(dir.path().join("metadata.tab")).unwrap();
        assert_eq!(text, "sample-id\t\n#q2:types\t\nS1\t\nS2\t\n");
    }

    #[test]
    fn test_casava_metadata_fails_on_missing_mate() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "S1_S1_L001_R1_001.fastq.gz",
                "S1_S1_L001_R2_001.fastq.gz",
                "S2_S1_L001_R1_001.fastq.gz",
            ],
        );
        let err = casava_metadata(dir.path().to_path_buf(), None).err().unwrap();
        match err {
            MbError::IncompletePairs(msg) => assert_eq!(msg, "S2 (missing R2)"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!dir.path().join("metadata.tab").exists());
    }

    #[test]
    fn test_samplesheet_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("import_manifest.tsv");
        fs::write(
            &manifest,
            "sample-id\tforward-absolute-filepath\treverse-absolute-filepath\n#q2:types\t\t\nB\t/b1\t/b2\nA\t/a1\t/a2\n",
        )
        .unwrap();
        let sheet = dir.path().join("SampleSheet.csv");
        fs::write(
            &sheet,
            "[Header]\nIEMFileVersion,4\n\n[Reads]\n151\n151\n[Data]\nSample_ID,Sample_Name,index\nb-1,b,ACGT\na-1,a,TTGA\n",
        )
        .unwrap();
        let out = dir.path().join("sample-metadata.tsv");
        samplesheet_metadata(manifest, sheet, out.clone()).unwrap();
        assert_eq!(
            fs::read_to_string(out).unwrap(),
            "sample-id\tSample_ID\n#q2:types\tcategorical\nA\ta-1\nB\tb-1\n"
        );
    }

    #[test]
    fn test_samplesheet_without_data_section() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("SampleSheet.csv");
        fs::write(&sheet, "[Header]\nIEMFileVersion,4\n").unwrap();
        assert!(matches!(
            samplesheet_ids(&sheet),
            Err(MbError::MalformedLine { .. })
        ));
    }
}
