//! Summarize per-sample AMRFinder reports into one samples x genes table.
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::_files::{ensure_exists, list_files};
use crate::error::{MbError, Result};
use crate::pivot::Pivot;

pub const GENE: &str = "Sequence name";
pub const COVERAGE: &str = "% Coverage of reference sequence";
pub const IDENTITY: &str = "% Identity to reference sequence";
pub const SUMMARY: &str = "output.csv";

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| MbError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_owned(),
        })
}

fn percent(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64> {
    let value = record.get(idx).unwrap_or("").trim();
    value.parse::<f64>().map_err(|_| MbError::BadNumber {
        column: name.to_owned(),
        value: value.to_owned(),
    })
}

/// Add one report to `table`: a row for `sample` and, per hit, `(coverage + identity) / 200` under the gene name.
pub fn add_report(table: &mut Pivot, sample: &str, path: &Path) -> Result<()> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let gene = column(&headers, GENE, path)?;
    let coverage = column(&headers, COVERAGE, path)?;
    let identity = column(&headers, IDENTITY, path)?;

    table.add_row(sample);
    for record in rdr.records() {
        let record = record?;
        let score = (percent(&record, coverage, COVERAGE)? + percent(&record, identity, IDENTITY)?) / 200.0;
        table.insert(sample, record.get(gene).unwrap_or(""), score);
    }
    Ok(())
}

pub fn amr_summary(input_dir: PathBuf, output_dir: PathBuf) -> Result<Pivot> {
    ensure_exists(&input_dir)?;
    let output = output_dir.join(SUMMARY);
    let reports = list_files(&input_dir, |n| n.ends_with(".csv"))?;
    // compare resolved paths so `dir/sub/..` or a symlink still finds the previous summary
    let own_output = output.canonicalize().ok();

    let mut table = Pivot::new();
    for path in &reports {
        if *path == output || (own_output.is_some() && path.canonicalize().ok() == own_output) {
            continue;
        }
        let sample = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if !stem.contains("_mut") => stem,
            _ => continue,
        };
        debug!("Reading {:?}", path);
        add_report(&mut table, sample, path)?;
    }

    std::fs::create_dir_all(&output_dir)?;
    table.write(&mut csv::Writer::from_path(&output)?, "0")?;
    info!(
        "Wrote {} samples x {} genes to {:?}",
        table.rows().len(),
        table.cols().len(),
        output
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str = "Protein identifier,Sequence name,Method,% Coverage of reference sequence,% Identity to reference sequence\n";

    #[test]
    fn test_amr_summary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("s1.csv"),
            format!("{}NA,blaTEM-1,EXACTX,100.00,100.00\nNA,tet(A),BLASTX,90.00,80.00\n", HEADER),
        )
        .unwrap();
        fs::write(dir.path().join("s2.csv"), format!("{}NA,tet(A),BLASTX,100.00,50.00\n", HEADER)).unwrap();
        fs::write(dir.path().join("s2_mut.csv"), format!("{}NA,gyrA,POINTX,100,100\n", HEADER)).unwrap();

        let table = amr_summary(dir.path().to_path_buf(), dir.path().to_path_buf()).unwrap();
        assert_eq!(table.rows(), ["s1", "s2"]);
        assert_eq!(table.cols(), ["blaTEM-1", "tet(A)"]);
        assert_eq!(
            fs::read_to_string(dir.path().join(SUMMARY)).unwrap(),
            ",blaTEM-1,tet(A)\ns1,1,0.85\ns2,0,0.75\n"
        );

        // a second run must not pick up its own output
        amr_summary(dir.path().to_path_buf(), dir.path().to_path_buf()).unwrap();
    }

    #[test]
    fn test_rerun_skips_own_output_through_unnormalised_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("s1.csv"), format!("{}NA,tet(A),BLASTX,100,100\n", HEADER)).unwrap();
        let output_dir = dir.path().join("sub").join("..");

        amr_summary(dir.path().to_path_buf(), output_dir.clone()).unwrap();
        let first = fs::read_to_string(dir.path().join(SUMMARY)).unwrap();
        let table = amr_summary(dir.path().to_path_buf(), output_dir).unwrap();
        assert_eq!(table.rows(), ["s1"]);
        assert_eq!(fs::read_to_string(dir.path().join(SUMMARY)).unwrap(), first);
    }

    #[test]
    fn test_bad_number() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s1.csv"), format!("{}NA,tet(A),BLASTX,n/a,50\n", HEADER)).unwrap();
        let err = amr_summary(dir.path().to_path_buf(), dir.path().join("out")).err().unwrap();
        assert!(matches!(err, MbError::BadNumber { .. }));
    }
}
