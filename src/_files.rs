//! Shared file helpers used by the subcommands.
//!
//! This module collects the small pieces of file handling that every tool needs:
//! locating inputs, opening possibly gzipped text, taking sequencer file names apart
//! and reporting progress.
//!
//! # Enums
//!
//! - [`FastqSuffix`](enum.FastqSuffix.html): The extension a FASTQ file carries.
//!   - `Plain`: `.fastq`
//!   - `Gzipped`: `.fastq.gz`
//!
//! # Functions
//!
//! - [`ensure_exists`](fn.ensure_exists.html): Fail with `MissingInput` if a path is absent.
//! - [`open_text`](fn.open_text.html): Open a text file, decompressing it if it ends in `.gz`.
//! - [`list_files`](fn.list_files.html): List the regular files of a directory matching a predicate, sorted.
//! - [`split_fastq_name`](fn.split_fastq_name.html): Split a file name into its stem and FASTQ suffix.
//! - [`insert_token`](fn.insert_token.html): Insert a token into an underscore separated name.
//! - [`progress_bar`](fn.progress_bar.html): Progress bar in the house style.
//!
use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::error::{MbError, Result};

/// The extension a FASTQ file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastqSuffix {
    /// `.fastq`
    Plain,
    /// `.fastq.gz`
    Gzipped,
}

impl FastqSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            FastqSuffix::Plain => ".fastq",
            FastqSuffix::Gzipped => ".fastq.gz",
        }
    }
}

/// Fail with [`MbError::MissingInput`] if `path` does not exist.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(MbError::MissingInput(path.to_path_buf()))
    }
}

/// Open a text file for buffered reading, transparently decompressing `.gz` files.
///
/// # Example
///
/// ```rust,ignore
/// let reader = open_text(Path::new("taxdump/names.dmp.gz"))?;
/// for line in reader.lines() {
///     println!("{}", line?);
/// }
/// ```
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    ensure_exists(path)?;
    let file = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// List the regular files in `dir` whose file name satisfies `keep`, sorted by path.
pub fn list_files<F>(dir: &Path, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    ensure_exists(dir)?;
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let keep_it = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(&keep)
            .unwrap_or(false);
        if keep_it {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Split a FASTQ file name into its stem and suffix.
///
/// Returns `None` for names that are neither `.fastq` nor `.fastq.gz`.
///
/// ```rust,ignore
/// assert_eq!(
///     split_fastq_name("S1_S1_L001_R1_001.fastq.gz"),
///     Some(("S1_S1_L001_R1_001", FastqSuffix::Gzipped))
/// );
/// ```
pub fn split_fastq_name(name: &str) -> Option<(&str, FastqSuffix)> {
    if let Some(stem) = name.strip_suffix(".fastq.gz") {
        Some((stem, FastqSuffix::Gzipped))
    } else {
        name.strip_suffix(".fastq")
            .map(|stem| (stem, FastqSuffix::Plain))
    }
}

/// Insert `token` into the underscore separated `stem` so that it becomes field `position`.
///
/// Returns `None` when the stem has fewer than `position` fields.
pub fn insert_token(stem: &str, position: usize, token: &str) -> Option<String> {
    let mut fields: Vec<&str> = stem.split('_').collect();
    if fields.len() < position {
        return None;
    }
    fields.insert(position, token);
    Some(fields.join("_"))
}

/// Progress bar drawn to stderr. A `len` of zero gives a spinner.
pub fn progress_bar(len: u64, msg: &'static str) -> ProgressBar {
    let bar = if len == 0 {
        ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
    } else {
        ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr())
    };
    let template = if len == 0 {
        "[{elapsed_precise}] {spinner} {pos:>7} {msg}"
    } else {
        "[{elapsed_precise}] {bar:40} {pos:>7}/{len:7} {msg}"
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]));
    }
    bar.with_message(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    #[test]
    fn test_split_fastq_name() {
        assert_eq!(
            split_fastq_name("S1_S1_L001_R1_001.fastq.gz"),
            Some(("S1_S1_L001_R1_001", FastqSuffix::Gzipped))
        );
        assert_eq!(
            split_fastq_name("reads.fastq"),
            Some(("reads", FastqSuffix::Plain))
        );
        assert_eq!(split_fastq_name("reads.fasta"), None);
    }

    #[test]
    fn test_insert_token() {
        assert_eq!(
            insert_token("S1_S1_L001_R1_001", 3, "V1V2").as_deref(),
            Some("S1_S1_L001_V1V2_R1_001")
        );
        assert_eq!(insert_token("S1_R1", 3, "V1V2"), None);
    }

    #[test]
    fn test_open_text_gz_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        fs::write(&plain, "one\ntwo\n").unwrap();
        let gz = dir.path().join("a.txt.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(b"one\ntwo\n").unwrap();
        enc.finish().unwrap();

        for path in [plain, gz] {
            let lines: Vec<String> = open_text(&path).unwrap().lines().map(|l| l.unwrap()).collect();
            assert_eq!(lines, vec!["one", "two"]);
        }
    }

    #[test]
    fn test_open_text_missing() {
        let err = open_text(Path::new("tests/does_not_exist.txt")).err().unwrap();
        assert!(matches!(err, MbError::MissingInput(_)));
    }

    #[test]
    fn test_list_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fastq.gz", "a.fastq.gz", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("sub.fastq.gz")).unwrap();
        let files = list_files(dir.path(), |n| n.ends_with(".gz")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["a.fastq.gz", "b.fastq.gz"]);
    }
}
