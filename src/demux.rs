//! Demultiplex QIAseq phased-primer amplicon pools by running cutadapt once per region.
//!
//! Each region run reads the untrimmed output of the previous run, so a read pair
//! ends up in the first region whose primer pair matches, or in the `ungrouped`
//! files when none does.
use log::{debug, info};
use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::_files::{ensure_exists, insert_token, list_files, progress_bar};
use crate::error::{MbError, Result};
use crate::external::Tool;

#[derive(Debug, PartialEq, Eq)]
pub struct Primer {
    pub region: &'static str,
    pub forward: &'static str,
    pub reverse: &'static str,
}

pub static PRIMERS: [Primer; 7] = [
    Primer { region: "V1V2", forward: "AGRGTTTGATYMTGGCTC", reverse: "CTGCTGCCTYCCGTA" },
    Primer { region: "V2V3", forward: "GGCGNACGGGTGAGTAA", reverse: "WTTACCGCGGCTGCTGG" },
    Primer { region: "V3V4", forward: "CCTACGGGNGGCWGCAG", reverse: "GACTACHVGGGTATCTAATCC" },
    Primer { region: "V4V5", forward: "GTGYCAGCMGCCGCGGTAA", reverse: "CCGYCAATTYMTTTRAGTTT" },
    Primer { region: "V5V7", forward: "GGATTAGATACCCBRGTAGTC", reverse: "ACGTCRTCCCCDCCTTCCTC" },
    Primer { region: "V7V9", forward: "YAACGAGCGMRACCC", reverse: "TACGGYTACCTTGTTAYGACTT" },
    Primer { region: "ITS1", forward: "CTTGGTCATTTAGAGGAAGTAA", reverse: "GCTGCGTTCTTCATCGATGC" },
];

pub static POOLS: [(&str, &[&str]); 3] = [
    ("1", &["V1V2", "V4V5", "ITS1"]),
    ("2", &["V2V3", "V5V7"]),
    ("3", &["V3V4", "V7V9"]),
];

pub const UNGROUPED: &str = "ungrouped";
const FASTQ_GZ: &str = ".fastq.gz";

/// Which primer pairs to demultiplex with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// `;` separated region names, e.g. `V1V2;V3V4`.
    Regions(String),
    /// `;` separated pool numbers, e.g. `1;2`.
    Pools(String),
}

impl Selection {
    pub fn from_flags(regions: Option<String>, pools: Option<String>) -> Self {
        match (regions, pools) {
            (Some(r), _) => Selection::Regions(r),
            (None, Some(p)) => Selection::Pools(p),
            (None, None) => Selection::All,
        }
    }
}

fn primer(region: &str) -> Option<&'static Primer> {
    PRIMERS.iter().find(|p| p.region == region)
}

fn tokens(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(';')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
}

/// Resolve a selection to primer pairs in selection order, without duplicates.
///
/// Unknown regions or pools are dropped; nothing left is an error.
pub fn select_primers(selection: &Selection) -> Result<Vec<&'static Primer>> {
    let mut chosen: Vec<&'static Primer> = Vec::new();
    let mut push = |p: &'static Primer| {
        if !chosen.contains(&p) {
            chosen.push(p);
        }
    };
    let raw = match selection {
        Selection::All => {
            PRIMERS.iter().for_each(&mut push);
            return Ok(chosen);
        }
        Selection::Regions(list) => {
            for region in tokens(list) {
                match primer(&region) {
                    Some(p) => push(p),
                    None => debug!("Dropping unknown region {:?}", region),
                }
            }
            list
        }
        Selection::Pools(list) => {
            for pool in tokens(list) {
                match POOLS.iter().find(|(name, _)| *name == pool) {
                    Some((_, regions)) => regions.iter().filter_map(|r| primer(r)).for_each(&mut push),
                    None => debug!("Dropping unknown pool {:?}", pool),
                }
            }
            list
        }
    };
    if chosen.is_empty() {
        return Err(MbError::EmptyPrimerSelection(raw.clone()));
    }
    Ok(chosen)
}

/// File names for one read pair run through the region cascade.
#[derive(Debug)]
struct PairNames {
    r1_name: String,
    r2_name: String,
    r1_stem: String,
    r2_stem: String,
}

impl PairNames {
    fn new(r1_name: &str) -> Result<Self> {
        let convention = |msg: &str| MbError::NameConvention {
            file: r1_name.to_owned(),
            msg: msg.to_owned(),
        };
        let r1_stem = r1_name
            .strip_suffix(FASTQ_GZ)
            .ok_or_else(|| convention("not a .fastq.gz file"))?;
        let mut fields: Vec<&str> = r1_stem.split('_').collect();
        if fields.len() < 3 {
            return Err(convention("fewer than three '_' separated fields"));
        }
        // the read field is the last one that is exactly R1
        let read_at = fields
            .iter()
            .rposition(|f| *f == "R1")
            .ok_or_else(|| convention("no R1 field"))?;
        fields[read_at] = "R2";
        let r2_stem = fields.join("_");
        Ok(PairNames {
            r1_name: r1_name.to_owned(),
            r2_name: format!("{}{}", r2_stem, FASTQ_GZ),
            r1_stem: r1_stem.to_owned(),
            r2_stem,
        })
    }

    fn with_token(stem: &str, token: &str) -> String {
        // stems are checked for three fields in `new`
        let named = insert_token(stem, 3, token).unwrap_or_else(|| format!("{}_{}", stem, token));
        format!("{}{}", named, FASTQ_GZ)
    }

    fn tagged(&self, token: &str) -> (String, String) {
        (
            Self::with_token(&self.r1_stem, token),
            Self::with_token(&self.r2_stem, token),
        )
    }

    fn intermediate(&self, index: usize) -> (String, String) {
        (
            format!("{}_intermediate_{}{}", self.r1_stem, index, FASTQ_GZ),
            format!("{}_intermediate_{}{}", self.r2_stem, index, FASTQ_GZ),
        )
    }
}

pub fn cutadapt_args(
    primer: &Primer,
    outputs: (&Path, &Path),
    untrimmed: (&Path, &Path),
    inputs: (&Path, &Path),
    cores: usize,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push("--minimum-length".into());
    args.push("1".into());
    args.push("--pair-adapters".into());
    args.push("--pair-filter".into());
    args.push("any".into());
    args.push("--match-read-wildcards".into());
    args.push("-g".into());
    args.push(primer.forward.into());
    args.push("-G".into());
    args.push(primer.reverse.into());
    args.push("-o".into());
    args.push(outputs.0.into());
    args.push("-p".into());
    args.push(outputs.1.into());
    args.push("--untrimmed-output".into());
    args.push(untrimmed.0.into());
    args.push("--untrimmed-paired-output".into());
    args.push(untrimmed.1.into());
    args.push("--cores".into());
    args.push(cores.to_string().into());
    args.push(inputs.0.into());
    args.push(inputs.1.into());
    args
}

fn remove_pair(pair: &(PathBuf, PathBuf)) -> Result<()> {
    fs::remove_file(&pair.0)?;
    fs::remove_file(&pair.1)?;
    Ok(())
}

/// Run the region cascade for one read pair. Returns the region outputs per read, in region order.
fn demux_pair(
    cutadapt: &Tool,
    r1: &Path,
    output_dir: &Path,
    primers: &[&Primer],
    cores: usize,
) -> Result<(PairNames, Vec<(PathBuf, PathBuf)>)> {
    let file_name = r1
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MbError::NameConvention {
            file: r1.display().to_string(),
            msg: "not valid UTF-8".to_owned(),
        })?;
    let names = PairNames::new(file_name)?;
    let r2 = r1.with_file_name(&names.r2_name);
    ensure_exists(&r2)?;

    let mut current = (r1.to_path_buf(), r2);
    let mut previous_intermediate: Option<(PathBuf, PathBuf)> = None;
    let mut region_files = Vec::with_capacity(primers.len());

    for (index, primer) in primers.iter().enumerate() {
        let (o1, o2) = names.tagged(primer.region);
        let (u1, u2) = names.intermediate(index);
        let outputs = (output_dir.join(o1), output_dir.join(o2));
        let untrimmed = (output_dir.join(u1), output_dir.join(u2));
        debug!("{}: trimming {} primers", names.r1_name, primer.region);
        cutadapt.run(cutadapt_args(
            primer,
            (&outputs.0, &outputs.1),
            (&untrimmed.0, &untrimmed.1),
            (&current.0, &current.1),
            cores,
        ))?;
        if let Some(done) = previous_intermediate.take() {
            remove_pair(&done)?;
        }
        region_files.push(outputs);
        current = untrimmed.clone();
        previous_intermediate = Some(untrimmed);
    }

    if let Some((u1, u2)) = previous_intermediate {
        let (g1, g2) = names.tagged(UNGROUPED);
        fs::rename(&u1, output_dir.join(g1))?;
        fs::rename(&u2, output_dir.join(g2))?;
    }
    Ok((names, region_files))
}

/// Append `parts` byte for byte into `target`. Concatenated gzip members remain a valid gzip stream.
pub fn concatenate(parts: &[&Path], target: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(target)?);
    for part in parts {
        let mut rdr = BufReader::new(File::open(part)?);
        io::copy(&mut rdr, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

pub struct DemuxArgs {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cat_dir: Option<PathBuf>,
    pub selection: Selection,
    pub cores: usize,
    pub cutadapt: Option<PathBuf>,
}

pub fn demux(args: DemuxArgs) -> Result<()> {
    ensure_exists(&args.input_dir)?;
    let primers = select_primers(&args.selection)?;
    let cutadapt = Tool::cutadapt(args.cutadapt.clone());
    let version = cutadapt.presence_check()?;
    info!("Using cutadapt {}", version);

    fs::create_dir_all(&args.output_dir)?;
    if let Some(cat_dir) = &args.cat_dir {
        fs::create_dir_all(cat_dir)?;
    }

    let inputs = list_files(&args.input_dir, |n| n.contains("_R1_") && n.ends_with(FASTQ_GZ))?;
    let regions: Vec<&str> = primers.iter().map(|p| p.region).collect();
    info!(
        "Demultiplexing {} read pairs with {:?}",
        inputs.len(),
        regions
    );
    let bar = progress_bar(inputs.len() as u64, "read pairs");
    for r1 in &inputs {
        let (names, region_files) = demux_pair(&cutadapt, r1, &args.output_dir, &primers, args.cores)?;
        if let Some(cat_dir) = &args.cat_dir {
            let r1_parts: Vec<&Path> = region_files.iter().map(|(a, _)| a.as_path()).collect();
            let r2_parts: Vec<&Path> = region_files.iter().map(|(_, b)| b.as_path()).collect();
            concatenate(&r1_parts, &cat_dir.join(&names.r1_name))?;
            concatenate(&r2_parts, &cat_dir.join(&names.r2_name))?;
            debug!("Concatenated {}", names.r1_name);
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    info!("Demultiplexed {} read pairs into {:?}", inputs.len(), args.output_dir);
    Ok(())
}
