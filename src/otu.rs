//! Rewrite the taxonomy of an OTU table into a fixed-rank NCBI lineage.
//!
//! Every OTU carries a free-text taxonomy such as
//! `Bacteria; Firmicutes; Bacilli; ...; uncultured bacterium`. Starting from the most
//! specific entry, placeholder entries are skipped and the first usable one is
//! fuzzy-matched against the NCBI names of the corresponding rank. The first match
//! that reaches the threshold decides the lineage; misses are written to an optional
//! mismatch log and the next less specific entry is tried.
//!
//! # Output
//!
//! - Per OTU (default): `Name`, `Taxonomy`, one column per sample, `Sequence`.
//! - Collapsed (`--collapse`): one row per distinct lineage with summed abundances,
//!   columns `highest_taxonomy`, `taxonomy`, one column per sample.
use clap::ValueEnum;
use fnv::FnvHashMap;
use log::{debug, info};
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use crate::_files::{ensure_exists, progress_bar};
use crate::error::{MbError, Result};
use crate::fuzzy::{extract_one, Scorer};
use crate::taxonomy::{Taxonomy, Txid};

/// Ranks searched for each position of a taxonomy string, least specific first.
pub const LEVEL_RANKS: [&[&str]; 7] = [
    &["kingdom", "superkingdom", "domain"],
    &["phylum"],
    &["class"],
    &["order"],
    &["family"],
    &["genus"],
    &["species", "strain"],
];

/// Canonical ranks below the top rank, in output order.
const CANONICAL_BELOW_TOP: [&str; 6] = ["phylum", "class", "order", "family", "genus", "species"];

const PLACEHOLDER_WORDS: [&str; 5] = [
    "uncultured",
    "metagenome",
    "unknown",
    "unclassified",
    "unidentified",
];

/// Lineage written for OTUs without an accepted match.
pub const UNRESOLVED: &str = "N/A";

const REPORT_EVERY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchDb {
    /// Match each entry against the ranks of its own level.
    #[clap(name = "taxonomy")]
    Taxonomy,
    /// Match each entry against every rank. Slow.
    #[clap(name = "all")]
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub scorer: Scorer,
    pub match_db: MatchDb,
    /// Minimum rounded score, 0..=100.
    pub threshold: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub txid: Txid,
    pub score: f64,
}

/// A query that did not reach the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub query: String,
    pub level: usize,
    pub best: Option<Candidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub accepted: Option<Candidate>,
    pub misses: Vec<Mismatch>,
    /// Seven names, one per canonical rank, when a match was accepted.
    pub lineage: Option<Vec<String>>,
}

impl Resolution {
    pub fn lineage_string(&self) -> String {
        match &self.lineage {
            Some(names) => names.join("; "),
            None => UNRESOLVED.to_owned(),
        }
    }
}

/// Level of position `index` in a taxonomy string; positions past species count as species.
pub fn level_of(index: usize) -> usize {
    index.min(LEVEL_RANKS.len() - 1)
}

/// Clean one taxonomy entry, or `None` if it is blank or a placeholder.
pub fn usable_text(entry: &str) -> Option<String> {
    let entry = entry.trim();
    let lower = entry.to_lowercase();
    if entry.is_empty() || PLACEHOLDER_WORDS.iter().any(|w| lower.contains(w)) {
        return None;
    }
    let cleaned: String = entry
        .split('(')
        .next()
        .unwrap_or("")
        .trim()
        .chars()
        .filter(|c| *c != '[' && *c != ']')
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub struct Resolver<'t> {
    taxonomy: &'t Taxonomy,
    config: ResolverConfig,
}

impl<'t> Resolver<'t> {
    pub fn new(taxonomy: &'t Taxonomy, config: ResolverConfig) -> Self {
        Resolver { taxonomy, config }
    }

    fn ranks_for(&self, level: usize) -> Vec<&'static str> {
        match self.config.match_db {
            MatchDb::Taxonomy => LEVEL_RANKS[level].to_vec(),
            MatchDb::All => LEVEL_RANKS.iter().flat_map(|r| r.iter().copied()).collect(),
        }
    }

    /// Best candidate for `query` across the ranks searched at `level`.
    pub fn best_candidate(&self, query: &str, level: usize) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for rank in self.ranks_for(level) {
            let pool = match self.taxonomy.names(rank) {
                Some(pool) if !pool.is_empty() => pool,
                _ => continue,
            };
            if let Some((name, txid, score)) = extract_one(query, pool.iter(), self.config.scorer) {
                let better = best.as_ref().map(|b| score > b.score).unwrap_or(true);
                if better {
                    best = Some(Candidate {
                        name: name.to_owned(),
                        txid,
                        score,
                    });
                }
            }
        }
        best
    }

    fn passes(&self, candidate: &Candidate) -> bool {
        candidate.score.round_ties_even() >= f64::from(self.config.threshold)
    }

    /// Resolve a `;` separated taxonomy string.
    pub fn resolve(&self, taxonomy: &str) -> Result<Resolution> {
        let entries: Vec<&str> = taxonomy.split(';').map(str::trim).collect();
        let mut misses = Vec::new();

        for (index, entry) in entries.iter().enumerate().rev() {
            let query = match usable_text(entry) {
                Some(q) => q,
                None => continue,
            };
            let level = level_of(index);
            match self.best_candidate(&query, level) {
                Some(candidate) if self.passes(&candidate) => {
                    let lineage = self.project(candidate.txid)?;
                    if lineage.is_none() {
                        debug!("{} ({}) has no canonical ranks", candidate.name, candidate.txid);
                    }
                    return Ok(Resolution {
                        lineage,
                        accepted: Some(candidate),
                        misses,
                    });
                }
                best => misses.push(Mismatch { query, level, best }),
            }
        }
        Ok(Resolution {
            accepted: None,
            misses,
            lineage: None,
        })
    }

    /// Project the lineage of `txid` onto the seven canonical ranks.
    ///
    /// Missing ranks become `Unclassified <name>` after the nearest known higher
    /// rank, or the nearest known lower rank when nothing above is known. Returns
    /// `None` when the lineage has no canonical rank at all.
    pub fn project(&self, txid: Txid) -> Result<Option<Vec<String>>> {
        let mut chain = self.taxonomy.lineage(txid)?;
        chain.reverse();
        let ranked: Vec<(&str, Txid)> = chain
            .iter()
            .filter_map(|t| self.taxonomy.node(*t).map(|n| (n.rank.as_str(), *t)))
            .collect();
        let has = |rank: &str| ranked.iter().any(|(r, _)| *r == rank);
        let top = if has("superkingdom") {
            "superkingdom"
        } else if has("domain") {
            "domain"
        } else {
            "kingdom"
        };

        let known: Vec<Option<String>> = std::iter::once(top)
            .chain(CANONICAL_BELOW_TOP.iter().copied())
            .map(|rank| {
                ranked
                    .iter()
                    .find(|(r, _)| *r == rank)
                    .map(|(_, t)| self.taxonomy.name_of(*t))
            })
            .collect();
        if known.iter().all(Option::is_none) {
            return Ok(None);
        }

        let names = (0..known.len())
            .map(|i| match &known[i] {
                Some(name) => name.clone(),
                None => {
                    let above = known[..i].iter().rev().flatten().next();
                    let below = known[i + 1..].iter().flatten().next();
                    // at least one side is known, checked above
                    let nearest = above.or(below).map(String::as_str).unwrap_or_default();
                    format!("Unclassified {}", nearest)
                }
            })
            .collect();
        Ok(Some(names))
    }
}

/// A rewritten table, ready to be written as CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct OtuTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

struct Columns {
    name: Option<usize>,
    taxonomy: usize,
    sequence: Option<usize>,
    samples: Vec<(usize, String)>,
}

fn locate_columns(headers: &csv::StringRecord, path: &Path, collapse: bool) -> Result<Columns> {
    let find = |column: &str| headers.iter().position(|h| h.trim() == column);
    let require = |column: &str| {
        find(column).ok_or_else(|| MbError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_owned(),
        })
    };
    let taxonomy = require("Taxonomy")?;
    let (name, sequence) = if collapse {
        (find("Name"), find("Sequence"))
    } else {
        (Some(require("Name")?), Some(require("Sequence")?))
    };
    let samples = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.contains("Abundance") && !h.contains("Combined"))
        .map(|(i, h)| (i, h.replace("Abundance", "").trim().to_owned()))
        .collect();
    Ok(Columns {
        name,
        taxonomy,
        sequence,
        samples,
    })
}

fn parse_count(value: &str, column: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| MbError::BadNumber {
        column: column.to_owned(),
        value: value.to_owned(),
    })
}

fn write_misses<W: Write>(sink: &mut Option<&mut csv::Writer<W>>, misses: &[Mismatch]) -> Result<()> {
    if let Some(writer) = sink.as_mut() {
        for miss in misses {
            let (name, txid, score) = match &miss.best {
                Some(b) => (b.name.clone(), b.txid.to_string(), b.score.to_string()),
                None => (UNRESOLVED.to_owned(), UNRESOLVED.to_owned(), "0".to_owned()),
            };
            writer.write_record([
                miss.query.clone(),
                miss.level.to_string(),
                name,
                txid,
                score,
            ])?;
        }
    }
    Ok(())
}

/// Header of the mismatch log.
pub const MISMATCH_HEADER: [&str; 5] = [
    "taxon_query",
    "taxon_level",
    "best_match",
    "best_match_txid",
    "best_match_score",
];

/// Resolve every OTU of `reader` and build the output table.
///
/// `path` is only used in error messages. Misses are written to `mismatches` as they occur.
pub fn rewrite_otus<R: Read, W: Write>(
    resolver: &Resolver,
    reader: &mut csv::Reader<R>,
    path: &Path,
    collapse: bool,
    mut mismatches: Option<&mut csv::Writer<W>>,
) -> Result<OtuTable> {
    let columns = locate_columns(reader.headers()?, path, collapse)?;
    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    let total = records.len();
    let bar = progress_bar(total as u64, "OTUs");
    let start = Instant::now();

    let mut cache: FnvHashMap<String, Resolution> = FnvHashMap::default();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(total);
    let mut collapsed: Vec<(String, Vec<u64>)> = Vec::new();
    let mut collapsed_index: FnvHashMap<String, usize> = FnvHashMap::default();

    for (n, record) in records.iter().enumerate() {
        let raw_taxonomy = record.get(columns.taxonomy).unwrap_or("");
        if !cache.contains_key(raw_taxonomy) {
            let resolution = resolver.resolve(raw_taxonomy)?;
            if let Some(hit) = &resolution.accepted {
                debug!("{:?} -> {} ({}, score {:.1})", raw_taxonomy, hit.name, hit.txid, hit.score);
            }
            cache.insert(raw_taxonomy.to_owned(), resolution);
        }
        let resolution = &cache[raw_taxonomy];
        write_misses(&mut mismatches, &resolution.misses)?;
        let lineage = resolution.lineage_string();

        let counts = columns
            .samples
            .iter()
            .map(|(i, sample)| parse_count(record.get(*i).unwrap_or(""), sample))
            .collect::<Result<Vec<u64>>>()?;

        if collapse {
            match collapsed_index.get(&lineage) {
                Some(&i) => {
                    for (sum, c) in collapsed[i].1.iter_mut().zip(&counts) {
                        *sum += c;
                    }
                }
                None => {
                    collapsed_index.insert(lineage.clone(), collapsed.len());
                    collapsed.push((lineage, counts));
                }
            }
        } else {
            let cell = |i: Option<usize>| i.and_then(|i| record.get(i)).unwrap_or("").to_owned();
            let mut row = vec![cell(columns.name), lineage];
            row.extend(counts.iter().map(u64::to_string));
            row.push(cell(columns.sequence));
            rows.push(row);
        }

        bar.inc(1);
        if (n + 1) % REPORT_EVERY == 0 {
            info!(
                "Completed: {}/{} | ({:.3} s. elapsed)",
                n + 1,
                total,
                start.elapsed().as_secs_f64()
            );
        }
    }
    bar.finish_and_clear();
    debug!("{} distinct taxonomy strings resolved", cache.len());

    let sample_names = columns.samples.iter().map(|(_, s)| s.clone());
    let header = if collapse {
        ["highest_taxonomy".to_owned(), "taxonomy".to_owned()]
            .into_iter()
            .chain(sample_names)
            .collect()
    } else {
        ["Name".to_owned(), "Taxonomy".to_owned()]
            .into_iter()
            .chain(sample_names)
            .chain(std::iter::once("Sequence".to_owned()))
            .collect()
    };
    if collapse {
        rows = collapsed
            .into_iter()
            .map(|(lineage, counts)| {
                let highest = lineage
                    .rsplit(';')
                    .next()
                    .unwrap_or(UNRESOLVED)
                    .trim()
                    .to_owned();
                let mut row = vec![highest, lineage];
                row.extend(counts.iter().map(u64::to_string));
                row
            })
            .collect();
    }
    Ok(OtuTable { header, rows })
}

pub struct OtuArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub nodes: PathBuf,
    pub names: PathBuf,
    pub mismatches: Option<PathBuf>,
    pub collapse: bool,
    pub config: ResolverConfig,
}

/// Load the taxonomy, rewrite the OTU table at `args.input` and write it to `args.output`.
pub fn fuzzy_otu(args: OtuArgs) -> Result<()> {
    ensure_exists(&args.input)?;
    let taxonomy = Taxonomy::from_dump(&args.nodes, &args.names)?;
    for ranks in LEVEL_RANKS {
        for rank in ranks {
            let count = taxonomy.names(rank).map(|p| p.len()).unwrap_or(0);
            debug!("{} candidate names for rank {}", count, rank);
        }
    }
    let resolver = Resolver::new(&taxonomy, args.config);

    let mut mismatch_writer = match &args.mismatches {
        Some(path) => {
            let mut w = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
            w.write_record(MISMATCH_HEADER)?;
            Some(w)
        }
        None => None,
    };

    let mut reader = csv::ReaderBuilder::new().from_path(&args.input)?;
    let table = rewrite_otus(
        &resolver,
        &mut reader,
        &args.input,
        args.collapse,
        mismatch_writer.as_mut(),
    )?;
    if let Some(w) = mismatch_writer.as_mut() {
        w.flush()?;
    }

    let mut writer = csv::Writer::from_path(&args.output)?;
    writer.write_record(&table.header)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    info!(
        "Produced resulting OTU table {:?} ({} rows)",
        args.output,
        table.rows.len()
    );
    Ok(())
}
