//! Neighbour-joining tree of the samples in an `amr-summary` table.
//!
//! The distance between two samples is the sum over genes of the absolute
//! difference of their scores. The tree is printed in Newick format.
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::_files::ensure_exists;
use crate::error::{MbError, Result};

/// Sample ids and their per-gene scores, one row per sample.
#[derive(Debug)]
pub struct ScoreTable {
    pub samples: Vec<String>,
    pub scores: Vec<Vec<f64>>,
}

fn parse_score(value: &str, column: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(MbError::BadNumber {
            column: column.to_owned(),
            value: value.to_owned(),
        }),
    }
}

/// Read a table whose first column holds sample ids and whose other columns hold gene scores.
pub fn read_summary(path: &Path) -> Result<ScoreTable> {
    ensure_exists(path)?;
    let mut rdr = csv::Reader::from_path(path)?;
    let genes: Vec<String> = rdr.headers()?.iter().skip(1).map(str::to_owned).collect();

    let mut table = ScoreTable {
        samples: Vec::new(),
        scores: Vec::new(),
    };
    for record in rdr.records() {
        let record = record?;
        let sample = record.get(0).unwrap_or("").trim();
        if sample.is_empty() {
            continue;
        }
        if table.samples.iter().any(|s| s == sample) {
            return Err(MbError::DuplicateSample(sample.to_owned()));
        }
        let scores = genes
            .iter()
            .enumerate()
            .map(|(i, gene)| parse_score(record.get(i + 1).unwrap_or(""), gene))
            .collect::<Result<Vec<f64>>>()?;
        table.samples.push(sample.to_owned());
        table.scores.push(scores);
    }
    debug!("{} samples x {} genes in {:?}", table.samples.len(), genes.len(), path);
    Ok(table)
}

/// Pairwise distances: the sum of absolute score differences over all genes.
pub fn distance_matrix(scores: &[Vec<f64>]) -> Vec<Vec<f64>> {
    scores
        .iter()
        .map(|a| {
            scores
                .iter()
                .map(|b| a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum())
                .collect()
        })
        .collect()
}

/// Quote a Newick label when it holds characters with a meaning in the format.
fn newick_label(name: &str) -> String {
    if name.chars().any(|c| " ():;,[]'".contains(c)) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_owned()
    }
}

/// Negative branch lengths are set to zero.
fn branch(len: f64) -> f64 {
    if len > 0.0 {
        len
    } else {
        0.0
    }
}

/// Join the closest pair until three nodes are left, then close the unrooted tree.
///
/// Ties in the Q matrix go to the first pair in row order.
pub fn neighbor_joining(labels: &[String], dist: &[Vec<f64>]) -> Result<String> {
    if labels.len() < 3 {
        return Err(MbError::TooFewSamples(labels.len()));
    }
    let mut labels: Vec<String> = labels.iter().map(|l| newick_label(l)).collect();
    let mut dist = dist.to_vec();

    while labels.len() > 3 {
        let n = labels.len();
        let sums: Vec<f64> = dist.iter().map(|row| row.iter().sum()).collect();
        let (mut i, mut j, mut lowest) = (0, 1, f64::INFINITY);
        for a in 0..n {
            for b in (a + 1)..n {
                let q = (n as f64 - 2.0) * dist[a][b] - sums[a] - sums[b];
                if q < lowest {
                    lowest = q;
                    i = a;
                    j = b;
                }
            }
        }

        let d_ij = dist[i][j];
        let d_i = 0.5 * d_ij + (sums[i] - sums[j]) / (2.0 * (n as f64 - 2.0));
        let d_j = d_ij - d_i;
        let node = format!("({}:{},{}:{})", labels[i], branch(d_i), labels[j], branch(d_j));

        // the new node takes index 0, the untouched nodes follow in their old order
        let rest: Vec<usize> = (0..n).filter(|&k| k != i && k != j).collect();
        let mut next = vec![vec![0.0; rest.len() + 1]; rest.len() + 1];
        for (a, &k) in rest.iter().enumerate() {
            let d = 0.5 * (dist[i][k] + dist[j][k] - d_ij);
            next[0][a + 1] = d;
            next[a + 1][0] = d;
            for (b, &m) in rest.iter().enumerate() {
                next[a + 1][b + 1] = dist[k][m];
            }
        }
        let mut next_labels = vec![node];
        next_labels.extend(rest.iter().map(|&k| labels[k].clone()));
        labels = next_labels;
        dist = next;
    }

    let (d01, d02, d12) = (dist[0][1], dist[0][2], dist[1][2]);
    Ok(format!(
        "({}:{},{}:{},{}:{});",
        labels[0],
        branch(0.5 * (d01 + d02 - d12)),
        labels[1],
        branch(0.5 * (d01 + d12 - d02)),
        labels[2],
        branch(0.5 * (d02 + d12 - d01)),
    ))
}

pub fn amr_tree(input: PathBuf, output: Option<PathBuf>) -> Result<String> {
    let table = read_summary(&input)?;
    let dist = distance_matrix(&table.scores);
    let tree = neighbor_joining(&table.samples, &dist)?;
    match output {
        Some(path) => {
            fs::write(&path, format!("{}\n", tree))?;
            info!("Wrote tree of {} samples to {:?}", table.samples.len(), path);
        }
        None => println!("{}", tree),
    }
    Ok(tree)
}
