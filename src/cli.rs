use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::fuzzy::Scorer;
use crate::otu::MatchDb;

#[derive(Debug, Parser)]
#[clap(version, about = "Helper tools for amplicon sequencing with QIIME 2", long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(short, long, global = true, action)]
    /// Log debug messages
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[clap(about = "Rename IonTorrent FASTQ files to CASAVA 1.8 names and write their metadata")]
    IonToCasava {
        #[clap(value_parser)]
        /// Directory of IonXpress FASTQ files
        input_dir: PathBuf,

        #[clap(short, long, value_parser)]
        /// IonXpress barcode sheet (CSV)
        barcodes: PathBuf,

        #[clap(short, long, value_parser)]
        /// Metadata TSV to write [default: <input_dir>/../metadata.tsv]
        metadata: Option<PathBuf>,

        #[clap(long, action)]
        /// Write metadata and log the renames without renaming anything
        dry_run: bool,
    },
    #[clap(about = "Write a single-end QIIME manifest for IonXpress FASTQ files")]
    IonManifest {
        #[clap(value_parser)]
        /// Directory of IonXpress FASTQ files
        input_dir: PathBuf,

        #[clap(short, long, value_parser)]
        /// Manifest to write [default: <input_dir>/manifest.tsv]
        output: Option<PathBuf>,
    },
    #[clap(about = "Write QIIME metadata for a directory of paired CASAVA FASTQ files")]
    CasavaMetadata {
        #[clap(value_parser)]
        /// Directory of <sample>_S1_L001_R{1,2}_001.fastq.gz files
        input_dir: PathBuf,

        #[clap(short, long, value_parser)]
        /// Metadata to write [default: <input_dir>/metadata.tab]
        output: Option<PathBuf>,
    },
    #[clap(about = "Merge a QIIME import manifest and a MiSeq sample sheet into sample metadata")]
    SamplesheetMetadata {
        #[clap(short = 'M', long, value_parser)]
        /// QIIME import manifest (TSV)
        manifest: PathBuf,

        #[clap(short = 'S', long, value_parser)]
        /// MiSeq SampleSheet.csv
        samplesheet: PathBuf,

        #[clap(short = 'O', long, value_parser, default_value = "sample-metadata.tsv")]
        /// Sample metadata to write
        output: PathBuf,
    },
    #[clap(about = "Demultiplex QIAseq phased primers with cutadapt")]
    Demux {
        #[clap(value_parser)]
        /// Directory of *_R1_*.fastq.gz files and their R2 mates
        input_dir: PathBuf,

        #[clap(short, long = "out", value_parser)]
        /// Directory for the per-region FASTQ files
        output_dir: PathBuf,

        #[clap(short, long = "cat", value_parser)]
        /// Also concatenate each sample's region files into this directory
        cat_dir: Option<PathBuf>,

        #[clap(short, long, conflicts_with = "pools", value_parser)]
        /// Only these regions, e.g. "V1V2;V3V4"
        regions: Option<String>,

        #[clap(short, long, value_parser)]
        /// Only the regions of these primer pools, e.g. "1;2"
        pools: Option<String>,

        #[clap(short = 'j', long, default_value_t = 4, value_parser)]
        /// Cores passed to cutadapt
        cores: usize,

        #[clap(long, value_parser)]
        /// cutadapt executable [default: cutadapt on PATH]
        cutadapt: Option<PathBuf>,
    },
    #[clap(about = "Import demultiplexed reads into a QIIME 2 artifact")]
    QiimeImport {
        #[clap(value_parser)]
        /// Directory of CASAVA named FASTQ files
        input: PathBuf,

        #[clap(short, long, value_parser)]
        /// Directory for imported_demux_paired_end.qza
        output_dir: PathBuf,

        #[clap(long = "type", default_value = "SampleData[PairedEndSequencesWithQuality]", value_parser)]
        /// QIIME semantic type
        semantic_type: String,

        #[clap(long, default_value = "CasavaOneEightSingleLanePerSampleDirFmt", value_parser)]
        /// QIIME input format
        input_format: String,

        #[clap(long, value_parser)]
        /// qiime executable [default: qiime on PATH]
        qiime: Option<PathBuf>,
    },
    #[clap(about = "Compare read assignment of two demultiplexers")]
    CompareDemux {
        #[clap(value_parser)]
        /// Directory of FASTQ files from `mbtools demux`
        input_dir: PathBuf,

        #[clap(short = 'i', long = "i-clc", value_parser)]
        /// Directory of FASTQ files from the other demultiplexer
        other_dir: PathBuf,

        #[clap(short, long, default_value = ".", value_parser)]
        /// Directory for results_by-region.csv and results_r1-r2.csv
        output_dir: PathBuf,
    },
    #[clap(about = "Fuzzy match OTU taxonomy strings against the NCBI taxonomy")]
    FuzzyOtu {
        #[clap(value_parser)]
        /// OTU table (CSV) with Name, Taxonomy, <sample> Abundance and Sequence columns
        input: PathBuf,

        #[clap(short, long = "out", default_value = "output.csv", value_parser)]
        /// Rewritten OTU table
        output: PathBuf,

        #[clap(long, value_parser)]
        /// NCBI nodes.dmp (plain or .gz)
        nodes: PathBuf,

        #[clap(long, value_parser)]
        /// NCBI names.dmp (plain or .gz)
        names: PathBuf,

        #[clap(long, value_parser)]
        /// Write rejected matches to this TSV
        output_mismatches: Option<PathBuf>,

        #[clap(long, value_enum, default_value = "partial_ratio")]
        /// Similarity scorer
        scorer: Scorer,

        #[clap(long, value_enum, default_value = "taxonomy")]
        /// Match against the names of the entry's rank, or of every rank.
        /// An entry that misses the threshold is scored against every name
        /// in the pool, which is slow with `all` on a full NCBI dump
        match_db: MatchDb,

        #[clap(long, default_value_t = 99, value_parser = clap::value_parser!(u8).range(0..=100))]
        /// Minimum rounded score to accept a match
        match_threshold: u8,

        #[clap(long, action)]
        /// Sum abundances of OTUs that resolve to the same lineage
        collapse: bool,
    },
    #[clap(about = "Summarize AMRFinder CSV reports into a sample x gene table")]
    AmrSummary {
        #[clap(value_parser)]
        /// Directory of AMRFinder .csv reports
        input_dir: PathBuf,

        #[clap(short, long, default_value = ".", value_parser)]
        /// Directory for output.csv
        output_dir: PathBuf,
    },
    #[clap(about = "Build a neighbour-joining Newick tree of the samples in an amr-summary table")]
    AmrTree {
        #[clap(value_parser)]
        /// Summary table written by `mbtools amr-summary`
        input: PathBuf,

        #[clap(short, long, value_parser)]
        /// Newick file to write [default: print to stdout]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fuzzy_otu_defaults() {
        let cli = Cli::parse_from(["mbtools", "fuzzy-otu", "otus.csv", "--nodes", "n.dmp", "--names", "m.dmp"]);
        match cli.command {
            Commands::FuzzyOtu {
                output,
                scorer,
                match_db,
                match_threshold,
                collapse,
                output_mismatches,
                ..
            } => {
                assert_eq!(output, PathBuf::from("output.csv"));
                assert_eq!(scorer, Scorer::PartialRatio);
                assert_eq!(match_db, MatchDb::Taxonomy);
                assert_eq!(match_threshold, 99);
                assert!(!collapse);
                assert!(output_mismatches.is_none());
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn test_demux_regions_conflict_with_pools() {
        let res = Cli::try_parse_from([
            "mbtools", "demux", "raw", "-o", "out", "--regions", "V1V2", "--pools", "1",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_threshold_range() {
        let res = Cli::try_parse_from([
            "mbtools", "fuzzy-otu", "o.csv", "--nodes", "n", "--names", "m", "--match-threshold", "101",
        ]);
        assert!(res.is_err());
        let cli = Cli::try_parse_from([
            "mbtools", "-v", "fuzzy-otu", "o.csv", "--nodes", "n", "--names", "m", "--scorer", "QRatio",
        ])
        .unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_amr_tree_output_is_optional() {
        let cli = Cli::parse_from(["mbtools", "amr-tree", "output.csv"]);
        match cli.command {
            Commands::AmrTree { input, output } => {
                assert_eq!(input, PathBuf::from("output.csv"));
                assert!(output.is_none());
            }
            other => panic!("parsed {:?}", other),
        }
        let cli = Cli::parse_from(["mbtools", "amr-tree", "output.csv", "-o", "tree.nwk"]);
        assert!(matches!(cli.command, Commands::AmrTree { output: Some(_), .. }));
    }
}
