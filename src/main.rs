mod _files;
mod amr_summary;
mod amr_tree;
mod cli;
mod compare;
mod demux;
mod error;
mod external;
mod fuzzy;
mod ion;
mod metadata;
mod otu;
mod pivot;
mod taxonomy;
use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{error, LevelFilter};
use std::io::Write;

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .parse_default_env()
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::IonToCasava {
            input_dir,
            barcodes,
            metadata,
            dry_run,
        } => crate::ion::ion_to_casava(input_dir, barcodes, metadata, dry_run)
            .context("ion-to-casava failed"),
        Commands::IonManifest { input_dir, output } => {
            crate::ion::ion_manifest(input_dir, output).context("ion-manifest failed")
        }
        Commands::CasavaMetadata { input_dir, output } => {
            crate::metadata::casava_metadata(input_dir, output).context("casava-metadata failed")
        }
        Commands::SamplesheetMetadata {
            manifest,
            samplesheet,
            output,
        } => crate::metadata::samplesheet_metadata(manifest, samplesheet, output)
            .context("samplesheet-metadata failed"),
        Commands::Demux {
            input_dir,
            output_dir,
            cat_dir,
            regions,
            pools,
            cores,
            cutadapt,
        } => crate::demux::demux(crate::demux::DemuxArgs {
            input_dir,
            output_dir,
            cat_dir,
            selection: crate::demux::Selection::from_flags(regions, pools),
            cores,
            cutadapt,
        })
        .context("demux failed"),
        Commands::QiimeImport {
            input,
            output_dir,
            semantic_type,
            input_format,
            qiime,
        } => crate::external::qiime_import(crate::external::ImportArgs {
            input,
            output_dir,
            semantic_type,
            input_format,
            qiime,
        })
        .map(|_| ())
        .context("qiime-import failed"),
        Commands::CompareDemux {
            input_dir,
            other_dir,
            output_dir,
        } => crate::compare::compare_demux(crate::compare::CompareArgs {
            custom_dir: input_dir,
            other_dir,
            output_dir,
        })
        .map(|_| ())
        .context("compare-demux failed"),
        Commands::FuzzyOtu {
            input,
            output,
            nodes,
            names,
            output_mismatches,
            scorer,
            match_db,
            match_threshold,
            collapse,
        } => crate::otu::fuzzy_otu(crate::otu::OtuArgs {
            input,
            output,
            nodes,
            names,
            mismatches: output_mismatches,
            collapse,
            config: crate::otu::ResolverConfig {
                scorer,
                match_db,
                threshold: match_threshold,
            },
        })
        .context("fuzzy-otu failed"),
        Commands::AmrSummary {
            input_dir,
            output_dir,
        } => crate::amr_summary::amr_summary(input_dir, output_dir)
            .map(|_| ())
            .context("amr-summary failed"),
        Commands::AmrTree { input, output } => crate::amr_tree::amr_tree(input, output)
            .map(|_| ())
            .context("amr-tree failed"),
    }
}

fn main() {
    let args = Cli::parse();
    init_logger(args.verbose);

    if let Err(err) = run(args.command) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
