//! Command line front-end: split DICOM files into volumes, or extract a slice.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dicom_volume_split::{
    Config, VolumeLoader,
    config::{ConfigError, parse_tag},
};
use tracing::{Level, error, info};

/// Split DICOM files into volumes and extract slice images
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Print debug information
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Group files into volumes and print the volume catalog as JSON
    SplitAndSort {
        /// File names to categorize
        #[arg(short = 'f', long = "files", num_args = 1.., required = true)]
        files: Vec<PathBuf>,

        /// Extra restriction tag in GGGG|EEEE format (hexadecimal)
        #[arg(short = 'r', long = "restriction")]
        restrictions: Vec<String>,

        /// Do not delete the input files after a successful run
        #[arg(long = "keep-inputs")]
        keep_inputs: bool,

        /// Report file names relative to this directory
        #[arg(long = "base-dir")]
        base_dir: Option<PathBuf>,

        /// Print the full report (statuses, metadata, errors) instead of the catalog
        #[arg(long = "report")]
        report: bool,
    },
    /// Write the image of a single slice
    Slice {
        /// File to generate the image for
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Generate an 8-bit thumbnail
        #[arg(short = 't', long = "thumbnail")]
        thumbnail: bool,

        /// Path to the output image
        /// (default is to replace input extension with `.png`)
        #[arg(short = 'o', long = "out")]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::from_toml_file(path),
        None => Ok(Config::default()),
    }
}

fn main() {
    let App {
        command,
        config,
        verbose,
    } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .with_writer(std::io::stderr)
            .finish(),
    )
    .unwrap_or_else(|e| {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    });

    let mut config = load_config(config.as_ref()).unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(-1);
    });

    match command {
        Command::SplitAndSort {
            files,
            restrictions,
            keep_inputs,
            base_dir,
            report,
        } => {
            for restriction in &restrictions {
                let tag = parse_tag(restriction).unwrap_or_else(|e| {
                    error!("{e}");
                    std::process::exit(-1);
                });
                config = config.with_restriction(tag);
            }
            if keep_inputs {
                config.consume_inputs = false;
            }
            if base_dir.is_some() {
                config.base_dir = base_dir;
            }

            let result = VolumeLoader::new(config).load_from_file_paths(&files);
            let catalog_report = result.unwrap_or_else(|e| {
                error!("{e}");
                std::process::exit(-2);
            });

            let json = if report {
                catalog_report.to_json_pretty()
            } else {
                catalog_report.catalog.to_json_pretty()
            };
            match json {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    error!("{e}");
                    std::process::exit(-3);
                }
            }
        }
        Command::Slice {
            file,
            thumbnail,
            output,
        } => {
            let output = output.unwrap_or_else(|| {
                let mut path = file.clone();
                path.set_extension("png");
                path
            });

            let image = VolumeLoader::new(config)
                .extract_file(&file, thumbnail)
                .unwrap_or_else(|e| {
                    error!("{e}");
                    std::process::exit(-2);
                });

            image.save(&output).unwrap_or_else(|e| {
                error!("{e}");
                std::process::exit(-4);
            });
            info!(
                "{}x{}x{} {:?} image saved to {}",
                image.width,
                image.height,
                image.channels,
                image.sample_type(),
                output.display()
            );
        }
    }
}
