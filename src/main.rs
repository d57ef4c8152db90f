use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gears::{normalize, output};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gears", author, version, about, long_about = None)]
struct Args {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a vendor GPS table into the canonical schema
    NormalizeGps {
        #[arg(long = "in", value_name = "FILE")]
        path_in: PathBuf,

        /// Vendor mapping (YAML)
        #[arg(long = "map", value_name = "FILE")]
        mapping: PathBuf,

        /// Output table; .parquet/.pq writes Parquet, anything else CSV
        #[arg(long = "out", value_name = "FILE")]
        path_out: PathBuf,

        /// Optional JSON ingest report
        #[arg(long = "report", value_name = "FILE")]
        path_report: Option<PathBuf>,
    },

    /// Normalize points of interest (not available yet)
    NormalizePois {
        #[arg(long = "in", value_name = "FILE")]
        path_in: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.cmd {
        Command::NormalizeGps {
            path_in,
            mapping,
            path_out,
            path_report,
        } => {
            let start_time = Instant::now();
            let (table, report) = normalize(&path_in, &mapping)
                .with_context(|| format!("normalizing {}", path_in.display()))?;

            output::write_table(&table, &path_out)?;
            if let Some(path_report) = path_report {
                output::write_report(&report, &path_report)?;
            }

            tracing::debug!(elapsed_ms = start_time.elapsed().as_millis() as u64, "done");
            println!("Wrote {} rows to {}", table.len(), path_out.display());
        }
        Command::NormalizePois { path_in } => {
            bail!(
                "normalize-pois is not implemented yet (input {})",
                path_in.display()
            );
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
