//! dsaps - batch operations against a DSpace REST API.
//!
//! Subcommands that talk to the repository log in first and log out when
//! done. Every run writes a JSON log under `--log-dir`.

mod commands;
mod logging;

use clap::{Args, Parser, Subcommand};
use dsaps_core::{DsapsError, QueryOperator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dsaps")]
#[command(version, about = "Batch operations against a DSpace REST API")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Directory for the JSON run logs
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// How to reach and log in to the repository.
#[derive(Args, Debug, Clone)]
struct ConnectionArgs {
    /// REST base URL, e.g. https://dspace.example.edu/rest
    #[arg(long, env = "DSPACE_URL", global = true)]
    url: Option<String>,

    /// Email of the account to log in as
    #[arg(short, long, env = "DSPACE_EMAIL", global = true)]
    email: Option<String>,

    /// Password (prompted for when absent)
    #[arg(short, long, env = "DSPACE_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, global = true)]
    insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove a metadata key from every item in a community
    DeleteKey {
        /// Metadata key to remove, e.g. dc.subject.other
        #[arg(short, long)]
        key: Option<String>,

        /// Handle of the community
        #[arg(short = 'i', long)]
        handle: Option<String>,

        /// Directory for the deletedValues audit CSV
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Items edited at the same time
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=32))]
        concurrency: u16,

        /// Leave one provenance note per removed value instead of one per item
        #[arg(long)]
        provenance_per_match: bool,
    },

    /// List the items matching a metadata search
    Search {
        /// Field to search, or * for any field
        #[arg(short, long)]
        field: String,

        /// Value to compare against
        #[arg(short, long, default_value = "")]
        string: String,

        /// Comparison to run
        #[arg(short = 't', long, default_value = "contains", value_parser = parse_operator)]
        search_type: QueryOperator,

        /// Restrict the search to these collection UUIDs
        #[arg(long = "collection")]
        collections: Vec<String>,
    },

    /// Create a collection in a community and ingest items from a CSV
    NewCollection {
        /// Handle of the parent community
        #[arg(short, long)]
        comm_handle: String,

        /// Name of the new collection
        #[arg(short = 'n', long)]
        coll_name: String,

        /// Metadata CSV, one item per row
        #[arg(short, long)]
        metadata_csv: PathBuf,

        /// JSON map of metadata keys to CSV columns
        #[arg(short, long)]
        field_map: PathBuf,
    },

    /// Compare a metadata CSV with a directory of files (offline)
    Reconcile {
        /// Metadata CSV with a file_identifier column
        #[arg(short, long)]
        metadata_csv: PathBuf,

        /// Directory searched recursively for files
        #[arg(short, long)]
        file_path: PathBuf,

        /// File extension to match, e.g. pdf
        #[arg(short = 't', long)]
        file_type: String,

        /// Directory for the three report CSVs
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Convert a metadata CSV to a JSON array of item bodies (offline)
    MetadataJson {
        /// Metadata CSV, one item per row
        #[arg(short, long)]
        metadata_csv: PathBuf,

        /// JSON map of metadata keys to CSV columns
        #[arg(short, long)]
        field_map: PathBuf,

        /// Directory the <csv name>.json file is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Write complete and unique value lists for every metadata key
    Inventory {
        /// Directory the value list folders are created in
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Collection UUID to leave out (repeatable)
        #[arg(long = "skip-collection")]
        skip_collections: Vec<String>,
    },
}

fn parse_operator(s: &str) -> Result<QueryOperator, String> {
    s.parse().map_err(|e: DsapsError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log = match logging::init(&cli.log_dir, cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Application start, logging to {}", log.path.display());

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<DsapsError>()
                .map(DsapsError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
