//! Subcommand handlers.

use anyhow::{bail, Context, Result};
use chrono::Local;
use dsaps_core::ingest::{ingest_collection, write_metadata_json};
use dsaps_core::inventory::run_inventory;
use dsaps_core::pagination::filtered_item_search;
use dsaps_core::reconcile::reconcile;
use dsaps_core::{
    CancellationToken, ClientConfig, CollectionScope, CsvAuditSink, DSpaceSession, DeleteKeyJob,
    FieldMap, InventoryOptions, NewCollection, ProvenanceMode, RunOptions, SearchPredicate, Session,
};
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{Cli, Command, ConnectionArgs};

pub async fn run(cli: Cli) -> Result<()> {
    let Cli {
        connection, command, ..
    } = cli;

    match command {
        Command::DeleteKey {
            key,
            handle,
            output_dir,
            concurrency,
            provenance_per_match,
        } => {
            let key = prompt_if_missing(key, "Enter the key to be deleted")?;
            let handle = prompt_if_missing(handle, "Enter the handle of the community")?;
            let session = connect(&connection).await?;
            let cancel = cancel_on_ctrl_c();

            let sink = CsvAuditSink::create_in(&output_dir, Local::now().naive_local())?;
            let options = RunOptions {
                concurrency: usize::from(concurrency),
                provenance_mode: if provenance_per_match {
                    ProvenanceMode::PerMatch
                } else {
                    ProvenanceMode::OncePerItem
                },
                ..RunOptions::default()
            };

            let result = DeleteKeyJob::with_options(handle, key, options)
                .run(&session, &sink, &cancel)
                .await;
            logout(&session).await;
            println!("Audit log: {}", sink.path().display());

            let summary = result?;
            println!(
                "Items processed: {} ({} succeeded, {} delete failed, {} put failed, \
                 {} fetch failed)",
                summary.items_processed,
                summary.succeeded,
                summary.delete_failed,
                summary.put_failed,
                summary.fetch_failed
            );
            println!("Total runtime: {}", summary.elapsed_hms());
        }

        Command::Search {
            field,
            string,
            search_type,
            collections,
        } => {
            let started = Instant::now();
            let session = connect(&connection).await?;
            let predicate = SearchPredicate::new(field, search_type, string);
            let scope = CollectionScope::new(collections);
            let result = filtered_item_search(&session, predicate, scope).await;
            logout(&session).await;

            let references = result?;
            for reference in &references {
                println!("{}", reference);
            }
            info!("{} items matched", references.len());
            println!("Elapsed time: {}", dsaps_core::format_elapsed(started.elapsed()));
        }

        Command::NewCollection {
            comm_handle,
            coll_name,
            metadata_csv,
            field_map,
        } => {
            let started = Instant::now();
            let map = FieldMap::load(&field_map)
                .with_context(|| format!("cannot read field map {}", field_map.display()))?;
            let collection = NewCollection::from_csv_path(coll_name, &metadata_csv, &map)
                .with_context(|| format!("cannot read metadata CSV {}", metadata_csv.display()))?;
            info!("{} items to ingest", collection.items.len());

            let session = connect(&connection).await?;
            let result = ingest_collection(&session, &comm_handle, &collection).await;
            logout(&session).await;

            let report = result?;
            println!("Collection: {}", report.collection_uuid);
            for (uuid, handle) in &report.items {
                println!("Item posted: {} {}", uuid, handle);
            }
            println!("Total runtime: {}", dsaps_core::format_elapsed(started.elapsed()));
        }

        Command::Reconcile {
            metadata_csv,
            file_path,
            file_type,
            output_dir,
        } => {
            let result = reconcile(&metadata_csv, &file_path, &file_type, &output_dir)?;
            println!(
                "{} matched, {} without files, {} without metadata; reports in {}",
                result.metadata_matches.len(),
                result.no_files.len(),
                result.no_metadata.len(),
                output_dir.display()
            );
        }

        Command::MetadataJson {
            metadata_csv,
            field_map,
            output_dir,
        } => {
            let map = FieldMap::load(&field_map)
                .with_context(|| format!("cannot read field map {}", field_map.display()))?;
            let output = write_metadata_json(&metadata_csv, &map, &output_dir)?;
            println!("Metadata JSON: {}", output.display());
        }

        Command::Inventory {
            output_dir,
            skip_collections,
        } => {
            let session = connect(&connection).await?;
            let cancel = cancel_on_ctrl_c();
            let options = InventoryOptions {
                skip_collections,
                ..InventoryOptions::default()
            };

            let result = run_inventory(
                &session,
                &output_dir,
                Local::now().naive_local(),
                &options,
                &cancel,
            )
            .await;
            logout(&session).await;

            let report = result?;
            println!(
                "{} keys from {} items in {} collections",
                report.keys, report.items, report.collections
            );
            println!("Complete lists: {}", report.complete_dir.display());
            println!("Unique lists: {}", report.unique_dir.display());
        }
    }

    Ok(())
}

/// Log in with the connection flags, prompting for what is missing.
async fn connect(args: &ConnectionArgs) -> Result<DSpaceSession> {
    let url = prompt_if_missing(args.url.clone(), "Enter the DSpace REST URL")?;
    let email = prompt_if_missing(args.email.clone(), "Enter email")?;
    let password = match args.password.clone() {
        Some(password) => password,
        None => prompt_password("Enter password")?,
    };

    if args.insecure {
        warn!("TLS certificate verification is disabled");
    }
    let config = ClientConfig::new(url)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_verify_tls(!args.insecure);

    let session = DSpaceSession::login(&config, &email, &password).await?;
    Ok(session)
}

async fn logout(session: &DSpaceSession) {
    if let Err(e) = session.logout().await {
        warn!("Logout failed: {}", e);
    }
}

/// A token cancelled by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping before the next item");
            handle.cancel();
        }
    });
    cancel
}

fn prompt_if_missing(value: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        return Ok(value);
    }
    eprint!("{}: ", label);
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("{} is required", label.trim_start_matches("Enter "));
    }
    Ok(value)
}

fn prompt_password(label: &str) -> Result<String> {
    eprint!("{}: ", label);
    io::stderr().flush()?;
    let password = rpassword::read_password().context("cannot read password")?;
    if password.is_empty() {
        bail!("password is required");
    }
    Ok(password)
}
