//! plugshelf - cached remote plugin catalog
//!
//! Admin tooling over the catalog core: list and search the catalog, show
//! per-package install status and the update feed, and manage the cache.

use clap::{Parser, Subcommand};
use plugshelf_config::ConfigManager;
use plugshelf_plugins::{PluginCatalog, ReconciliationStatus};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// plugshelf - remote plugin catalog with install reconciliation
#[derive(Parser, Debug)]
#[command(name = "plugshelf")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List every package in the catalog
    List,
    /// Show one package by slug
    Info { slug: String },
    /// Search the catalog by tag
    Search { query: String },
    /// Show the install status of every tracked package
    Status,
    /// Show the update feed
    Updates,
    /// Refetch the catalog now
    Refresh,
    /// Drop the cached catalog
    Invalidate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("plugshelf={}", log_level)),
        ))
        .init();

    tracing::debug!("Starting plugshelf v{}", env!("CARGO_PKG_VERSION"));

    let manager = match args.config {
        Some(ref path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    let config = manager.config();
    config.validate()?;
    tracing::debug!(
        "Loaded {} tracked packages from {:?}",
        config.packages.len(),
        manager.path()
    );

    let catalog = PluginCatalog::from_config(&config)?;

    match args.command {
        Command::List => {
            let records = catalog.list_catalog().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    let marker = if record.active { "*" } else { " " };
                    println!(
                        "{} {:<28} {:<10} {}",
                        marker, record.slug, record.version, record.short_description
                    );
                }
                if records.is_empty() {
                    println!("No remote packages available");
                }
            }
        }
        Command::Info { slug } => match catalog.record(&slug).await {
            Ok(record) if args.json => println!("{}", serde_json::to_string_pretty(&record)?),
            Ok(record) => {
                println!("{} {}", record.title, record.version);
                println!("  slug:         {}", record.slug);
                println!("  author:       {}", record.author);
                if let Some(url) = &record.site_url {
                    println!("  site:         {}", url);
                }
                if let Some(updated) = &record.last_updated {
                    println!("  last updated: {}", updated);
                }
                let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
                println!("  tags:         {}", tags.join(", "));
                println!("  active:       {}", record.active);
                println!();
                println!("{}", record.short_description);
            }
            Err(_) if args.json => println!("null"),
            Err(e) => println!("{}", e),
        },
        Command::Search { query } => {
            let results = catalog.search_with_external(&query, Vec::new()).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{} result(s)", results.total);
                for record in &results.records {
                    println!("  {:<28} {}", record.slug, record.title);
                }
            }
        }
        Command::Status => {
            let statuses = catalog.statuses().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                for (key, status) in &statuses {
                    println!("{:<20} {}", key, describe(status.as_ref()));
                }
            }
        }
        Command::Updates => {
            let feed = catalog.update_feed().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&feed)?);
            } else {
                println!("{} update(s) available", feed.updates_available.len());
                for update in &feed.updates_available {
                    println!(
                        "  {:<28} -> {}  ({})",
                        update.slug,
                        update.new_version,
                        update.plugin_file.display()
                    );
                }
                println!("{} up to date or not installed", feed.up_to_date.len());
            }
        }
        Command::Refresh => {
            let snapshot = catalog.refresh().await;
            println!(
                "Fetched {} of {} packages",
                snapshot.len(),
                catalog.descriptors().len()
            );
        }
        Command::Invalidate => {
            catalog.invalidate();
            println!("Catalog cache cleared");
        }
    }

    Ok(())
}

fn describe(status: Option<&ReconciliationStatus>) -> String {
    match status {
        Some(ReconciliationStatus::UpdateAvailable { new_version }) => {
            format!("update available ({})", new_version)
        }
        Some(status) => status.label().to_string(),
        None => "unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_parsing() {
        let args = Args::try_parse_from(["plugshelf", "list"]).unwrap();
        assert_eq!(args.command, Command::List);
        assert!(!args.json);
        assert!(!args.debug);
    }

    #[test]
    fn test_arg_parsing_with_options() {
        let args = Args::try_parse_from([
            "plugshelf",
            "search",
            "gallery",
            "--json",
            "-c",
            "/tmp/plugshelf.toml",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/plugshelf.toml")));
        assert_eq!(
            args.command,
            Command::Search {
                query: "gallery".to_string()
            }
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["plugshelf"]).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(None), "unavailable");
        assert_eq!(describe(Some(&ReconciliationStatus::Active)), "active");
        assert_eq!(
            describe(Some(&ReconciliationStatus::UpdateAvailable {
                new_version: "2.0".to_string()
            })),
            "update available (2.0)"
        );
    }
}
