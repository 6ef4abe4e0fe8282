use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shortener::analytics::AnalyticsAggregator;
use shortener::cache::MokaPopularityCache;
use shortener::config::{Config, DatabaseBackend};
use shortener::links::LinkDirectory;
use shortener::models::{AnalyticsBody, CreateLinkRequest, LinkBody};
use shortener::storage::{AnalyticsStore, LinkStore, PostgresStorage, SqliteStorage};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "shortener-admin")]
#[command(about = "Shortener link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all links
    List,
    /// Create a link
    Create {
        /// Destination URL
        source_url: String,
        /// Explicit short code (generated when omitted)
        #[arg(long)]
        code: Option<String>,
    },
    /// Print click analytics for a link as JSON
    Analytics {
        /// Short code
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let (links, clicks): (Arc<dyn LinkStore>, Arc<dyn AnalyticsStore>) =
        match config.database.backend {
            DatabaseBackend::Sqlite => {
                let storage = Arc::new(
                    SqliteStorage::new(&config.database.url, config.database.max_connections)
                        .await?,
                );
                (storage.clone(), storage)
            }
            DatabaseBackend::Postgres => {
                let storage = Arc::new(
                    PostgresStorage::new(&config.database.url, config.database.max_connections)
                        .await?,
                );
                (storage.clone(), storage)
            }
            DatabaseBackend::Memory => {
                bail!("the memory backend has no persistent data to manage")
            }
        };

    // Ensure database is initialized
    links.init().await?;
    clicks.init_analytics().await?;

    // Admin commands never admit links into the cache
    let cache = Arc::new(MokaPopularityCache::new(1, config.cache.ttl(), i64::MAX));
    let directory = LinkDirectory::new(links, cache, config.links.max_link_len)
        .with_max_generation_attempts(config.links.max_generation_attempts);

    match cli.command {
        Commands::List => {
            let links = directory.list().await?;
            if links.is_empty() {
                println!("No links found.");
            } else {
                println!("{:<16} {:<27} {}", "Code", "Created", "Source URL");
                println!("{}", "-".repeat(80));
                for link in links {
                    println!(
                        "{:<16} {:<27} {}",
                        link.short_code,
                        link.created_at.to_rfc3339(),
                        link.source_url
                    );
                }
            }
        }
        Commands::Create { source_url, code } => {
            let new_link = CreateLinkRequest {
                source_url,
                short_url: code,
            }
            .into_new_link()?;
            let link = directory.create(new_link).await?;
            println!("{}", serde_json::to_string_pretty(&LinkBody::from(&link))?);
        }
        Commands::Analytics { code } => {
            let link = directory.resolve(&code).await?;
            let snapshot = AnalyticsAggregator::new(clicks).get_analytics(&code).await?;
            let body = AnalyticsBody::from(snapshot.with_link(link));
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
