use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subflow::{create_default_resolver, ResolveOutcome, Settings, SubtitleCache, SubtitleQuery};

#[derive(Debug, Parser)]
#[command(name = "subflow", version, about = "Find and cache external subtitles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search the configured providers and cache the first match
    Search {
        /// Video file name or path
        video: String,
        /// IMDB-style identifier, e.g. tt0111161
        #[arg(long)]
        imdb: Option<String>,
        /// Preferred language (ISO 639-1); defaults to the configured one
        #[arg(long)]
        lang: Option<String>,
    },
    /// List providers in the order they are tried
    Providers,
    /// List cached subtitle files
    ListCache,
    /// Delete cached subtitle files
    ClearCache,
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load();
    let cache = Arc::new(SubtitleCache::new(settings.cache_root()));

    match cli.command {
        Command::Search { video, imdb, lang } => {
            let language = lang.unwrap_or_else(|| settings.preferred_language.clone());
            let resolver = create_default_resolver(&settings, cache);
            let query = SubtitleQuery::new(video, imdb, language);

            match resolver.resolve(&query).await {
                ResolveOutcome::Found(file) => {
                    println!(
                        "{} ({} bytes, {}, via {})",
                        file.absolute_path.display(),
                        file.size_bytes,
                        file.language,
                        file.source_provider_name
                    );
                }
                ResolveOutcome::NotFound => {
                    println!(
                        "No {} subtitle found for \"{}\"",
                        query.preferred_language,
                        query.search_text()
                    );
                }
                ResolveOutcome::Debounced | ResolveOutcome::Cancelled => {}
            }
        }
        Command::Providers => {
            let resolver = create_default_resolver(&settings, cache);
            let enabled = resolver.enabled_provider_names();
            for name in resolver.provider_names() {
                let state = if enabled.contains(&name) { "enabled" } else { "disabled" };
                println!("{:<32} {}", name, state);
            }
        }
        Command::ListCache => {
            for path in cache.entries().await.context("reading cache directory")? {
                println!("{}", path.display());
            }
        }
        Command::ClearCache => {
            let removed = cache.clear().await.context("clearing cache directory")?;
            println!(
                "Removed {} cached subtitle(s) from {}",
                removed,
                cache.root().display()
            );
        }
        Command::ShowConfig => {
            if let Some(path) = Settings::config_path() {
                println!("# {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
        }
    }

    Ok(())
}
