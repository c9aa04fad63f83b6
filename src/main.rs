use clap::{Parser, Subcommand};

use offline_reader::app::{App, DEFAULT_PREFETCH_LIMIT};
use offline_reader::config::Config;
use offline_reader::models::ArticleId;

#[derive(Parser, Debug)]
#[command(name = "offline-reader")]
#[command(about = "An offline-first article reader")]
#[command(version)]
struct Args {
    /// Skip the network entirely and serve the local cache
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List articles, refreshing from the origin when the cache is stale
    List,
    /// Fetch the latest articles now
    Refresh,
    /// Search cached titles
    Search { query: String },
    /// List cached articles by an author
    Author { name: String },
    /// Show an article, downloading full content if needed
    Show { id: ArticleId },
    /// Download full content of cached previews for offline reading
    Prefetch {
        #[arg(long, default_value_t = DEFAULT_PREFETCH_LIMIT)]
        limit: usize,
    },
    /// Show connectivity and cache freshness
    Status,
    /// Remove all cached articles
    Clear,
    /// Reload whenever connectivity changes
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Only show warnings and errors by default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load()?;
    let app = App::new(&config, args.offline)?;

    match args.command.unwrap_or(Command::List) {
        Command::List => app.list().await?,
        Command::Refresh => app.refresh().await?,
        Command::Search { query } => app.search(&query).await?,
        Command::Author { name } => app.author(&name).await?,
        Command::Show { id } => app.show(id).await?,
        Command::Prefetch { limit } => app.prefetch(limit).await?,
        Command::Status => app.status().await?,
        Command::Clear => app.clear().await?,
        Command::Watch => app.watch().await?,
    }

    Ok(())
}
