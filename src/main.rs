use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use music_recommender::recommend::DEFAULT_COUNT;
use music_recommender::server::{self, AppState};
use music_recommender::{trainer, ModelState, Recommender};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a model artifact from a songs CSV
    Train(TrainArgs),
    /// Start the recommendation API
    Serve(ServeArgs),
    /// Print recommendations for a song name or a feature file
    Recommend(RecommendArgs),
}

#[derive(Parser, Debug)]
struct TrainArgs {
    /// Songs CSV (one row per track, audio features and playlist genres)
    #[arg(short, long, env = "SONGS_CSV")]
    data: PathBuf,

    /// Where to write the model artifact
    #[arg(short, long, env = "MODEL_PATH", default_value = "models/music_recommender.bin")]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Model artifact produced by `train`
    #[arg(long, env = "MODEL_PATH", default_value = "models/music_recommender.bin")]
    model: PathBuf,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Number of results when a request does not pass `n`
    #[arg(long, default_value_t = 5)]
    default_count: usize,
}

#[derive(Parser, Debug)]
struct RecommendArgs {
    /// Model artifact produced by `train`
    #[arg(long, env = "MODEL_PATH", default_value = "models/music_recommender.bin")]
    model: PathBuf,

    /// Number of results
    #[arg(short = 'n', long, default_value_t = DEFAULT_COUNT)]
    count: usize,

    /// JSON file with one raw value per feature, used instead of a name
    #[arg(long, conflicts_with = "name")]
    features: Option<PathBuf>,

    /// Song name (case-insensitive substring)
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Serve(args) => run_serve(args).await,
        Commands::Recommend(args) => run_recommend(args),
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let artifact = trainer::train_from_path(&args.data)
        .with_context(|| format!("Failed to build model from {:?}", args.data))?;
    artifact
        .save(&args.output)
        .with_context(|| format!("Failed to write model to {:?}", args.output))?;
    info!(
        "Saved model ({} songs, {} features) to {:?}",
        artifact.catalog.len(),
        artifact.feature_names.len(),
        args.output
    );
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    // A missing or broken model still serves, reporting itself unavailable.
    let state = AppState {
        model: ModelState::load(&args.model),
        default_count: args.default_count,
    };
    let addr = SocketAddr::new(args.host, args.port);
    server::start_server(state, addr)
        .await
        .with_context(|| format!("Server on {} failed", addr))
}

fn run_recommend(args: RecommendArgs) -> Result<()> {
    let recommender = Recommender::load(&args.model)
        .with_context(|| format!("Failed to load model from {:?}", args.model))?;

    let output = match (&args.features, &args.name) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let value: serde_json::Value =
                serde_json::from_str(&content).context("Failed to parse feature JSON")?;
            let features = recommender.parse_features(&value)?;
            let results = recommender.recommend_by_features(&features, args.count)?;
            serde_json::to_string_pretty(&results)?
        }
        (None, Some(name)) => {
            let rec = recommender.recommend_by_name(name, args.count)?;
            serde_json::to_string_pretty(&rec)?
        }
        (None, None) => bail!("Pass a song name or --features <file>"),
    };
    println!("{}", output);
    Ok(())
}
