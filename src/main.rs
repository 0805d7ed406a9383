use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use appcast::config::{Config, Settings, DEFAULT_LIMIT};

#[derive(Parser, Debug)]
#[command(
    name = "appcast",
    version,
    about = "Generate a Sparkle appcast feed from GitHub releases"
)]
struct Args {
    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// Repository in OWNER/REPO form
    #[arg(long)]
    repo: String,

    /// Maximum number of releases to consider
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,

    /// PKCS#8 PEM file with the DSA key used to sign enclosures
    #[arg(long, value_name = "PATH")]
    dsa: Option<PathBuf>,

    /// TOML file with feed and platform settings
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Where to write the appcast XML
    #[arg(value_name = "OUT")]
    out: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };

    let mut settings = Settings::from_config(config, args.token, args.repo, args.out);
    settings.limit = args.limit;
    settings.dsa_key = args.dsa;

    let summary = appcast::pipeline::run(&settings).await?;
    println!(
        "Wrote {} item(s) from {} release(s) ({} skipped) to {}",
        summary.items,
        summary.releases,
        summary.skipped,
        summary.output.display()
    );
    Ok(())
}
