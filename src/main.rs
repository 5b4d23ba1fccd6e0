//! blog-agent - command-line entry point.
//!
//! Generates a blog document for a topic and prints where it was saved.

use std::path::PathBuf;

use blog_agent::{config::Config, pipeline};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topic of the blog post
    #[arg(short, long, default_value = "Retrieval-Augmented Generation (RAG)")]
    topic: String,

    /// Target length in words
    #[arg(short, long, default_value_t = 1500)]
    words: usize,

    /// Output file (defaults to <OUTPUT_DIR>/blog.docx)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Override the LLM model
    #[arg(short, long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Load configuration (environment, then ./.env)
    let mut config = Config::from_env()?;
    if let Some(model) = args.model {
        config.model = model;
    }
    info!("Loaded configuration: model={}", config.model);

    let out_path = args.out.unwrap_or_else(|| config.default_output_path());
    let report = pipeline::run(&config, &args.topic, args.words, &out_path).await?;

    println!("Saved: {}", report.out_path.display());
    println!("Approx words: {}", report.words);
    println!("Embedded images: {:?}", report.media);

    Ok(())
}
