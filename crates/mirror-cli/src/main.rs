use clap::{Parser, Subcommand};

use mirror_core::ResourceKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "mirrorctl",
    about = "mirrorgrid — multi-origin resource resolver",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to the resolver configuration
    #[arg(short, long, global = true, default_value = "mirrors.toml")]
    config: String,

    /// Serving host as host[:port], used for local-context detection
    #[arg(long, global = true, default_value = "localhost")]
    host: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every configured origin once and print the ranking
    Probe {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Resolve logical paths to URLs.
    ///
    /// Runs one probe round first unless the host is detected as a
    /// local development server.
    Resolve {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Fail instead of falling back to the local copy
        #[arg(long)]
        no_fallback: bool,
        /// Bypass the resolver cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Resolve and load a resource, retrying across origins on failure
    Load {
        path: String,
        /// Resource kind: image, audio or font
        #[arg(short, long, default_value = "image")]
        kind: ResourceKind,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mirror=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context::load(&cli.config, &cli.host)?;

    match cli.command {
        Commands::Probe { format } => commands::probe::probe(&ctx, &format).await,
        Commands::Resolve {
            paths,
            no_fallback,
            no_cache,
        } => commands::resolve::resolve(&ctx, &paths, !no_fallback, !no_cache).await,
        Commands::Load { path, kind } => commands::load::load(&ctx, &path, kind).await,
    }
}
