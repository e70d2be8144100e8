//! updist - update package distribution CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use updist_cli::context::{AppContext, load_config};
use updist_cli::ui::Output;
use updist_cli::{Cli, Commands, cmd};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let out = Output::new(cli.json);

    let default_filter = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, out).await {
        out.error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, out: Output) -> Result<()> {
    // Hashing needs no service state
    if let Commands::Hash { files } = &cli.command {
        return cmd::hash::hash(files, out).await;
    }

    let config = load_config(cli.home)?;
    let ctx = AppContext::open(config).await?;

    match cli.command {
        Commands::Serve { bind } => cmd::serve::serve(ctx, bind).await,
        Commands::Upload { file, checksum } => {
            cmd::upload::upload(&ctx, &file, checksum, out).await
        }
        Commands::List => cmd::list::list(&ctx, out).await,
        Commands::Info { id } => cmd::info::info(&ctx, &id, out).await,
        Commands::Deactivate { id } => cmd::deactivate::deactivate(&ctx, &id, out).await,
        Commands::Delete { id } => cmd::delete::delete(&ctx, &id, out).await,
        Commands::Check { tenant, version } => {
            cmd::check::check(&ctx, &tenant, &version, out).await
        }
        Commands::Download { id, output } => {
            cmd::download::download(&ctx, &id, output, out).await
        }
        Commands::Generate {
            version,
            changelog,
            min_client_version,
            since,
        } => {
            cmd::generate::generate(&ctx, version, changelog, min_client_version, since, out).await
        }
        Commands::Clean { dry_run } => cmd::clean::clean(&ctx, dry_run, out).await,
        // handled above
        Commands::Hash { .. } => Ok(()),
    }
}
