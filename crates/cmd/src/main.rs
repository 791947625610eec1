// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cmd::commands::{
    import_products_command, init_command, schedule_command, sync_command, watermark_command,
};
use cmd::common::{CONFIG_ENV, CatalogContext, DEFAULT_CONFIG};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "catsync")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    Init,
    /// Load a full product snapshot (gzip JSON lines) into the catalog
    ImportProducts {
        /// Snapshot archive on the local filesystem
        path: PathBuf,
    },
    /// Apply the delta files published since the newest stored record
    Sync,
    /// Show the newest record timestamp in the catalog
    Watermark,
    /// Run the delta sync once a day until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let ctx = CatalogContext::new(cli.config);

    match &cli.command {
        Commands::Init => init_command(&ctx),
        Commands::ImportProducts { path } => import_products_command(&ctx, path).await.map(|_| ()),
        Commands::Sync => sync_command(&ctx).await.map(|_| ()),
        Commands::Watermark => watermark_command(&ctx).await.map(|_| ()),
        Commands::Schedule => schedule_command(&ctx).await,
    }
}
