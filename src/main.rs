//! forest-train - Main Entry Point

use clap::Parser;
use forest_train::cli::{cmd_predict, cmd_ranges, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forest_train=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            path_dataframe_train,
            path_config_json,
            tracking_dir,
            artifacts_dir,
        } => {
            cmd_train(&path_dataframe_train, &path_config_json, &tracking_dir, &artifacts_dir)?;
        }
        Commands::Predict {
            model_dir,
            data,
            method,
            output,
        } => {
            cmd_predict(&model_dir, &data, method.as_deref(), output.as_deref())?;
        }
        Commands::Ranges { path_config_json } => {
            cmd_ranges(&path_config_json)?;
        }
    }

    Ok(())
}
