use anyhow::Result;
use clap::Parser;
use log::{error, info};
use nano_common::{
    logger::init_logger,
    p2p::PeerSet,
    rpc::RpcClient,
    websocket::{NotificationStream, WebsocketClient},
};
use nano_saturation::{
    config::{BenchmarkConfig, BenchmarkSettings, CliConfig},
    BenchmarkError, Pipeline, Stage,
};
use std::{path::Path, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    // Handle config template generation
    if let Some(path) = cli_config.config_file.as_ref() {
        if cli_config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {}", path);
                eprintln!("Use a different path or remove the existing file");
                return Ok(());
            }

            BenchmarkConfig::generate_template(path)?;
            println!("Configuration template generated at {}", path);
            println!("Edit the file and run the benchmark with --config-file {}", path);
            return Ok(());
        }
    }

    let config = match cli_config.resolve() {
        Ok(config) => config,
        Err(e) => {
            // Logger is not configured yet
            eprintln!("{}", e);
            std::process::exit(e.exit_code())
        }
    };
    init_logger(&config.log)?;

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => exit_with(e),
    };

    if let Err(e) = run(settings).await {
        exit_with(e);
    }
    Ok(())
}

async fn run(settings: BenchmarkSettings) -> Result<(), BenchmarkError> {
    info!(
        "Nano saturation benchmark on {} with {} accounts",
        settings.network, settings.account_count
    );

    let rpc = RpcClient::new(&settings.rpc_url)
        .map_err(|e| BenchmarkError::rpc(Stage::Configuration, "rpc_url", e))?;
    let work = RpcClient::new(&settings.work_url)
        .map_err(|e| BenchmarkError::rpc(Stage::Configuration, "work_url", e))?;
    let publisher = PeerSet::new(settings.network);

    let ws_url = settings.ws_url.to_string();
    let setup_only = settings.setup_only;
    let pipeline = Pipeline::new(settings, Arc::new(rpc), Arc::new(work), Arc::new(publisher));

    if setup_only {
        pipeline.setup().await?;
        info!("Setup complete");
        return Ok(());
    }

    let result = pipeline
        .run_connecting(async {
            let stream = WebsocketClient::connect(&ws_url)
                .await
                .map_err(|e| BenchmarkError::Connectivity(e.to_string()))?;
            Ok(Box::new(stream) as Box<dyn NotificationStream>)
        })
        .await?;
    info!(
        "Confirmed {} blocks in {:.3}s ({:.2} CPS)",
        result.num_accounts, result.total_duration_seconds, result.confirmations_per_second
    );
    Ok(())
}

fn exit_with(err: BenchmarkError) -> ! {
    error!("{}", err);
    std::process::exit(err.exit_code())
}
