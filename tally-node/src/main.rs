use std::{net::SocketAddr, path::Path};

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use tally_common::utils::NodeId;
use tally_node::{
    api::rest::{start_rest_api, AppState},
    build_runtime,
    cli::Args,
    telemetry,
    Config,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Argumentos e config
    let args = Args::parse();

    if args.init {
        let node_id = NodeId(args.node_id.clone().unwrap_or_else(|| "order-node-1".to_string()));
        Config::default_for(node_id).save_to_file(&args.config_path)?;
        println!("Config gerada em {}", args.config_path);
        return Ok(());
    }

    let mut config = if Path::new(&args.config_path).exists() {
        Config::load_from_file(&args.config_path)?
    } else {
        let id = std::env::var("NODE_ID").unwrap_or_else(|_| "order-node-1".to_string());
        Config::default_for(NodeId(id))
    };
    config.apply_env()?;
    if let Some(id) = &args.node_id {
        config.node_id = NodeId(id.clone());
    }
    if let Some(addr) = &args.listen_addr {
        config.listen_addr = addr.clone();
    }

    // 2. Logging
    telemetry::install_panic_hook();
    let _guard = telemetry::init(&config.node_id);

    info!("--- INICIANDO NÓ TALLY ---");
    info!("Config: {}", args.config_path);
    info!("Node: {} | peers: {}", config.node_id, config.peers.len());

    // 3. Métricas
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("⚠️ Recorder Prometheus não instalado: {}", e);
            None
        }
    };

    // 4. Runtime
    let runtime = match build_runtime(&config).await {
        Ok(rt) => rt,
        Err(e) => {
            error!("Falha ao iniciar o nó: {}.", e);
            return Err(e.into());
        }
    };

    // 5. REST API
    let addr: SocketAddr = config.listen_addr.parse()?;
    let state = AppState { coordinator: runtime.coordinator.clone(), metrics };

    tokio::select! {
        res = start_rest_api(addr, state) => {
            if let Err(e) = res {
                error!("REST API encerrada: {}", e);
                runtime.shutdown();
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl+C recebido, encerrando.");
        }
    }

    runtime.shutdown();
    Ok(())
}
