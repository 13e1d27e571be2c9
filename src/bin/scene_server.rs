//! scene_server - frame analysis service
//!
//! This daemon:
//! 1. Loads configuration (SCENE_CONFIG file + SCENE_* env overrides)
//! 2. Loads perception backends once
//! 3. Serves POST /analyze-frame until Ctrl-C

use anyhow::Result;
use std::sync::mpsc;

use scene_fusion::{
    api::{ApiConfig, ApiServer},
    config::SceneConfig,
    FusionPipeline,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SceneConfig::load()?;
    log::info!("loading perception backends...");
    let pipeline = FusionPipeline::from_config(&config)?;
    log::info!("perception backends loaded");

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_body_bytes: config.max_body_bytes,
    };
    let api_handle = ApiServer::new(api_config, pipeline).spawn()?;
    log::info!("frame api listening on {}", api_handle.addr);
    log::info!(
        "POST frames to http://{}/analyze-frame",
        api_handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("scene_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
