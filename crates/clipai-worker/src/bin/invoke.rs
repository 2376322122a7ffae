//! One-shot invocation: reads an event from stdin, writes the reply to stdout.

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use clipai_worker::logging::init_tracing;
use clipai_worker::{
    collaborators_from_env, InvocationHandler, PipelineConfig, PipelineOrchestrator,
    ResultAssembler, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read event from stdin")?;

    let reply = match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(event) => {
            let worker_config = WorkerConfig::from_env();
            let pipeline_config = PipelineConfig::from_env();
            match collaborators_from_env(&worker_config, &pipeline_config).await {
                Ok(collaborators) => {
                    let orchestrator = PipelineOrchestrator::new(pipeline_config, collaborators);
                    InvocationHandler::new(Arc::new(orchestrator))
                        .handle(&event)
                        .await
                }
                Err(e) => ResultAssembler::new(pipeline_config.include_traceback)
                    .failed(None, &e)
                    .to_value(),
            }
        }
        Err(e) => ResultAssembler::message(format!("Invalid event JSON: {e}")).to_value(),
    };

    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}
