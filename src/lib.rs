pub mod cli;
pub mod config;
pub mod insights;
pub mod llm;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;

use cli::Args;
use config::load_app_config;
use llm::{ new_client, LlmConfig, LlmType };
use log::info;
use server::{ AppState, Server };
use std::error::Error;
use storage::initialize_document_store;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Broadcast Address: {}", args.ws_addr.as_deref().unwrap_or("disabled"));
    info!("Storage Type: {}", args.storage_type);
    if args.storage_type.eq_ignore_ascii_case("local") {
        info!("Data Directory: {}", args.data_dir);
    }
    info!("LLM Type: {}", args.llm_type);
    info!("Config Path: {}", args.config_path);
    info!("TLS Enabled: {}", args.tls_paths().is_some());
    info!("-------------------------");

    let app_config = load_app_config(&args.config_path)?;
    let documents = initialize_document_store(&args)?;

    let llm_type: LlmType = args.llm_type.parse()?;
    let llm_config = LlmConfig {
        llm_type,
        api_key: app_config.orq.api_key.clone(),
        base_url: args.llm_base_url.clone().or_else(|| app_config.orq.base_url.clone()),
    };
    let client = new_client(&llm_config)?;
    info!(
        "Deployment client configured: Type={}, Insight deployment={}, BaseURL={}",
        args.llm_type,
        app_config.orq.deployment,
        llm_config.base_url.as_deref().unwrap_or("adapter default")
    );

    let state = AppState::new(documents, client, &app_config.orq.deployment);
    Server::new(state, args).run().await
}
