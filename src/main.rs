use anyhow::Result;
use std::sync::Arc;

use salesflow::core::catalog::Catalog;
use salesflow::core::config::Config;
use salesflow::core::io::NativeStorage;
use salesflow::core::session::{DisplaySettings, Session};
use salesflow::services::assistant::CallAssistant;
use salesflow::services::hint::HintService;
use salesflow::services::llm;
use salesflow::ui;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Config, with the credential read once from the environment
    let config = match Config::load() {
        Ok(cfg) => cfg.with_api_key(std::env::var("API_KEY").ok()),
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Err(e);
        }
    };
    config.ensure_directories()?;

    // 2. Script catalog
    let catalog = match &config.scripts_file {
        Some(path) => Catalog::load(path)?,
        None => Catalog::default(),
    };

    // 3. Hint backend; absent when no key is configured
    let llm = llm::create_llm(&config.llm)?;
    if llm.is_none() {
        log::warn!("No API key configured, AI hints disabled");
    }
    let hints = HintService::new(llm);

    // 4. Session and front end
    let display = DisplaySettings {
        font_size: config.display.font_size,
        high_contrast: config.display.high_contrast,
    };
    let session = Session::new(catalog, display);
    let mut assistant = CallAssistant::new(config, session, hints, Arc::new(NativeStorage::new()));

    ui::run(&mut assistant).await
}
