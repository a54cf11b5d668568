pub mod attachments;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod presets;
pub mod providers;
pub mod repl;
pub mod session;

use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

use config::Config;
use repl::run_repl;
use session::create_session;

const CONNECT_TIMEOUT_SECS: u64 = 10;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = Config::from_env();
    info!(
        provider = %cfg.model_provider,
        model = %cfg.model,
        base_url = %cfg.model_base_url,
        api_key_set = cfg.api_key.is_some(),
        "loaded runtime configuration"
    );

    let client = Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .context("Failed to initialize HTTP client")?;
    let provider = providers::from_config(&client, &cfg)?;

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        run_repl(provider.as_ref(), &cfg).await
    } else {
        let mut session = create_session(cfg.model.clone(), cfg.effective_system_prompt());
        let prompt = args.join(" ");
        session
            .submit(provider.as_ref(), &prompt, |fragment| {
                print!("{fragment}");
                let _ = io::stdout().flush();
            })
            .await?;
        println!();
        Ok(())
    }
}
