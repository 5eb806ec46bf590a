use std::process;

use anyhow::Result;
use sizing_webhook::{SizingWebhook, cli, config::Config, tracing::setup_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    let webhook = match SizingWebhook::new_from_config(config).await {
        Ok(webhook) => webhook,
        Err(e) => {
            ::tracing::error!("cannot start the webhook: {e:#}");
            process::exit(1);
        }
    };

    webhook.run().await
}
