use std::collections::BTreeMap;

use axum::Router;
use sizing_webhook::{SizingWebhook, config::Config};

pub(crate) fn default_test_config() -> Config {
    Config {
        label_marks: BTreeMap::from([(String::from("team"), String::from("x"))]),
        enable_guaranteed_memory: true,
        ..Default::default()
    }
}

pub(crate) async fn webhook(config: Config) -> SizingWebhook {
    SizingWebhook::new_from_config(config).await.unwrap()
}

pub(crate) async fn app(config: Config) -> Router {
    webhook(config).await.router()
}
