//! Show the effective configuration

use anyhow::Result;

use super::DemoConfig;
use crate::ui;

#[tracing::instrument(skip(config))]
pub async fn run(config: &DemoConfig, _verbose: bool) -> Result<()> {
    ui::header("Effective Configuration");
    ui::json(&serde_json::to_value(config)?);
    Ok(())
}
