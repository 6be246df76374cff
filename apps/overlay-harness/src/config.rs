use std::path::PathBuf;

use clap::Parser;
use overlay_sync::SessionConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "overlay-harness",
    about = "Replay a scripted overlay conversation against a visitor session",
    version
)]
pub struct HarnessArgs {
    #[arg(
        long,
        env = "OVERLAY_SCRIPT",
        value_name = "PATH",
        help = "JSON-lines script of inbound overlays, lifecycle events and visitor actions"
    )]
    pub script: PathBuf,

    #[arg(
        long = "log-filter",
        env = "RUST_LOG",
        default_value = "info,overlay_sync=debug",
        help = "tracing filter directive"
    )]
    pub log_filter: String,

    #[arg(long, help = "Pretty-print the final report")]
    pub pretty: bool,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub args: HarnessArgs,
    pub session: SessionConfig,
}

impl HarnessConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            args: HarnessArgs::parse(),
            session: SessionConfig::from_env(),
        }
    }
}
