use anyhow::Context;
use overlay_harness::config::HarnessConfig;
use overlay_harness::script::{parse_script, run_script};
use overlay_harness::telemetry::init_tracing;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cfg = HarnessConfig::load();
    init_tracing(&cfg.args.log_filter);

    let text = std::fs::read_to_string(&cfg.args.script)
        .with_context(|| format!("reading script {}", cfg.args.script.display()))?;
    let steps = parse_script(&text)?;
    info!(
        script = %cfg.args.script.display(),
        steps = steps.len(),
        cta_busy_ms = cfg.session.cta_busy_window.as_millis() as u64,
        lead_status_ttl_ms = cfg.session.lead_status_ttl.as_millis() as u64,
        "starting overlay-harness"
    );

    let report = run_script(&steps, cfg.session);
    let rendered = if cfg.args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("serializing report")?;
    println!("{rendered}");
    Ok(())
}
