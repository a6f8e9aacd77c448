use std::sync::Arc;

use mirror_core::{CandidateSource, ProbeResult, ScoringConfig, SourceState};
use mirror_health::{blended_score, rank, HealthProber};

use super::Context;

pub async fn probe(ctx: &Context, format: &str) -> anyhow::Result<()> {
    let config = ctx.config.clone().normalized();
    config.validate()?;

    let prober = HealthProber::new(Arc::clone(&ctx.port), &config);
    let mut sources = CandidateSource::from_origins(&config.origins);
    let results = prober.probe_all(&mut sources).await;
    let ranking = rank(&sources, &config.scoring);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&ranking.to_vec())?);
        }
        _ => {
            print!("{}", format_ranking(ranking.entries(), &results, &config.scoring));
        }
    }

    Ok(())
}

fn format_ranking(
    entries: &[CandidateSource],
    results: &[ProbeResult],
    scoring: &ScoringConfig,
) -> String {
    let slowest_ms = entries
        .iter()
        .filter(|s| s.is_healthy())
        .filter_map(|s| s.last_latency_ms)
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for (position, source) in entries.iter().enumerate() {
        let marker = match source.state {
            SourceState::Healthy => "✓",
            SourceState::Unhealthy => "✗",
            SourceState::Unknown => "?",
        };
        let latency = source
            .last_latency_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:>2}. {marker} {:<40} {latency:>8}  score {:.2}",
            position + 1,
            source.origin,
            blended_score(source, scoring, slowest_ms)
        ));
        let error = results
            .iter()
            .find(|r| r.origin == source.origin)
            .and_then(|r| r.error.as_ref());
        if let Some(error) = error {
            out.push_str(&format!("  ({error})"));
        }
        out.push('\n');
    }
    out
}
