use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use mirror_core::ResourceKind;
use mirror_resolver::{
    LoadableResource, OutcomeCallback, PortLoader, ResolveOptions, RetryOutcome,
};

use super::Context;

pub async fn load(ctx: &Context, path: &str, kind: ResourceKind) -> anyhow::Result<()> {
    let resolver = ctx.resolver().await?;
    let url = resolver.resolve(path, ResolveOptions::default())?;
    let loader = Arc::new(PortLoader::new(
        Arc::clone(&ctx.port),
        kind,
        resolver.config().probe_timeout(),
    ));

    if loader.attempt_load(&url).await {
        println!("✓ loaded {path} from {url}");
        resolver.dispose();
        return Ok(());
    }

    info!(%path, %url, "initial load failed");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let on_outcome: OutcomeCallback = Arc::new(move |outcome| {
        let _ = tx.send(outcome);
    });
    resolver.report_failure(path, &url, loader, on_outcome);

    let outcome = rx.recv().await;
    resolver.dispose();

    match outcome {
        Some(RetryOutcome::Loaded { url, attempts, .. }) => {
            println!("✓ loaded {path} from {url} after {attempts} attempts");
            Ok(())
        }
        Some(RetryOutcome::RecoveredLocally { url, attempts, .. }) => {
            println!("✓ loaded {path} from local copy {url} after {attempts} attempts");
            Ok(())
        }
        Some(RetryOutcome::Exhausted { attempts, .. }) => {
            anyhow::bail!("{path} could not be loaded after {attempts} attempts")
        }
        None => anyhow::bail!("retry session for {path} ended without an outcome"),
    }
}
