use mirror_resolver::ResolveOptions;

use super::Context;

pub async fn resolve(
    ctx: &Context,
    paths: &[String],
    enable_fallback: bool,
    cache_urls: bool,
) -> anyhow::Result<()> {
    let resolver = ctx.resolver().await?;
    let options = ResolveOptions {
        enable_fallback,
        cache_urls,
    };

    let mut failed = 0;
    for path in paths {
        match resolver.resolve(path, options) {
            Ok(url) => println!("{path} → {url}"),
            Err(e) => {
                eprintln!("{path}: {e}");
                failed += 1;
            }
        }
    }
    resolver.dispose();

    if failed > 0 {
        anyhow::bail!("{failed} of {} paths could not be resolved", paths.len());
    }
    Ok(())
}
