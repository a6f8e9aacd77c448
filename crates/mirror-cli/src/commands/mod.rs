pub mod load;
pub mod probe;
pub mod resolve;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use mirror_core::{EnvironmentPort, HostInfo, ResolverConfig};
use mirror_health::HttpPort;
use mirror_resolver::Resolver;

/// Configuration and port shared by every subcommand.
pub struct Context {
    pub config: ResolverConfig,
    pub port: Arc<dyn EnvironmentPort>,
}

impl Context {
    pub fn load(config_path: &str, host: &str) -> anyhow::Result<Self> {
        let config = ResolverConfig::from_file(Path::new(config_path))
            .with_context(|| format!("loading {config_path}"))?;
        let port = HttpPort::new(HostInfo::parse(host))?;
        Ok(Self {
            config,
            port: Arc::new(port),
        })
    }

    /// Build and initialize a resolver.
    pub async fn resolver(&self) -> anyhow::Result<Resolver> {
        let resolver = Resolver::builder(self.config.clone(), Arc::clone(&self.port)).build()?;
        resolver.init().await?;
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_reads_config_and_host() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "origins = [\"https://a.test/\", \"https://b.test\"]").unwrap();

        let ctx = Context::load(file.path().to_str().unwrap(), "localhost:5173").unwrap();
        assert_eq!(ctx.config.origins, vec!["https://a.test", "https://b.test"]);
        assert_eq!(ctx.port.host_info(), HostInfo::new("localhost", Some(5173)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirrors.toml");
        let err = Context::load(path.to_str().unwrap(), "localhost")
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("loading "));
    }
}
