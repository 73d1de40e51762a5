//! Source loading dispatch and the `sources` listing command.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Document, FetchKind, Source};
use crate::{source_file, source_remote};

/// Produces documents for a declared source.
///
/// The bootstrap resolver talks to sources only through this trait, so
/// tests can substitute a probe that records or forbids fetch calls.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<Document>>;
}

/// Default loader: dispatches on the source's [`FetchKind`].
pub struct FetchLoader {
    timeout_secs: u64,
}

impl FetchLoader {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl DocumentLoader for FetchLoader {
    async fn fetch(&self, source: &Source) -> Result<Vec<Document>> {
        match &source.fetch {
            FetchKind::LocalFile { path } => source_file::fetch_local(&source.name, path),
            FetchKind::RemoteFetch { url } => {
                source_remote::fetch_remote(&source.name, url, self.timeout_secs).await
            }
        }
    }
}

/// Print the declared sources with their kind, target, and policy.
pub fn list_sources(config: &Config) -> Result<()> {
    println!(
        "{:<16} {:<6} {:<10} {:<24} TARGET",
        "SOURCE", "KIND", "REQUIRED", "MODES"
    );

    for source in config.declared_sources() {
        let (kind, target, available) = match &source.fetch {
            FetchKind::LocalFile { path } => {
                let status = if path.exists() {
                    path.display().to_string()
                } else {
                    format!("{} (missing)", path.display())
                };
                ("file", status, path.exists())
            }
            FetchKind::RemoteFetch { url } => ("url", url.clone(), true),
        };

        let modes = source
            .modes
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");

        println!(
            "{:<16} {:<6} {:<10} {:<24} {}",
            source.name, kind, source.required, modes, target
        );

        if !available && source.required {
            println!("  warning: required source '{}' is not reachable", source.name);
        }
    }

    Ok(())
}
