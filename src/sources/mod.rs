//! Source adapters and their registry
//!
//! Adapters are looked up by the domain a series declares. The binary fills
//! the registry with one [`HtmlSource`] per `[[source]]` entry; any other
//! [`Source`] implementation can be registered next to them.

mod html;

pub use html::HtmlSource;

use crate::chain::Source;
use crate::config::Config;
use crate::transport::{RetryPolicy, Transport};
use crate::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

/// Domain-keyed collection of source adapters
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one HTML adapter per configured source
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let library_root = config.storage.library_root();
        let mut registry = Self::new();
        for entry in &config.sources {
            let source =
                HtmlSource::from_entry(entry, transport.clone(), retry.clone(), &library_root)?;
            registry.register(Arc::new(source));
        }
        Ok(registry)
    }

    /// Adds an adapter, replacing any previous one for the same domain
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources
            .insert(source.domain().to_ascii_lowercase(), source);
    }

    /// Looks up the adapter for a domain (case-insensitive)
    pub fn get(&self, domain: &str) -> Option<Arc<dyn Source>> {
        self.sources.get(&domain.to_ascii_lowercase()).cloned()
    }

    /// Registered domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self.sources.keys().cloned().collect();
        domains.sort();
        domains
    }
}
