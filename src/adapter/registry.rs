//! Scheme registry: maps a case-insensitive scheme to an adapter factory.
//! Initialized once at process start and read-only thereafter — no locking
//! needed during dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Adapter, AdapterFactory, ParseError};
use crate::descriptor::{self, DescriptorError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no adapter registered for scheme {0:?}")]
    UnknownScheme(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Clone, Debug)]
pub struct SchemeInfo {
    pub scheme: String,
    pub identifier: &'static str,
    pub default_port: Option<u16>,
    pub supports_attachments: bool,
    pub max_body_length: usize,
}

struct Entry {
    factory: Arc<dyn AdapterFactory>,
    info: SchemeInfo,
}

/// Maps scheme (case-insensitive) -> factory + capability metadata. Aliases
/// (multiple schemes mapping to the same factory) are supported by
/// registering the same factory under each name.
#[derive(Clone)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a factory under one or more scheme aliases, along with the
    /// capability metadata `GET /services` reports for each alias. Metadata
    /// is supplied by the caller rather than probed from a constructed
    /// adapter, since most factories require descriptor-sourced config
    /// (host, credentials) that isn't available at registration time.
    pub fn register(
        &mut self,
        schemes: &[&str],
        identifier: &'static str,
        default_port: Option<u16>,
        supports_attachments: bool,
        max_body_length: usize,
        factory: Arc<dyn AdapterFactory>,
    ) {
        for scheme in schemes {
            let scheme = scheme.to_ascii_lowercase();
            self.entries.insert(
                scheme.clone(),
                Entry {
                    factory: factory.clone(),
                    info: SchemeInfo {
                        scheme,
                        identifier,
                        default_port,
                        supports_attachments,
                        max_body_length,
                    },
                },
            );
        }
    }

    /// Parse `descriptor` and construct a freshly configured adapter.
    pub fn resolve(&self, descriptor: &str) -> Result<Box<dyn Adapter>, ResolveError> {
        let parsed = descriptor::parse(descriptor)?;
        let entry = self
            .entries
            .get(&parsed.scheme)
            .ok_or_else(|| ResolveError::UnknownScheme(parsed.scheme.clone()))?;
        Ok(entry.factory.parse(&parsed)?)
    }

    /// List the live registry contents for `GET /services`.
    pub fn list_services(&self) -> Vec<SchemeInfo> {
        let mut out: Vec<SchemeInfo> = self.entries.values().map(|e| e.info.clone()).collect();
        out.sort_by(|a, b| a.scheme.cmp(&b.scheme));
        out
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.entries.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
