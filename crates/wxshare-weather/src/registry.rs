//! Directory of running producers, looked up by name.
//!
//! Producers register themselves when they start; readers resolve them by
//! the endpoint name in their own configuration. The directory is passed
//! explicitly to both sides.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::provider::WeatherProvider;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No producer named {endpoint} is registered")]
    NotFound { endpoint: String },

    #[error("{count} producers named {endpoint} and no weather_endpoint_id to choose between them")]
    Ambiguous { endpoint: String, count: usize },

    #[error("No producer named {endpoint} has weather_endpoint_id {id}")]
    IdNotFound { endpoint: String, id: String },
}

/// One producer as seen by readers
#[derive(Clone)]
pub struct ProviderRegistration {
    pub name: String,
    pub endpoint_id: Option<String>,
    pub provider: Arc<dyn WeatherProvider>,
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("endpoint_id", &self.endpoint_id)
            .field("provider", &self.provider.name())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ProviderDirectory {
    entries: RwLock<Vec<ProviderRegistration>>,
    lookups: AtomicUsize,
}

impl ProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        endpoint_id: Option<String>,
        provider: Arc<dyn WeatherProvider>,
    ) {
        let registration = ProviderRegistration {
            name: name.into(),
            endpoint_id,
            provider,
        };
        tracing::info!(
            "Registered producer {} (id: {:?}, backend: {})",
            registration.name,
            registration.endpoint_id,
            registration.provider.name()
        );
        self.entries.write().push(registration);
    }

    /// Find the producer a reader configured with `endpoint`/`endpoint_id` should bind to.
    ///
    /// A single producer with that name is returned regardless of id. Several
    /// same-named producers require an id that matches exactly one of them;
    /// there is no fallback to the first candidate.
    pub fn resolve(
        &self,
        endpoint: &str,
        endpoint_id: Option<&str>,
    ) -> Result<Arc<dyn WeatherProvider>, ResolveError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let entries = self.entries.read();
        let candidates: Vec<&ProviderRegistration> =
            entries.iter().filter(|r| r.name == endpoint).collect();

        match candidates.as_slice() {
            [] => Err(ResolveError::NotFound {
                endpoint: endpoint.to_string(),
            }),
            [only] => Ok(Arc::clone(&only.provider)),
            many => {
                let Some(id) = endpoint_id else {
                    return Err(ResolveError::Ambiguous {
                        endpoint: endpoint.to_string(),
                        count: many.len(),
                    });
                };

                let matching: Vec<&&ProviderRegistration> = many
                    .iter()
                    .filter(|r| r.endpoint_id.as_deref() == Some(id))
                    .collect();

                match matching.as_slice() {
                    [one] => Ok(Arc::clone(&one.provider)),
                    [] => Err(ResolveError::IdNotFound {
                        endpoint: endpoint.to_string(),
                        id: id.to_string(),
                    }),
                    dupes => Err(ResolveError::Ambiguous {
                        endpoint: endpoint.to_string(),
                        count: dupes.len(),
                    }),
                }
            }
        }
    }

    /// Number of `resolve` calls made so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}
