use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backends::{BackendSurface, RetryPolicy, SourceAdapter};
use crate::events::{CatalogEvent, EventBus};

/// Where a resolved list came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    Adapter {
        name: String,
        surface: BackendSurface,
    },
    Placeholder,
}

impl ResolvedFrom {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ResolvedFrom::Placeholder)
    }
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFrom::Adapter { name, surface } => write!(f, "{} ({})", name, surface),
            ResolvedFrom::Placeholder => f.write_str("placeholder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Records(usize),
    Empty,
    /// Records came back but none of them can be shown
    Unusable(usize),
    Failed(String),
}

/// One adapter's turn in a cascade, after its retries
#[derive(Debug, Clone)]
pub struct Attempt {
    pub adapter: String,
    pub surface: BackendSurface,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Resolution<T> {
    pub records: Vec<T>,
    pub source: ResolvedFrom,
    pub attempts: Vec<Attempt>,
}

fn any_record<T>(_: &T) -> bool {
    true
}

/// Tries a resource's adapters one after another until one yields records.
///
/// Adapters run strictly in order; the next one only starts after the
/// previous one failed for good or came back empty. Adapter errors stay in
/// here: when nothing works the caller gets placeholder records.
pub struct CascadeOrchestrator<P, T> {
    resource: &'static str,
    adapters: Vec<Arc<dyn SourceAdapter<P, T>>>,
    retry: RetryPolicy,
    placeholders: fn(usize) -> Vec<T>,
    placeholder_count: usize,
    usable: fn(&T) -> bool,
    events: Option<Arc<EventBus>>,
}

impl<P, T> CascadeOrchestrator<P, T>
where
    P: Send + Sync,
    T: Send,
{
    pub fn new(
        resource: &'static str,
        adapters: Vec<Arc<dyn SourceAdapter<P, T>>>,
        placeholders: fn(usize) -> Vec<T>,
        placeholder_count: usize,
    ) -> Self {
        Self {
            resource,
            adapters,
            retry: RetryPolicy::default(),
            placeholders,
            placeholder_count,
            usable: any_record,
            events: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A response counts as a hit only if at least one record passes
    /// `usable`; otherwise the next adapter is tried. Records are returned
    /// unfiltered.
    pub fn with_usable_check(mut self, usable: fn(&T) -> bool) -> Self {
        self.usable = usable;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub async fn resolve(&self, params: &P) -> Vec<T> {
        self.resolve_detailed(params).await.records
    }

    pub async fn resolve_detailed(&self, params: &P) -> Resolution<T> {
        let mut attempts = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let started = Instant::now();
            let operation = format!("{}/{}", self.resource, adapter.name());
            let result = self.retry.execute(&operation, || adapter.fetch(params)).await;
            let elapsed = started.elapsed();

            let outcome = match result {
                Ok(records) if records.iter().any(|r| (self.usable)(r)) => {
                    info!(
                        "{}: {} records from {} ({}) in {:?}",
                        self.resource,
                        records.len(),
                        adapter.name(),
                        adapter.surface(),
                        elapsed
                    );
                    attempts.push(Attempt {
                        adapter: adapter.name().to_string(),
                        surface: adapter.surface(),
                        outcome: AttemptOutcome::Records(records.len()),
                        elapsed,
                    });
                    return Resolution {
                        records,
                        source: ResolvedFrom::Adapter {
                            name: adapter.name().to_string(),
                            surface: adapter.surface(),
                        },
                        attempts,
                    };
                }
                Ok(records) if records.is_empty() => {
                    debug!("{}: {} returned no records", self.resource, adapter.name());
                    AttemptOutcome::Empty
                }
                Ok(records) => {
                    info!(
                        "{}: {} returned {} records, none presentable",
                        self.resource,
                        adapter.name(),
                        records.len()
                    );
                    AttemptOutcome::Unusable(records.len())
                }
                Err(e) => {
                    warn!(
                        "{}: {} ({}) failed: {}",
                        self.resource,
                        adapter.name(),
                        adapter.surface(),
                        e
                    );
                    AttemptOutcome::Failed(e.to_string())
                }
            };

            attempts.push(Attempt {
                adapter: adapter.name().to_string(),
                surface: adapter.surface(),
                outcome,
                elapsed,
            });
        }

        warn!(
            "{}: all {} sources exhausted, serving {} placeholders",
            self.resource,
            self.adapters.len(),
            self.placeholder_count
        );
        if let Some(events) = &self.events {
            events.publish(CatalogEvent::placeholders_served(
                self.resource,
                self.placeholder_count,
            ));
        }

        Resolution {
            records: (self.placeholders)(self.placeholder_count),
            source: ResolvedFrom::Placeholder,
            attempts,
        }
    }
}
