//! Aggregation module
//!
//! Folds enriched comments into per-topic running statistics. Each topic
//! group is applied as one additive step on the stored counters, followed
//! immediately by re-deriving the averages from the committed sums and
//! merging the language histogram. A topic with no aggregate yet is
//! initialized from the group alone; when a concurrent worker wins that
//! race the additive step is retried, so no update is lost.

mod handler;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::{AggregateDelta, EnrichedComment, TopicAggregate, Totals};
use crate::store::{AddOutcome, AggregateStore, StoreError};

pub use handler::AggregateHandler;

/// Add/initialize rounds before giving up on a topic
const MAX_APPLY_ATTEMPTS: usize = 3;

/// What happened to a topic's aggregate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOutcome {
    /// Empty group, nothing written
    Noop,
    /// First aggregate for the topic was created from this group
    Initialized,
    /// Counters were added; totals after the add
    Updated(Totals),
}

/// Group items by topic id, keeping arrival order inside each group
pub fn partition<T, F>(items: impl IntoIterator<Item = T>, topic_of: F) -> BTreeMap<String, Vec<T>>
where
    F: Fn(&T) -> &str,
{
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let topic_id = topic_of(&item).to_string();
        groups.entry(topic_id).or_default().push(item);
    }
    groups
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn AggregateStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self { store }
    }

    /// Fold one topic's records into its aggregate
    pub async fn apply<'a, I>(&self, topic_id: &str, records: I) -> Result<ApplyOutcome, StoreError>
    where
        I: IntoIterator<Item = &'a EnrichedComment>,
    {
        let delta = AggregateDelta::from_records(records);
        if delta.is_empty() {
            return Ok(ApplyOutcome::Noop);
        }

        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            match self.store.add_totals(topic_id, &delta).await? {
                AddOutcome::Updated(totals) => {
                    self.finish_update(topic_id, &delta).await;
                    tracing::debug!(
                        topic_id,
                        total_comments = totals.total_comments,
                        added = delta.count,
                        "Updated topic aggregate"
                    );
                    return Ok(ApplyOutcome::Updated(totals));
                }
                AddOutcome::Missing => {
                    let Some(aggregate) = TopicAggregate::initial(topic_id, &delta, Utc::now())
                    else {
                        return Ok(ApplyOutcome::Noop);
                    };
                    if self.store.initialize(&aggregate).await? {
                        tracing::info!(
                            topic_id,
                            total_comments = aggregate.total_comments,
                            "Initialized topic aggregate"
                        );
                        return Ok(ApplyOutcome::Initialized);
                    }
                    tracing::debug!(topic_id, attempt, "Lost initialization race, retrying add");
                }
            }
        }

        Err(StoreError::InitializationConflict(topic_id.to_string()))
    }

    /// Derived fields after a committed add. The counters are already
    /// durable here, so failures are logged rather than returned: a retry
    /// would add the same delta twice. The next update rewrites them.
    async fn finish_update(&self, topic_id: &str, delta: &AggregateDelta) {
        if let Err(e) = self.store.derive_averages(topic_id, Utc::now()).await {
            tracing::error!(topic_id, error = %e, "Failed to derive averages after add");
        }
        if let Err(e) = self.store.merge_languages(topic_id, &delta.languages).await {
            tracing::error!(topic_id, error = %e, "Failed to merge language counts after add");
        }
    }
}
