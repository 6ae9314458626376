use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{FallbackPolicy, StorageBackend, StorageError, Tier};
use crate::classifier::enhance_search;
use crate::export::{self, DateRange, ExportError};
use crate::message::{Fingerprint, Message, MessageFilter, MessageUpdate};

type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pushed: usize,
    pub already_present: usize,
}

/// Routes every operation through the remote store and the optional local
/// cache.
///
/// Writes land on the primary tier and are mirrored into the other one on a
/// best-effort basis. A write served by the secondary is never mirrored back
/// into the primary that just failed it. Creates served by the local cache keep their
/// provisional id until [`HybridStore::sync`] pushes them.
#[derive(Clone)]
pub struct HybridStore {
    remote: Arc<dyn StorageBackend>,
    local: Option<Arc<dyn StorageBackend>>,
    policy: FallbackPolicy,
}

impl HybridStore {
    pub fn new(
        remote: Arc<dyn StorageBackend>,
        local: Option<Arc<dyn StorageBackend>>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            remote,
            local,
            policy,
        }
    }

    pub fn remote_only(remote: Arc<dyn StorageBackend>) -> Self {
        Self::new(remote, None, FallbackPolicy::default())
    }

    fn backend(&self, tier: Tier) -> Option<&dyn StorageBackend> {
        match tier {
            Tier::Remote => Some(&*self.remote),
            Tier::Local => self.local.as_deref(),
        }
    }

    fn other(&self, tier: Tier) -> Option<(Tier, &dyn StorageBackend)> {
        let other = match tier {
            Tier::Remote => Tier::Local,
            Tier::Local => Tier::Remote,
        };
        self.backend(other).map(|backend| (other, backend))
    }

    /// Runs `run` on the primary tier, then on the secondary when the policy
    /// accepts the primary failure. Returns the tier that served the call.
    async fn with_fallback<'a, T>(
        &'a self,
        operation: &'static str,
        run: impl Fn(&'a dyn StorageBackend) -> BackendFuture<'a, T>,
    ) -> Result<(T, Tier), StorageError> {
        let mut tiers = self
            .policy
            .order
            .into_iter()
            .filter_map(|tier| self.backend(tier).map(|backend| (tier, backend)));

        let (tier, primary) = tiers
            .next()
            .ok_or_else(|| StorageError::Unavailable("no storage backend configured".to_owned()))?;

        let primary_error = match run(primary).await {
            Ok(value) => return Ok((value, tier)),
            Err(error) => error,
        };

        let Some((fallback_tier, fallback)) = tiers.next() else {
            return Err(primary_error);
        };
        if !self.policy.should_fall_back(&primary_error) {
            return Err(primary_error);
        }

        warn!(
            operation,
            primary = primary.name(),
            fallback = fallback.name(),
            "primary storage failed, falling back: {}",
            primary_error
        );
        metrics::counter!(
            "inbox_storage_fallbacks_total",
            "operation" => operation,
            "reason" => primary_error.to_metric_tag()
        )
        .increment(1);

        match run(fallback).await {
            Ok(value) => Ok((value, fallback_tier)),
            Err(fallback_error) => Err(combine(primary_error, fallback_error)),
        }
    }

    fn mirror_failed(&self, operation: &'static str, backend: &dyn StorageBackend, error: &StorageError) {
        warn!(
            operation,
            backend = backend.name(),
            "failed to mirror write: {}",
            error
        );
        metrics::counter!(
            "inbox_storage_mirror_failures_total",
            "operation" => operation,
            "backend" => backend.name()
        )
        .increment(1);
    }

    /// Stores a new message and returns it with its assigned id: the remote
    /// id, or a negative provisional id when the local cache served the call.
    #[instrument(skip_all, fields(source = %message.source))]
    pub async fn create(&self, message: &Message) -> Result<Message, StorageError> {
        let (id, tier) = self.with_fallback("create", |b| b.insert(message)).await?;

        let mut stored = message.clone();
        stored.id = Some(id);
        stored.message_type = Some(stored.stored_type());

        // Provisional records reach the remote store through `sync` only.
        if tier == Tier::Remote {
            if let Some(local) = self.backend(Tier::Local) {
                if let Err(error) = local.put(id, &stored).await {
                    self.mirror_failed("create", local, &error);
                }
            }
        }

        debug!(id, tier = tier.as_str(), "message stored");
        Ok(stored)
    }

    /// A miss on the primary tier is retried on the other one, since
    /// provisional records only exist in the local cache. A miss on the
    /// secondary means the primary already failed, so it is final.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<Message>, StorageError> {
        let (found, tier) = self.with_fallback("get", |b| b.get(id)).await?;
        if found.is_some() || tier != self.policy.primary() {
            return Ok(found);
        }

        match self.other(tier) {
            Some((_, other)) => match other.get(id).await {
                Ok(found) => Ok(found),
                Err(error) => {
                    debug!(backend = other.name(), "secondary lookup failed: {}", error);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        let (messages, _) = self.with_fallback("list", |b| b.list(filter)).await?;
        Ok(messages)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: i64, changes: &MessageUpdate) -> Result<Message, StorageError> {
        let (updated, tier) = self
            .with_fallback("update", |b| b.update(id, changes))
            .await?;
        if tier != self.policy.primary() {
            return Ok(updated);
        }

        match self.other(tier) {
            Some((Tier::Local, local)) => {
                if let Err(error) = local.put(id, &updated).await {
                    self.mirror_failed("update", local, &error);
                }
            }
            Some((Tier::Remote, remote)) => match remote.update(id, changes).await {
                Ok(_) | Err(StorageError::NotFound(_)) => {}
                Err(error) => self.mirror_failed("update", remote, &error),
            },
            None => {}
        }

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), StorageError> {
        let ((), tier) = self.with_fallback("delete", |b| b.delete(id)).await?;
        if tier != self.policy.primary() {
            return Ok(());
        }

        if let Some((_, other)) = self.other(tier) {
            match other.delete(id).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(error) => self.mirror_failed("delete", other, &error),
            }
        }
        Ok(())
    }

    /// Pushes records that only exist in the local cache to the remote store.
    ///
    /// A cached record is already present remotely when its id is a remote id
    /// or a remote record shares its fingerprint. Pushed records are re-keyed
    /// in the cache to their remote id, so running this twice pushes nothing
    /// the second time. Remote records are never modified or pulled down.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncReport, StorageError> {
        let Some(local) = self.local.as_deref() else {
            info!("no local cache configured, nothing to sync");
            return Ok(SyncReport::default());
        };

        let everything = MessageFilter::default();
        let cached = local.list(&everything).await?;
        let remote = self.remote.list(&everything).await?;

        let remote_ids: HashSet<i64> = remote.iter().filter_map(|m| m.id).collect();
        let remote_prints: HashSet<Fingerprint> = remote.iter().map(Message::fingerprint).collect();

        let mut report = SyncReport::default();
        // oldest first, so remote ids follow creation order
        for record in cached.iter().rev() {
            let Some(local_id) = record.id else {
                continue;
            };
            if remote_ids.contains(&local_id) || remote_prints.contains(&record.fingerprint()) {
                report.already_present += 1;
                continue;
            }

            let remote_id = self.remote.insert(record).await?;
            report.pushed += 1;
            metrics::counter!("inbox_sync_pushed_total").increment(1);

            if let Err(error) = rekey(local, local_id, remote_id, record).await {
                // the fingerprint still matches, so the next sync will not push it again
                warn!(local_id, remote_id, "failed to re-key synced record: {}", error);
            }
        }

        info!(
            pushed = report.pushed,
            already_present = report.already_present,
            "sync finished"
        );
        Ok(report)
    }

    /// Messages matching `filter`, ranked by relevance to `query`.
    pub async fn search(
        &self,
        query: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, StorageError> {
        let candidates = self.list(filter).await?;
        Ok(enhance_search(query, candidates))
    }

    /// CSV rendering of the messages matching `filter` inside `range`.
    pub async fn export_csv(
        &self,
        filter: &MessageFilter,
        range: &DateRange,
    ) -> Result<String, ExportError> {
        let messages: Vec<Message> = self
            .list(filter)
            .await?
            .into_iter()
            .filter(|m| range.contains(m.created_at))
            .collect();
        export::to_csv(&messages)
    }
}

fn combine(primary: StorageError, fallback: StorageError) -> StorageError {
    match (primary, fallback) {
        (StorageError::NotFound(id), StorageError::NotFound(_)) => StorageError::NotFound(id),
        (primary, fallback) => StorageError::AllBackendsFailed {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        },
    }
}

async fn rekey(
    local: &dyn StorageBackend,
    from: i64,
    to: i64,
    record: &Message,
) -> Result<(), StorageError> {
    let mut rekeyed = record.clone();
    rekeyed.id = Some(to);
    local.put(to, &rekeyed).await?;
    local.delete(from).await
}
