//! The sync cycle.
//!
//! A cycle validates the account, replays queued mutations one at a time,
//! fetches folders, feeds, and items, and folds everything into the store
//! with a single atomic merge. Only one cycle runs at a time; a trigger
//! arriving while a cycle is in flight is coalesced into it.

use crate::account::{AccountConfig, AccountHandle};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{CycleSummary, EventBus, SyncEvent, SyncTrigger};
use crate::state::{StateEvent, SyncState};
use crate::validator::{AccountValidator, Validation};
use feedsync_api::{
    ApiClient, ApiError, ApiRequest, ApiResponse, Capabilities, FeedList, FetchItems, HttpClient,
};
use feedsync_core::{
    FailureDisposition, Folder, MutationOp, PullCursor, ReadyMutation, ServerSnapshot, Store,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Result of [`Synchronizer::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cycle ran to completion.
    Completed(CycleSummary),
    /// Another cycle was already running; its result covers this trigger.
    Coalesced,
}

/// Cumulative statistics over all cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Triggers coalesced into a running cycle.
    pub cycles_coalesced: u64,
    /// Articles inserted or updated.
    pub articles_merged: u64,
    /// Mutations the server accepted.
    pub mutations_confirmed: u64,
    /// Mutations discarded after permanent failures.
    pub mutations_failed: u64,
    /// End of the last successful cycle.
    pub last_sync_time: Option<Instant>,
    /// Message of the last failure, cleared by a successful cycle.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct PushReport {
    confirmed: usize,
    failed: usize,
    stalled: bool,
}

/// Drives sync cycles for one account and its store.
pub struct Synchronizer<C: HttpClient> {
    account: Arc<AccountHandle>,
    store: Arc<Store>,
    http: Arc<C>,
    validator: AccountValidator<Arc<C>>,
    config: SyncConfig,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    events: EventBus,
}

/// Clears the cancel and in-flight flags when the cycle ends, however it ends.
struct InFlight<'a> {
    in_flight: &'a AtomicBool,
    cancelled: &'a AtomicBool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl<C: HttpClient> Synchronizer<C> {
    /// Creates a synchronizer.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `store` belongs to a different account.
    pub fn new(
        account: Arc<AccountHandle>,
        store: Arc<Store>,
        http: C,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let expected = account.snapshot().account_id();
        if store.account() != &expected {
            return Err(SyncError::configuration(format!(
                "store belongs to account {}, configuration to {expected}",
                store.account()
            )));
        }

        let http = Arc::new(http);
        let validator = AccountValidator::new(Arc::clone(&http)).with_timeout(config.timeout);
        Ok(Self {
            account,
            store,
            http,
            validator,
            config,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            events: EventBus::new(),
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Returns the account handle.
    pub fn account(&self) -> &Arc<AccountHandle> {
        &self.account
    }

    /// Subscribes to cycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns true while a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Asks the running cycle to stop at the next phase boundary.
    pub fn cancel(&self) {
        if self.is_syncing() {
            info!("sync cancellation requested");
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Validates `candidate` and, if it is valid, runs a cycle with it.
    ///
    /// Returns the validation outcome together with the cycle outcome; no
    /// cycle runs when validation fails.
    ///
    /// # Errors
    ///
    /// Returns the cycle's error.
    pub fn reconfigure(
        &self,
        candidate: &AccountConfig,
    ) -> SyncResult<(Validation, Option<SyncOutcome>)> {
        if candidate.account_id() != *self.store.account() {
            return Err(SyncError::configuration(
                "a different server or user needs its own store",
            ));
        }
        let validation = self.validator.validate(candidate, &self.account);
        if !validation.is_valid() {
            return Ok((validation, None));
        }
        let outcome = self.sync(SyncTrigger::ConfigurationChanged)?;
        Ok((validation, Some(outcome)))
    }

    /// Runs one sync cycle.
    ///
    /// A trigger arriving while another cycle runs returns
    /// [`SyncOutcome::Coalesced`] immediately.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the cycle. It is also published as a
    /// [`SyncEvent::Error`], and the state returns to [`SyncState::Idle`].
    pub fn sync(&self, trigger: SyncTrigger) -> SyncResult<SyncOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(%trigger, "sync already running, trigger coalesced");
            self.stats.write().cycles_coalesced += 1;
            return Ok(SyncOutcome::Coalesced);
        }
        let _guard = InFlight {
            in_flight: &self.in_flight,
            cancelled: &self.cancelled,
        };

        let start = Instant::now();
        info!(%trigger, "sync cycle started");
        self.events.publish(SyncEvent::CycleStarted { trigger });

        match self.run_cycle() {
            Ok(mut summary) => {
                summary.duration = start.elapsed();
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.articles_merged += summary.articles_merged() as u64;
                    stats.mutations_confirmed += summary.mutations_confirmed as u64;
                    stats.mutations_failed += summary.mutations_failed as u64;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                info!(
                    %trigger,
                    inserted = summary.articles_inserted,
                    updated = summary.articles_updated,
                    confirmed = summary.mutations_confirmed,
                    failed = summary.mutations_failed,
                    watermark = summary.watermark,
                    elapsed_ms = summary.duration.as_millis() as u64,
                    "sync cycle finished"
                );
                self.events.publish(SyncEvent::CycleFinished {
                    trigger,
                    summary: summary.clone(),
                });
                Ok(SyncOutcome::Completed(summary))
            }
            Err(err) => {
                self.advance(StateEvent::Failed);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_failed += 1;
                    stats.last_error = Some(err.to_string());
                }
                warn!(%trigger, kind = %err.kind(), error = %err, "sync cycle failed");
                self.events.publish(SyncEvent::Error {
                    trigger,
                    kind: err.kind(),
                    message: err.to_string(),
                });
                self.advance(StateEvent::Reset);
                Err(err)
            }
        }
    }

    fn run_cycle(&self) -> SyncResult<CycleSummary> {
        let mut summary = CycleSummary::default();

        self.advance(StateEvent::Triggered);
        let capabilities = self.validate()?;
        self.check_cancelled()?;

        let account = self.account.snapshot();
        let api = ApiClient::new(
            &account.server_url,
            account.credentials.clone(),
            self.http.as_ref(),
        )
        .with_timeout(self.config.timeout);

        self.advance(StateEvent::Validated);
        let push = self.push(&api, &capabilities)?;
        summary.mutations_confirmed = push.confirmed;
        summary.mutations_failed = push.failed;
        summary.push_stalled = push.stalled;
        self.check_cancelled()?;

        self.advance(StateEvent::Pushed);
        let since = self.store.watermark(&account.account_id())?;
        let cursor = self.store.snapshot().pull_cursor();
        let snapshot = self.pull(&api, since, cursor)?;
        self.check_cancelled()?;

        self.advance(StateEvent::Pulled);
        let report = self.store.upsert_from_server(snapshot)?;
        summary.folders_changed = report.folders_upserted + report.folders_removed;
        summary.feeds_changed = report.feeds_upserted + report.feeds_removed;
        summary.articles_inserted = report.articles_inserted;
        summary.articles_updated = report.articles_updated;
        summary.articles_skipped = report.articles_skipped;
        summary.watermark = report.watermark;
        summary.failures = self.store.take_failures()?;
        summary.mutations_pending = self.store.snapshot().pending_mutations().count();

        self.advance(StateEvent::Merged);
        Ok(summary)
    }

    fn validate(&self) -> SyncResult<Capabilities> {
        let current = self.account.snapshot();
        if let (false, Some(capabilities)) =
            (self.config.revalidate_each_cycle, current.capabilities.clone())
        {
            return Ok(capabilities);
        }

        match self.validator.validate(&current, &self.account) {
            Validation::Valid(capabilities) => Ok(capabilities),
            failed => Err(failed
                .into_error()
                .unwrap_or_else(|| SyncError::configuration("validation failed"))),
        }
    }

    /// Pushes ready mutations one at a time, oldest first.
    fn push(&self, api: &ApiClient<&C>, capabilities: &Capabilities) -> SyncResult<PushReport> {
        let mut report = PushReport::default();

        for _ in 0..self.config.push_limit {
            self.check_cancelled()?;
            let Some(ready) = self.store.next_mutations(1).into_iter().next() else {
                break;
            };

            let request = ApiRequest::for_mutation(&ready.op, capabilities);
            debug!(
                handle = %ready.handle,
                request = request.name(),
                attempts = ready.attempts,
                "pushing mutation"
            );

            match api.execute(&request) {
                Ok(response) => {
                    if self.confirm(&ready, response)? {
                        report.confirmed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(ApiError::ServerRejected { status: 409, .. })
                    if ready.op.creates().is_some() =>
                {
                    if self.adopt_existing(api, &ready)? {
                        report.confirmed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(err @ ApiError::Authentication { .. }) => return Err(err.into()),
                Err(err) if err.is_retryable() => {
                    warn!(handle = %ready.handle, error = %err, "push stalled until next cycle");
                    self.store.fail_mutation(
                        ready.handle,
                        FailureDisposition::Retry,
                        &err.to_string(),
                    )?;
                    report.stalled = true;
                    break;
                }
                Err(err) => {
                    warn!(handle = %ready.handle, error = %err, "mutation rejected, discarding");
                    self.store.fail_mutation(
                        ready.handle,
                        FailureDisposition::Discard,
                        &err.to_string(),
                    )?;
                    report.failed += 1;
                }
            }
        }

        if report.confirmed + report.failed > 0 {
            info!(
                confirmed = report.confirmed,
                failed = report.failed,
                stalled = report.stalled,
                "mutations pushed"
            );
        }
        Ok(report)
    }

    /// Applies a successful response. Returns false if the mutation was discarded.
    fn confirm(&self, ready: &ReadyMutation, response: ApiResponse) -> SyncResult<bool> {
        match (ready.op.creates(), response) {
            (None, _) => self.store.confirm_mutation(ready.handle)?,
            (Some(_), ApiResponse::FolderCreated(folder)) => {
                self.store.confirm_created(ready.handle, folder.id.get())?;
            }
            (Some(_), ApiResponse::FeedCreated(feed)) => {
                self.store.confirm_created(ready.handle, feed.id.get())?;
            }
            (Some(_), other) => {
                let reason = format!("create answered without an id: {other:?}");
                self.store
                    .fail_mutation(ready.handle, FailureDisposition::Discard, &reason)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Confirms a create the server already has, by name or URL.
    fn adopt_existing(&self, api: &ApiClient<&C>, ready: &ReadyMutation) -> SyncResult<bool> {
        let existing = match &ready.op {
            MutationOp::CreateFolder { name, .. } => api
                .folders()?
                .into_iter()
                .find(|folder: &Folder| &folder.name == name)
                .map(|folder| folder.id.get()),
            MutationOp::CreateFeed { url, .. } => api
                .feeds()?
                .feeds
                .into_iter()
                .find(|feed| &feed.url == url)
                .map(|feed| feed.id.get()),
            _ => None,
        };

        match existing {
            Some(id) => {
                info!(handle = %ready.handle, id, "create already applied on server");
                self.store.confirm_created(ready.handle, id)?;
                Ok(true)
            }
            None => {
                self.store.fail_mutation(
                    ready.handle,
                    FailureDisposition::Discard,
                    "server reports a conflict but has no matching entity",
                )?;
                Ok(false)
            }
        }
    }

    /// Fetches folders, feeds, then items changed since `since`, continuing
    /// below the cursor's offset if the item cap cut the previous pull short.
    fn pull(
        &self,
        api: &ApiClient<&C>,
        since: u64,
        cursor: Option<PullCursor>,
    ) -> SyncResult<ServerSnapshot> {
        let (folders, feeds) = if self.config.parallel_fetch {
            std::thread::scope(|scope| {
                let folders = scope.spawn(|| api.folders());
                let feeds = api.feeds();
                let folders = folders
                    .join()
                    .unwrap_or_else(|_| Err(ApiError::network("folder fetch aborted")));
                (folders, feeds)
            })
        } else {
            (api.folders(), api.feeds())
        };
        let folders = folders?;
        let FeedList { feeds, .. } = feeds?;
        self.check_cancelled()?;

        let mut params = match cursor {
            Some(cursor) => FetchItems::since(cursor.since).with_offset(cursor.offset),
            None => FetchItems::since(since),
        }
        .with_batch_size(self.config.item_batch_size);
        if let Some(cap) = self.config.max_items {
            params = params.with_max_items(cap);
        }
        let batch = api.items(params)?;
        debug!(
            folders = folders.len(),
            feeds = feeds.len(),
            items = batch.articles.len(),
            pages = batch.pages,
            since,
            resume_offset = ?batch.resume_offset,
            "pull complete"
        );

        let snapshot = ServerSnapshot::new()
            .with_folders(folders)
            .with_feeds(feeds)
            .with_articles(batch.articles)
            .with_marker(batch.max_marker);
        Ok(match batch.resume_offset {
            Some(offset) => snapshot.with_resume_offset(offset),
            None => snapshot,
        })
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn advance(&self, event: StateEvent) {
        let mut state = self.state.write();
        let next = state.next(event).unwrap_or_else(|| {
            warn!(state = %*state, ?event, "unexpected state transition");
            SyncState::Error
        });
        *state = next;
        drop(state);
        self.events.publish(SyncEvent::StateChanged(next));
    }
}

/// Delay before the next timer-triggered cycle.
pub(crate) fn next_delay(config: &SyncConfig, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        config.sync_interval
    } else {
        config.retry.delay_for_attempt(consecutive_failures)
    }
}

impl<C: HttpClient> std::fmt::Debug for Synchronizer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("account", &self.store.account())
            .field("state", &self.state())
            .field("syncing", &self.is_syncing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_testkit::{
        memory_store, test_credentials, FakeNewsServer, LoopbackClient, TEST_SERVER_URL,
    };

    fn synchronizer(server: &Arc<FakeNewsServer>) -> Synchronizer<LoopbackClient> {
        let account = AccountHandle::new(AccountConfig::new(TEST_SERVER_URL, test_credentials()));
        Synchronizer::new(
            Arc::new(account),
            Arc::new(memory_store()),
            LoopbackClient::new(Arc::clone(server)),
            SyncConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn store_of_other_account_is_rejected() {
        let server = Arc::new(FakeNewsServer::default());
        let account = AccountHandle::new(AccountConfig::new(
            "https://other.example.com",
            test_credentials(),
        ));
        let err = Synchronizer::new(
            Arc::new(account),
            Arc::new(memory_store()),
            LoopbackClient::new(server),
            SyncConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn state_events_follow_the_machine() {
        let server = Arc::new(FakeNewsServer::default());
        let sync = synchronizer(&server);
        let mut rx = sync.subscribe();

        sync.sync(SyncTrigger::User).unwrap();

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                SyncState::Validating,
                SyncState::PushingMutations,
                SyncState::Pulling,
                SyncState::Merging,
                SyncState::Idle,
            ]
        );
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[test]
    fn busy_flag_coalesces_triggers() {
        let server = Arc::new(FakeNewsServer::default());
        let sync = synchronizer(&server);

        sync.in_flight.store(true, Ordering::SeqCst);
        assert_eq!(sync.sync(SyncTrigger::Timer).unwrap(), SyncOutcome::Coalesced);
        assert!(server.requests().is_empty());
        assert_eq!(sync.stats().cycles_coalesced, 1);

        sync.in_flight.store(false, Ordering::SeqCst);
        assert!(matches!(
            sync.sync(SyncTrigger::Timer).unwrap(),
            SyncOutcome::Completed(_)
        ));
        assert!(!sync.is_syncing());
    }

    #[test]
    fn failed_cycle_returns_to_idle() {
        let server = Arc::new(FakeNewsServer::default());
        server.set_offline(true);
        let sync = synchronizer(&server);

        let err = sync.sync(SyncTrigger::User).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert_eq!(sync.state(), SyncState::Idle);
        assert_eq!(sync.stats().cycles_failed, 1);
        assert!(sync.stats().last_error.is_some());
    }

    #[test]
    fn backoff_resets_to_interval() {
        let config = SyncConfig::default()
            .with_sync_interval(Duration::from_secs(600))
            .with_retry(
                crate::config::RetryConfig::new(Duration::from_secs(10))
                    .with_max_delay(Duration::from_secs(60))
                    .with_jitter(false),
            );
        assert_eq!(next_delay(&config, 0), Duration::from_secs(600));
        assert_eq!(next_delay(&config, 1), Duration::from_secs(10));
        assert_eq!(next_delay(&config, 2), Duration::from_secs(20));
        assert_eq!(next_delay(&config, 9), Duration::from_secs(60));
    }
}
