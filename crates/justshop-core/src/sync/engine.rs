//! Sync engine
//!
//! Keeps the local repository in step with the server's list.
//!
//! ## Tasks
//!
//! `start()` spawns two tasks:
//!
//! - **session**: opens the push channel, applies every snapshot it
//!   delivers, and on loss waits out the reconnect delay. While the channel
//!   is down or still opening it polls `GET /v1/current` every sync interval.
//! - **outbound worker**: performs HTTP mutations one at a time, in the
//!   order they were made. Failures go to the outbox and are replayed the
//!   next time the push channel opens or a fallback poll succeeds.
//!
//! Local edits never wait for the network: they are written to the
//! repository, queued for the worker, and observers are told right away.
//!
//! ## States
//!
//! ```text
//! Disconnected ──start / delay elapsed──▶ Connecting
//! Connecting ──channel open──▶ Connected      (connectivity = true)
//! Connecting ──open failed──▶ Disconnected    (connectivity = false)
//! Connected ──channel lost──▶ Disconnected    (connectivity = false)
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::backoff::{Backoff, ReconnectPolicy};
use super::connectivity::Connectivity;
use super::observers::{Observer, ObserverId, Observers};
use super::outbox::{OutboundOp, Outbox};
use super::reconcile::{reconcile, ConflictPolicy, ReconcileOutcome};
use crate::config::{Config, SettingsProvider};
use crate::models::{Item, Snapshot};
use crate::remote::{ChannelEvent, PushChannel, Remote, RemoteError};
use crate::storage::{ItemRepository, LiveView, StorageError, StorageResult};

/// Pending refreshes beyond this are dropped
const COMMAND_BUFFER: usize = 16;

/// Longest wait for `open_push_channel` before treating it as failed
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Push channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No channel, waiting to retry (fallback polling runs here)
    Disconnected,
    /// Opening the push channel
    Connecting,
    /// Push channel open
    Connected,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Disconnected => "disconnected",
            SyncStatus::Connecting => "connecting",
            SyncStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub conflict_policy: ConflictPolicy,
    pub reconnect: ReconnectPolicy,
    /// Upper bound on opening the push channel; fallback polling keeps
    /// running while it is pending
    pub connect_timeout: Duration,
    /// Shared with whoever displays the online indicator
    pub connectivity: Connectivity,
    pub observers: Observers,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connectivity: Connectivity::default(),
            observers: Observers::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            conflict_policy: config.conflict_policy,
            reconnect: ReconnectPolicy::from_config(config),
            ..Self::default()
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync engine is already running")]
    AlreadyRunning,
}

/// Commands for the session task
#[derive(Debug)]
enum SessionCommand {
    Refresh,
    Shutdown,
}

/// Work for the outbound worker
#[derive(Debug)]
enum Outbound {
    Op(OutboundOp),
    /// Retry everything in the outbox
    Replay,
    Shutdown,
}

/// Whether the session should keep going
enum Flow {
    Continue,
    Shutdown,
}

type Receivers = (
    mpsc::Receiver<SessionCommand>,
    mpsc::UnboundedReceiver<Outbound>,
);

struct Shared {
    repo: Arc<ItemRepository>,
    remote: Arc<dyn Remote>,
    settings: Arc<dyn SettingsProvider>,
    options: SyncOptions,
    outbox: Mutex<Outbox>,
    status: watch::Sender<SyncStatus>,
    commands: mpsc::Sender<SessionCommand>,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// Taken by `start`
    receivers: Mutex<Option<Receivers>>,
}

/// Handle on the local list and its sync with the server
///
/// Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    pub fn new(
        repo: Arc<ItemRepository>,
        remote: Arc<dyn Remote>,
        settings: Arc<dyn SettingsProvider>,
        options: SyncOptions,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SyncStatus::Disconnected);

        Self {
            shared: Arc::new(Shared {
                repo,
                remote,
                settings,
                options,
                outbox: Mutex::new(Outbox::new()),
                status,
                commands,
                outbound,
                receivers: Mutex::new(Some((command_rx, outbound_rx))),
            }),
        }
    }

    // ==================== Local edits ====================

    /// Create or replace an item
    ///
    /// Returns once the row is stored; the server is told in the background.
    pub async fn update(&self, item: Item) -> StorageResult<()> {
        let stored = item.clone();
        self.with_repo(move |repo| repo.insert(&stored)).await?;
        debug!("Stored local update for {}", item.id);

        self.enqueue(OutboundOp::Update(item));
        self.shared.options.observers.notify();
        Ok(())
    }

    /// Add a new unchecked item
    pub async fn add(&self, content: impl Into<String>) -> StorageResult<Item> {
        let item = Item::new(content);
        self.update(item.clone()).await?;
        Ok(item)
    }

    /// Remove every item, locally now and on the server in the background
    pub async fn delete_all(&self) -> StorageResult<usize> {
        let removed = self.with_repo(|repo| repo.delete_all()).await?;
        self.enqueue(OutboundOp::DeleteAll);
        self.shared.options.observers.notify();
        Ok(removed)
    }

    /// Remove checked items, locally now and on the server in the background
    pub async fn delete_checked(&self) -> StorageResult<usize> {
        let removed = self.with_repo(|repo| repo.delete_where_checked()).await?;
        self.enqueue(OutboundOp::DeleteChecked);
        self.shared.options.observers.notify();
        Ok(removed)
    }

    /// Ask the session for an immediate full fetch
    pub fn refresh(&self) {
        if let Err(e) = self.shared.commands.try_send(SessionCommand::Refresh) {
            debug!("Refresh not queued: {}", e);
        }
    }

    /// Make the local list match a server snapshot and notify observers
    pub async fn apply_snapshot(&self, snapshot: Snapshot) -> StorageResult<ReconcileOutcome> {
        let policy = self.shared.options.conflict_policy;
        let outcome = self
            .with_repo(move |repo| reconcile(repo, &snapshot, policy))
            .await?;
        self.shared.options.observers.notify();
        Ok(outcome)
    }

    // ==================== Accessors ====================

    /// Current items, oldest first
    pub fn items(&self) -> Vec<Item> {
        self.shared.repo.live_view().latest()
    }

    pub fn live_view(&self) -> LiveView {
        self.shared.repo.live_view()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.options.connectivity.is_connected()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.shared.options.connectivity.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    pub fn register_observer(&self, observer: impl Observer + 'static) -> ObserverId {
        self.shared.options.observers.register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.shared.options.observers.unregister(id)
    }

    /// Operations waiting in the outbox for the next reconnect
    pub fn pending_outbound(&self) -> usize {
        self.outbox().len()
    }

    // ==================== Lifecycle ====================

    /// Spawn the session and outbound tasks
    ///
    /// An engine runs at most once. Edits made before `start` are sent as
    /// soon as the worker is up.
    pub fn start(&self) -> Result<SyncHandle, SyncError> {
        let (command_rx, outbound_rx) = self
            .shared
            .receivers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(SyncError::AlreadyRunning)?;

        info!("Starting sync engine");
        let session = tokio::spawn(run_session(self.clone(), command_rx));
        let worker = tokio::spawn(run_outbound(self.clone(), outbound_rx));

        Ok(SyncHandle {
            commands: self.shared.commands.clone(),
            outbound: self.shared.outbound.clone(),
            session: Some(session),
            worker: Some(worker),
        })
    }

    // ==================== Internals ====================

    /// Run a storage operation on the blocking pool
    async fn with_repo<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ItemRepository) -> StorageResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.shared.repo);
        tokio::task::spawn_blocking(move || op(&repo))
            .await
            .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }

    fn enqueue(&self, op: OutboundOp) {
        if let Err(mpsc::error::SendError(Outbound::Op(op))) =
            self.shared.outbound.send(Outbound::Op(op))
        {
            warn!("Outbound worker stopped, keeping {} for later", op);
            self.outbox().push(op);
        }
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.shared
            .outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, status: SyncStatus) {
        let changed = self.shared.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!("Sync status: {}", status);
        }
    }

    fn set_connected(&self, connected: bool) {
        if self.shared.options.connectivity.set(connected) {
            info!("Server {}", if connected { "reachable" } else { "unreachable" });
            self.shared.options.observers.notify();
        }
    }

    /// Apply a snapshot from the server; storage failures are only logged
    async fn apply_remote(&self, snapshot: Snapshot) {
        if let Err(e) = self.apply_snapshot(snapshot).await {
            warn!("Failed to apply server snapshot: {}", e);
        }
    }

    /// One full fetch
    ///
    /// With `fallback` set the push channel is down, so the outcome decides
    /// connectivity.
    async fn poll(&self, fallback: bool) {
        match self.shared.remote.fetch_snapshot().await {
            Ok(snapshot) => {
                self.apply_remote(snapshot).await;
                if fallback {
                    self.set_connected(true);
                    self.replay_outbox();
                }
            }
            Err(e) => {
                warn!("Fetching current list failed: {}", e);
                if fallback {
                    self.set_connected(false);
                }
            }
        }
    }

    fn on_channel_open(&self) {
        self.set_connected(true);
        self.set_status(SyncStatus::Connected);
        self.replay_outbox();
    }

    /// Hand the outbox to the worker if anything is waiting
    fn replay_outbox(&self) {
        let pending = self.pending_outbound();
        if pending > 0 {
            info!("Replaying {} pending operations", pending);
            let _ = self.shared.outbound.send(Outbound::Replay);
        }
    }

    /// Open the push channel, serving refreshes and fallback polls while the
    /// handshake runs
    ///
    /// `None` means shutdown was requested.
    async fn open_channel(
        &self,
        next_poll: &mut Instant,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Option<Result<PushChannel, RemoteError>> {
        let limit = self.shared.options.connect_timeout;
        let open = tokio::time::timeout(limit, self.shared.remote.open_push_channel());
        tokio::pin!(open);

        loop {
            tokio::select! {
                result = &mut open => {
                    return Some(result.unwrap_or_else(|_| {
                        Err(RemoteError::Timeout {
                            what: "opening the push channel",
                            after: limit,
                        })
                    }));
                }
                _ = sleep_until(*next_poll) => {
                    self.poll(true).await;
                    *next_poll = Instant::now() + self.shared.settings.sync_interval();
                }
                command = commands.recv() => match command {
                    Some(SessionCommand::Refresh) => self.poll(true).await,
                    Some(SessionCommand::Shutdown) | None => return None,
                },
            }
        }
    }

    /// Apply snapshots until the channel is lost or shutdown is requested
    async fn pump(
        &self,
        mut channel: PushChannel,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Flow {
        loop {
            tokio::select! {
                event = channel.next() => match event {
                    Some(ChannelEvent::Snapshot(snapshot)) => {
                        debug!("Snapshot with {} items", snapshot.len());
                        self.apply_remote(snapshot).await;
                    }
                    Some(ChannelEvent::Lost(reason)) => {
                        warn!("Push channel lost: {}", reason);
                        self.set_connected(false);
                        return Flow::Continue;
                    }
                    None => {
                        self.set_connected(false);
                        return Flow::Continue;
                    }
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Refresh) => self.poll(false).await,
                    Some(SessionCommand::Shutdown) | None => return Flow::Shutdown,
                },
            }
        }
    }

    /// Sit out the reconnect delay, polling on the sync interval meanwhile
    async fn wait_for_reconnect(
        &self,
        delay: Duration,
        next_poll: &mut Instant,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Flow {
        let reconnect_at = Instant::now() + delay;

        loop {
            tokio::select! {
                _ = sleep_until(reconnect_at) => return Flow::Continue,
                _ = sleep_until(*next_poll) => {
                    self.poll(true).await;
                    *next_poll = Instant::now() + self.shared.settings.sync_interval();
                }
                command = commands.recv() => match command {
                    Some(SessionCommand::Refresh) => self.poll(true).await,
                    Some(SessionCommand::Shutdown) | None => return Flow::Shutdown,
                },
            }
        }
    }

    /// Send one operation, stashing it in the outbox on failure
    async fn deliver(&self, op: OutboundOp) {
        match op.send(self.shared.remote.as_ref()).await {
            Ok(()) => {
                debug!("Sent {}", op);
                self.outbox().settle(&op);
            }
            Err(e) => {
                warn!("Failed to send {}, will retry after reconnect: {}", op, e);
                self.outbox().push(op);
            }
        }
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &self.status())
            .field("connected", &self.is_connected())
            .field("pending_outbound", &self.pending_outbound())
            .finish()
    }
}

/// Session task: connect, pump, back off, repeat
async fn run_session(engine: SyncEngine, mut commands: mpsc::Receiver<SessionCommand>) {
    let mut backoff = Backoff::new(engine.shared.options.reconnect);
    let mut next_poll = Instant::now() + engine.shared.settings.sync_interval();

    loop {
        engine.set_status(SyncStatus::Connecting);

        let Some(opened) = engine.open_channel(&mut next_poll, &mut commands).await else {
            break;
        };

        match opened {
            Ok(channel) => {
                engine.on_channel_open();
                backoff.reset();
                if let Flow::Shutdown = engine.pump(channel, &mut commands).await {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to open push channel: {}", e);
                engine.set_connected(false);
            }
        }

        engine.set_status(SyncStatus::Disconnected);

        let delay = backoff.next_delay();
        debug!("Reconnecting in {:?}", delay);
        if let Flow::Shutdown = engine
            .wait_for_reconnect(delay, &mut next_poll, &mut commands)
            .await
        {
            break;
        }
    }

    engine.set_status(SyncStatus::Disconnected);
    engine.set_connected(false);
    info!("Sync session stopped");
}

/// Outbound worker: one HTTP mutation at a time, in submission order
async fn run_outbound(engine: SyncEngine, mut queue: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = queue.recv().await {
        match message {
            Outbound::Op(op) => engine.deliver(op).await,
            Outbound::Replay => {
                let ops = engine.outbox().take();
                for op in ops {
                    engine.deliver(op).await;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    debug!("Outbound worker stopped");
}

/// Running engine tasks
///
/// `shutdown` stops them in order and waits. Dropping the handle instead
/// aborts both tasks on the spot.
pub struct SyncHandle {
    commands: mpsc::Sender<SessionCommand>,
    outbound: mpsc::UnboundedSender<Outbound>,
    session: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Stop reconnecting, flush queued operations, and join both tasks
    pub async fn shutdown(mut self) {
        info!("Shutting down sync engine");

        let _ = self.commands.send(SessionCommand::Shutdown).await;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.await {
                warn!("Sync session ended abnormally: {}", e);
            }
        }

        let _ = self.outbound.send(Outbound::Shutdown);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Outbound worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        for task in [self.session.take(), self.worker.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::{Call, FakeRemote};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn fast_options() -> SyncOptions {
        SyncOptions {
            reconnect: ReconnectPolicy::fixed(Duration::from_millis(20)),
            ..SyncOptions::default()
        }
    }

    fn engine_with(remote: &Arc<FakeRemote>, options: SyncOptions) -> SyncEngine {
        let repo = Arc::new(ItemRepository::open_in_memory().unwrap());
        SyncEngine::new(
            repo,
            Arc::clone(remote) as Arc<dyn Remote>,
            Arc::new(Config::default()),
            options,
        )
    }

    fn engine_with_items(remote: &Arc<FakeRemote>, items: &[Item]) -> SyncEngine {
        let engine = engine_with(remote, fast_options());
        engine.shared.repo.insert_many(items).unwrap();
        engine
    }

    /// Poll `condition` until it holds or the test times out
    async fn eventually(condition: impl Fn() -> bool) {
        let result = tokio::time::timeout(TIMEOUT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "Condition not met within {:?}", TIMEOUT);
    }

    async fn within<T>(future: impl Future<Output = T>) -> T {
        tokio::time::timeout(TIMEOUT, future)
            .await
            .expect("Timed out")
    }

    fn counter_observer(engine: &SyncEngine) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        engine.register_observer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    fn opens(calls: &[Call]) -> usize {
        calls.iter().filter(|c| **c == Call::Open).count()
    }

    #[tokio::test]
    async fn test_update_is_visible_before_remote_is_called() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let view = engine.live_view();

        let item = engine.add("Milk").await.unwrap();

        assert_eq!(view.latest(), vec![item.clone()]);
        assert_eq!(engine.items(), vec![item.clone()]);
        assert!(remote.calls().is_empty());

        // Queued before start, sent once the worker runs
        let handle = engine.start().unwrap();
        remote
            .wait_for(|calls| calls.contains(&Call::Update(item.clone())))
            .await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_snapshot_replaces_local_state() {
        let remote = Arc::new(FakeRemote::new());
        let a = Item::new("A");
        let engine = engine_with_items(&remote, &[a.clone()]);
        let channel = remote.push_channel();
        let handle = engine.start().unwrap();

        let a_checked = a.with_checked(true);
        let b = Item::new("B");
        let snapshot: Snapshot = vec![a_checked.clone(), b.clone()].into_iter().collect();
        channel.send(ChannelEvent::Snapshot(snapshot)).await.unwrap();

        eventually(|| engine.items().len() == 2 && engine.items().contains(&a_checked)).await;
        let items = engine.items();
        assert!(items.contains(&b));
        assert!(!items.contains(&a));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_checked_is_local_first_and_always_sent() {
        let remote = Arc::new(FakeRemote::new());
        remote.fail_deletes(true);
        let a = Item::new("A").with_checked(true);
        let b = Item::new("B");
        let engine = engine_with_items(&remote, &[a, b.clone()]);
        let handle = engine.start().unwrap();

        let removed = engine.delete_checked().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.items(), vec![b]);

        remote
            .wait_for(|calls| calls.contains(&Call::DeleteChecked))
            .await;
        eventually(|| engine.pending_outbound() == 1).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_all_clears_local_list() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with_items(&remote, &[Item::new("A"), Item::new("B")]);
        let handle = engine.start().unwrap();

        assert_eq!(engine.delete_all().await.unwrap(), 2);
        assert!(engine.items().is_empty());
        remote.wait_for(|calls| calls.contains(&Call::DeleteAll)).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_channel_loss_flips_connectivity_and_reconnects() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let mut connectivity = engine.subscribe_connectivity();
        let channel = remote.push_channel();
        let handle = engine.start().unwrap();

        within(connectivity.wait_for(|connected| *connected))
            .await
            .unwrap();
        assert_eq!(engine.status(), SyncStatus::Connected);

        channel
            .send(ChannelEvent::Lost(RemoteError::Closed { reason: None }))
            .await
            .unwrap();

        within(connectivity.wait_for(|connected| !*connected))
            .await
            .unwrap();
        remote.wait_for(|calls| opens(calls) >= 2).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_channel_counts_as_loss() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let mut connectivity = engine.subscribe_connectivity();
        let channel = remote.push_channel();
        let handle = engine.start().unwrap();

        within(connectivity.wait_for(|connected| *connected))
            .await
            .unwrap();
        drop(channel);
        within(connectivity.wait_for(|connected| !*connected))
            .await
            .unwrap();

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_apply_snapshot_is_idempotent() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with_items(&remote, &[Item::new("Local only")]);
        let snapshot: Snapshot = vec![Item::new("Tea"), Item::new("Honey")]
            .into_iter()
            .collect();

        engine.apply_snapshot(snapshot.clone()).await.unwrap();
        let once = engine.items();
        engine.apply_snapshot(snapshot).await.unwrap();
        assert_eq!(engine.items(), once);
        assert_eq!(once.len(), 2);
    }

    #[tokio::test]
    async fn test_each_observer_notified_once_per_snapshot() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let counters: Vec<_> = (0..3).map(|_| counter_observer(&engine)).collect();

        engine.apply_snapshot(Snapshot::new()).await.unwrap();

        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_unregistered_observer_not_notified() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = engine.register_observer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(engine.unregister_observer(id));
        engine.add("Cheese").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connectivity_flip_notifies_observers() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let calls = counter_observer(&engine);
        let _channel = remote.push_channel();
        let handle = engine.start().unwrap();

        eventually(|| engine.is_connected()).await;
        assert!(calls.load(Ordering::SeqCst) >= 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_older_snapshot_reverts_under_server_wins() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let id = Uuid::new_v4();
        let newer: Snapshot = vec![Item::with_id(id, "Newer", true, 200)].into_iter().collect();
        let older: Snapshot = vec![Item::with_id(id, "Older", false, 100)].into_iter().collect();

        engine.apply_snapshot(newer).await.unwrap();
        engine.apply_snapshot(older).await.unwrap();

        assert_eq!(engine.items()[0].content, "Older");
    }

    #[tokio::test]
    async fn test_older_snapshot_ignored_under_newest_timestamp() {
        let remote = Arc::new(FakeRemote::new());
        let options = SyncOptions {
            conflict_policy: ConflictPolicy::NewestTimestamp,
            ..fast_options()
        };
        let engine = engine_with(&remote, options);
        let id = Uuid::new_v4();
        let newer: Snapshot = vec![Item::with_id(id, "Newer", true, 200)].into_iter().collect();
        let older: Snapshot = vec![Item::with_id(id, "Older", false, 100)].into_iter().collect();

        engine.apply_snapshot(newer).await.unwrap();
        engine.apply_snapshot(older).await.unwrap();

        assert_eq!(engine.items()[0].content, "Newer");
    }

    #[tokio::test]
    async fn test_failed_update_replayed_after_reconnect() {
        let remote = Arc::new(FakeRemote::new());
        remote.fail_updates(true);
        let engine = engine_with(&remote, fast_options());
        let handle = engine.start().unwrap();

        let item = engine.add("Coffee").await.unwrap();
        eventually(|| engine.pending_outbound() == 1).await;

        remote.fail_updates(false);
        let _channel = remote.push_channel();

        remote
            .wait_for(|calls| {
                calls
                    .iter()
                    .filter(|c| **c == Call::Update(item.clone()))
                    .count()
                    >= 2
            })
            .await;
        eventually(|| engine.pending_outbound() == 0).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_updates() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let handle = engine.start().unwrap();

        let item = engine.add("Butter").await.unwrap();
        handle.shutdown().await;

        assert!(remote.calls().contains(&Call::Update(item)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconnects() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let handle = engine.start().unwrap();

        remote.wait_for(|calls| opens(calls) >= 2).await;
        handle.shutdown().await;
        let after_shutdown = remote.count(|c| *c == Call::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(remote.count(|c| *c == Call::Open), after_shutdown);
        assert_eq!(engine.status(), SyncStatus::Disconnected);
        assert!(!engine.is_connected());
    }

    #[tokio::test]
    async fn test_fallback_poll_while_channel_down() {
        let remote = Arc::new(FakeRemote::new());
        let item = Item::new("Rice");
        remote.set_fetch(Some(vec![item.clone()].into_iter().collect()));
        // Long reconnect delay so polls, not open attempts, drive connectivity
        let options = SyncOptions {
            reconnect: ReconnectPolicy::fixed(Duration::from_secs(60)),
            ..SyncOptions::default()
        };
        let engine = engine_with(&remote, options);
        let handle = engine.start().unwrap();

        eventually(|| engine.is_connected()).await;
        assert_eq!(engine.items(), vec![item]);
        assert_ne!(engine.status(), SyncStatus::Connected);

        remote.set_fetch(None);
        eventually(|| !engine.is_connected()).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_polls_while_handshake_hangs() {
        let remote = Arc::new(FakeRemote::new());
        remote.hang_opens(true);
        let item = Item::new("Oats");
        remote.set_fetch(Some(vec![item.clone()].into_iter().collect()));
        let options = SyncOptions {
            connect_timeout: Duration::from_secs(60),
            ..fast_options()
        };
        let engine = engine_with(&remote, options);
        let handle = engine.start().unwrap();

        remote.wait_for(|calls| calls.contains(&Call::Fetch)).await;
        eventually(|| engine.is_connected() && engine.items() == vec![item.clone()]).await;
        assert_eq!(engine.status(), SyncStatus::Connecting);
        assert_eq!(remote.count(|c| *c == Call::Open), 1);

        handle.shutdown().await;
        assert_eq!(engine.status(), SyncStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_hung_handshake_times_out_and_retries() {
        let remote = Arc::new(FakeRemote::new());
        remote.hang_opens(true);
        let options = SyncOptions {
            connect_timeout: Duration::from_millis(100),
            ..fast_options()
        };
        let engine = engine_with(&remote, options);
        let handle = engine.start().unwrap();

        remote.wait_for(|calls| opens(calls) >= 2).await;
        assert!(!engine.is_connected());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_successful_poll_replays_outbox() {
        let remote = Arc::new(FakeRemote::new());
        remote.fail_updates(true);
        // Channel never opens; only polls can bring the server back
        let options = SyncOptions {
            reconnect: ReconnectPolicy::fixed(Duration::from_secs(60)),
            ..SyncOptions::default()
        };
        let engine = engine_with(&remote, options);
        let handle = engine.start().unwrap();

        let item = engine.add("Tea").await.unwrap();
        eventually(|| engine.pending_outbound() == 1).await;

        remote.fail_updates(false);
        remote.set_fetch(Some(vec![item.clone()].into_iter().collect()));

        remote
            .wait_for(|calls| {
                calls
                    .iter()
                    .filter(|c| **c == Call::Update(item.clone()))
                    .count()
                    >= 2
            })
            .await;
        eventually(|| engine.pending_outbound() == 0).await;
        assert_eq!(remote.count(|c| *c == Call::Open), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_fetches_while_connected() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());
        let _channel = remote.push_channel();
        let handle = engine.start().unwrap();
        eventually(|| engine.is_connected()).await;

        let item = Item::new("Salt");
        remote.set_fetch(Some(vec![item.clone()].into_iter().collect()));
        engine.refresh();

        remote.wait_for(|calls| calls.contains(&Call::Fetch)).await;
        eventually(|| engine.items() == vec![item.clone()]).await;
        assert!(engine.is_connected());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let remote = Arc::new(FakeRemote::new());
        let engine = engine_with(&remote, fast_options());

        let handle = engine.start().unwrap();
        assert!(matches!(engine.start(), Err(SyncError::AlreadyRunning)));
        handle.shutdown().await;
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            conflict_policy: ConflictPolicy::NewestTimestamp,
            reconnect_delay_secs: 3,
            ..Config::default()
        };
        let options = SyncOptions::from_config(&config);
        assert_eq!(options.conflict_policy, ConflictPolicy::NewestTimestamp);
        assert_eq!(options.reconnect.initial, Duration::from_secs(3));
    }
}
