//! Scriptable [`Remote`] for engine tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{ChannelEvent, PushChannel, Remote, RemoteError};
use crate::models::{Item, Snapshot};

/// How long `wait_for` waits before failing the test
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A call the engine made
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Update(Item),
    DeleteChecked,
    DeleteAll,
    Fetch,
    Open,
}

pub(crate) struct FakeRemote {
    calls: Mutex<Vec<Call>>,
    call_count: watch::Sender<usize>,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    hang_opens: AtomicBool,
    fetch: Mutex<Option<Snapshot>>,
    channels: Mutex<VecDeque<mpsc::Receiver<ChannelEvent>>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        Self {
            calls: Mutex::new(Vec::new()),
            call_count,
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            hang_opens: AtomicBool::new(false),
            fetch: Mutex::new(None),
            channels: Mutex::new(VecDeque::new()),
        }
    }

    /// Script the next successful `open_push_channel`
    ///
    /// With nothing scripted, opening fails.
    pub(crate) fn push_channel(&self) -> mpsc::Sender<ChannelEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.channels.lock().unwrap().push_back(rx);
        tx
    }

    /// Snapshot returned by `fetch_snapshot`; `None` makes fetching fail
    pub(crate) fn set_fetch(&self, snapshot: Option<Snapshot>) {
        *self.fetch.lock().unwrap() = snapshot;
    }

    pub(crate) fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make `open_push_channel` never resolve, like a server that accepts
    /// the connection and then goes quiet
    pub(crate) fn hang_opens(&self, hang: bool) {
        self.hang_opens.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    /// Wait until the recorded calls satisfy `done`
    pub(crate) async fn wait_for(&self, done: impl Fn(&[Call]) -> bool) {
        let mut rx = self.call_count.subscribe();
        let result = tokio::time::timeout(WAIT_TIMEOUT, async {
            loop {
                if done(&self.calls.lock().unwrap()) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        assert!(result.is_ok(), "Timed out; calls so far: {:?}", self.calls());
    }

    fn record(&self, call: Call) {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };
        self.call_count.send_replace(count);
    }

    fn scripted_failure(endpoint: &str) -> RemoteError {
        RemoteError::Status {
            endpoint: endpoint.to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl Remote for FakeRemote {
    async fn apply_update(&self, item: &Item) -> Result<(), RemoteError> {
        self.record(Call::Update(item.clone()));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::scripted_failure("update"));
        }
        Ok(())
    }

    async fn delete_checked(&self) -> Result<(), RemoteError> {
        self.record(Call::DeleteChecked);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::scripted_failure("delete-checked"));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), RemoteError> {
        self.record(Call::DeleteAll);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::scripted_failure("delete-all"));
        }
        Ok(())
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot, RemoteError> {
        self.record(Call::Fetch);
        self.fetch
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Self::scripted_failure("current"))
    }

    async fn open_push_channel(&self) -> Result<PushChannel, RemoteError> {
        self.record(Call::Open);
        if self.hang_opens.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let next = self.channels.lock().unwrap().pop_front();
        match next {
            Some(rx) => Ok(PushChannel::new(rx, None)),
            None => Err(Self::scripted_failure("ws")),
        }
    }
}
