//! Readvertise destinations.
//!
//! A destination mirrors the forwarder's announced prefixes into some external
//! registration system. Each prefix has its own row with a desired status and
//! a retry controller; a single loop per destination performs the one-shot
//! advertise/withdraw operations of the [`AdvertiseBackend`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ndnfw_core::Name;

use crate::config::RetryOptions;
use crate::face::PrefixAnnouncementObj;
use crate::forwarder::{Forwarder, ForwarderInner};
use crate::readvertise::Destination;
use crate::retry::RetryState;
use crate::util::lock;

static NEXT_DESTINATION_ID: AtomicUsize = AtomicUsize::new(1);

/// External registration operations of one destination.
#[async_trait]
pub trait AdvertiseBackend: Send + Sync + 'static {
    /// Per-prefix state, created once when the prefix gets a table row.
    type State: Send + Sync + 'static;

    fn make_state(&self, name: &Name) -> Self::State;

    async fn do_advertise(
        &self,
        name: &Name,
        state: &Self::State,
        source: &AnnouncementSource,
    ) -> anyhow::Result<()>;

    async fn do_withdraw(&self, name: &Name, state: &Self::State) -> anyhow::Result<()>;
}

/// Read access to the announcement objects held by the forwarder.
#[derive(Debug, Clone, Default)]
pub struct AnnouncementSource {
    fw: Option<Weak<ForwarderInner>>,
}

impl AnnouncementSource {
    pub fn list_announcement_objs(&self, name: &Name) -> Vec<Arc<dyn PrefixAnnouncementObj>> {
        match self.fw.as_ref().and_then(Weak::upgrade) {
            Some(fw) => lock(&fw.state).readvertise.list_announcement_objs(name),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStatus {
    Advertising,
    Advertised,
    Withdrawing,
    /// The prefix has no row.
    Withdrawn,
}

struct Record<S> {
    status: DestinationStatus,
    state: Arc<S>,
    /// Bumped on every restart; stale retry timers compare against it.
    epoch: u64,
    retry: RetryState,
}

struct DestinationTable<S> {
    records: HashMap<Name, Record<S>>,
    queue: Option<mpsc::UnboundedSender<Name>>,
    closed: bool,
    epoch: u64,
}

struct DestinationInner<B: AdvertiseBackend> {
    id: usize,
    backend: B,
    retry: RetryOptions,
    table: Mutex<DestinationTable<B::State>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Name>>>,
    fw: Mutex<Option<Weak<ForwarderInner>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Retrying advertise/withdraw state machine driving one backend.
pub struct ReadvertiseDestination<B: AdvertiseBackend> {
    inner: Arc<DestinationInner<B>>,
}

impl<B: AdvertiseBackend> Clone for ReadvertiseDestination<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: AdvertiseBackend> ReadvertiseDestination<B> {
    pub fn new(backend: B, retry: RetryOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(DestinationInner {
                id: NEXT_DESTINATION_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                retry,
                table: Mutex::new(DestinationTable {
                    records: HashMap::new(),
                    queue: Some(tx),
                    closed: false,
                    epoch: 0,
                }),
                rx: Mutex::new(Some(rx)),
                fw: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Subscribe to the forwarder's announcements, advertise every currently
    /// announced prefix and start processing. Must be called inside a tokio
    /// runtime. A destination can be enabled once.
    pub fn enable(&self, fw: &Forwarder) {
        let Some(rx) = lock(&self.inner.rx).take() else {
            warn!("readvertise destination {} is already enabled", self.inner.id);
            return;
        };
        if fw.is_closed() {
            warn!("readvertise destination {} not enabled: forwarder closed", self.inner.id);
            return;
        }
        *lock(&self.inner.fw) = Some(Arc::downgrade(&fw.inner));

        {
            let mut state = lock(&fw.inner.state);
            let dest: Arc<dyn Destination> = self.inner.clone();
            state.readvertise.add_destination(dest);
            for name in state.readvertise.announced_names() {
                self.inner.advertise(&name);
            }
        }

        let task = tokio::spawn(process_loop(Arc::downgrade(&self.inner), rx));
        *lock(&self.inner.task) = Some(task);
        info!("readvertise destination {} enabled", self.inner.id);
    }

    /// Withdraw every prefix once and stop. No retry happens afterwards.
    pub fn disable(&self) {
        Destination::disable(&*self.inner);
    }

    pub fn advertise(&self, name: &Name) {
        self.inner.advertise(name);
    }

    pub fn withdraw(&self, name: &Name) {
        self.inner.withdraw(name);
    }

    pub fn status(&self, name: &Name) -> DestinationStatus {
        lock(&self.inner.table)
            .records
            .get(name)
            .map_or(DestinationStatus::Withdrawn, |record| record.status)
    }

    /// Prefixes that currently have a row, sorted.
    pub fn names(&self) -> Vec<Name> {
        let mut names: Vec<_> = lock(&self.inner.table).records.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.table).closed
    }
}

impl<B: AdvertiseBackend> std::fmt::Debug for ReadvertiseDestination<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = lock(&self.inner.table);
        f.debug_struct("ReadvertiseDestination")
            .field("id", &self.inner.id)
            .field("records", &table.records.len())
            .field("closed", &table.closed)
            .finish()
    }
}

impl<B: AdvertiseBackend> DestinationInner<B> {
    fn set_status(&self, name: &Name, status: DestinationStatus) {
        let mut table = lock(&self.table);
        if table.closed {
            return;
        }
        match status {
            DestinationStatus::Advertising => {
                if !table.records.contains_key(name) {
                    let state = Arc::new(self.backend.make_state(name));
                    table.records.insert(
                        name.clone(),
                        Record {
                            status,
                            state,
                            epoch: 0,
                            retry: RetryState::default(),
                        },
                    );
                }
            }
            _ => {
                if !table.records.contains_key(name) {
                    return;
                }
            }
        }
        if let Some(record) = table.records.get_mut(name) {
            record.status = status;
        }
        restart(&mut table, name);
    }

    fn requeue(&self, name: &Name, epoch: u64) {
        let table = lock(&self.table);
        if table.closed {
            return;
        }
        let current = table.records.get(name).map(|record| record.epoch);
        if current != Some(epoch) {
            return;
        }
        if let Some(queue) = &table.queue {
            let _ = queue.send(name.clone());
        }
    }

    async fn process(self: &Arc<Self>, name: &Name) {
        let (status, state, epoch) = {
            let table = lock(&self.table);
            let Some(record) = table.records.get(name) else {
                return;
            };
            (record.status, Arc::clone(&record.state), record.epoch)
        };

        let result = match status {
            DestinationStatus::Advertising => {
                let source = AnnouncementSource {
                    fw: lock(&self.fw).clone(),
                };
                self.backend.do_advertise(name, &state, &source).await
            }
            DestinationStatus::Withdrawing => self.backend.do_withdraw(name, &state).await,
            DestinationStatus::Advertised | DestinationStatus::Withdrawn => return,
        };

        let mut table = lock(&self.table);
        let closed = table.closed;
        let Some(record) = table.records.get_mut(name) else {
            return;
        };
        match result {
            Ok(()) => {
                if record.status != status {
                    debug!("{} on destination {} superseded", name, self.id);
                    return;
                }
                record.retry.stop();
                if status == DestinationStatus::Advertising {
                    record.status = DestinationStatus::Advertised;
                    info!("advertised {} on destination {}", name, self.id);
                } else {
                    table.records.remove(name);
                    info!("withdrawn {} on destination {}", name, self.id);
                }
            }
            Err(err) => {
                warn!("{:?} {} on destination {} failed: {:#}", status, name, self.id, err);
                if closed || record.epoch != epoch {
                    return;
                }
                let Some(delay) = record.retry.next_delay(&self.retry) else {
                    warn!("giving up on {} for destination {}", name, self.id);
                    return;
                };
                debug!(
                    "retry #{} of {} on destination {} in {:?}",
                    record.retry.attempts(),
                    name,
                    self.id,
                    delay
                );
                let weak = Arc::downgrade(self);
                let timer_name = name.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.requeue(&timer_name, epoch);
                    }
                });
                record.retry.arm(timer);
            }
        }
    }
}

/// Reset the retry controller of `name` and queue it for processing.
fn restart<S>(table: &mut DestinationTable<S>, name: &Name) {
    table.epoch += 1;
    let epoch = table.epoch;
    if let Some(record) = table.records.get_mut(name) {
        record.retry.stop();
        record.epoch = epoch;
    }
    if let Some(queue) = &table.queue {
        let _ = queue.send(name.clone());
    }
}

impl<B: AdvertiseBackend> Destination for DestinationInner<B> {
    fn id(&self) -> usize {
        self.id
    }

    fn advertise(&self, name: &Name) {
        self.set_status(name, DestinationStatus::Advertising);
    }

    fn withdraw(&self, name: &Name) {
        self.set_status(name, DestinationStatus::Withdrawing);
    }

    fn disable(&self) {
        let fw = lock(&self.fw).take().and_then(|fw| fw.upgrade());
        if let Some(fw) = fw {
            lock(&fw.state).readvertise.remove_destination(self.id);
        }

        let mut table = lock(&self.table);
        if table.closed {
            return;
        }
        table.closed = true;
        let queue = table.queue.take();
        for (name, record) in table.records.iter_mut() {
            record.status = DestinationStatus::Withdrawing;
            record.retry.stop();
            if let Some(queue) = &queue {
                let _ = queue.send(name.clone());
            }
        }
        info!("readvertise destination {} disabled", self.id);
    }
}

async fn process_loop<B: AdvertiseBackend>(
    inner: Weak<DestinationInner<B>>,
    mut rx: mpsc::UnboundedReceiver<Name>,
) {
    while let Some(name) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.process(&name).await;
    }
    debug!("readvertise destination queue closed");
}
