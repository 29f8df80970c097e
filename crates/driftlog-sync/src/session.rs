//! Head-exchange sync session for a log.
//!
//! A session subscribes to the pubsub topic named after the log id. When a
//! new peer appears on the topic, both sides dial each other on the
//! `/heads/<log id>` protocol and exchange their current heads, which are
//! merged into the local log. Merging a head whose ancestors are missing
//! locally triggers gap repair: the worker asks the same peer for the
//! missing entries by hash until the history behind the head is complete.
//! Entries appended afterwards propagate by broadcast on the same topic.
//!
//! All merges into the log, topic events and dialed-in head exchanges
//! alike, are funneled through a single worker task, so entries are joined
//! one at a time.

use crate::error::{Result, SyncError};
use crate::transport::{PeerId, StreamHandler, Transport, TransportEvent};
use async_trait::async_trait;
use driftlog_entry::{Entry, Hash};
use driftlog_log::Log;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Configuration for a sync session.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// How long to wait for a head exchange dial to complete.
    pub dial_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
        }
    }
}

/// Events emitted by a sync session.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// Completed a head exchange with a peer for the first time.
    Join { peer: PeerId, heads: Vec<Entry> },

    /// A previously joined peer left the topic.
    Leave { peer: PeerId },

    /// A non-fatal protocol error. The session keeps running.
    Error(String),
}

/// A request on the `/heads/<log id>` protocol. The response to either
/// variant is a plain list of encoded entries.
#[derive(Serialize, Deserialize)]
enum SyncRequest {
    /// The dialer's current heads, answered with ours.
    Heads(Vec<Vec<u8>>),

    /// Entries the dialer is missing, answered with those we have.
    Want(Vec<Hash>),
}

/// Work items for the session worker.
enum Job {
    /// A peer dialed us with its heads.
    Inbound {
        from: PeerId,
        heads: Vec<Entry>,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },

    /// An outbound head exchange completed.
    Dialed {
        peer: PeerId,
        result: Result<Vec<Entry>>,
    },
}

/// Answers dials on the head-exchange protocol.
///
/// Want requests are read-only and served directly from the log; head
/// exchanges mutate it and are forwarded to the worker. Serving wants
/// without the worker matters: the worker dials them out while merging,
/// and two peers repairing from each other would otherwise wait on each
/// other's busy worker.
struct ExchangeHandler {
    log: Arc<Log>,
    jobs: mpsc::Sender<Job>,
}

#[async_trait]
impl StreamHandler for ExchangeHandler {
    async fn handle(&self, from: &PeerId, request: Vec<u8>) -> Result<Vec<u8>> {
        match decode_request(&request)? {
            SyncRequest::Heads(frames) => {
                let heads = decode_frames(&frames)?;
                let (reply_tx, reply_rx) = oneshot::channel();
                self.jobs
                    .send(Job::Inbound {
                        from: from.clone(),
                        heads,
                        reply: reply_tx,
                    })
                    .await
                    .map_err(|_| SyncError::NotRunning)?;
                reply_rx.await.map_err(|_| SyncError::NotRunning)?
            }
            SyncRequest::Want(hashes) => {
                let mut found = Vec::new();
                for hash in &hashes {
                    if let Some(entry) = self.log.get(hash).await? {
                        found.push(entry);
                    }
                }
                Ok(encode_entries(&found))
            }
        }
    }
}

/// Synchronizes a [`Log`] with other replicas over a [`Transport`].
pub struct SyncSession<T: Transport> {
    log: Arc<Log>,
    transport: Arc<T>,
    options: SyncOptions,
    topic: String,
    protocol: String,
    events: broadcast::Sender<SyncEvent>,
    peers: Arc<Mutex<HashSet<PeerId>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> SyncSession<T> {
    /// Create a session for a log. Call [`SyncSession::start`] to begin
    /// exchanging entries.
    pub fn new(log: Arc<Log>, transport: Arc<T>, options: SyncOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        let topic = log.id().to_string();
        let protocol = format!("/heads/{}", log.id());
        Self {
            log,
            transport,
            options,
            topic,
            protocol,
            events,
            peers: Arc::new(Mutex::new(HashSet::new())),
            worker: Mutex::new(None),
        }
    }

    /// The pubsub topic this session uses, which is the log id.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Peers a head exchange has completed with.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.lock().iter().cloned().collect();
        peers.sort();
        peers
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Start the session: register the exchange handler, join the topic,
    /// and spawn the worker. Idempotent while running.
    pub async fn start(&self) -> Result<()> {
        if self.worker.lock().is_some() {
            return Ok(());
        }

        let (job_tx, job_rx) = mpsc::channel(64);
        self.transport
            .register_handler(
                &self.protocol,
                Arc::new(ExchangeHandler {
                    log: self.log.clone(),
                    jobs: job_tx.clone(),
                }),
            )
            .await?;
        let event_rx = self.transport.subscribe(&self.topic).await?;

        let worker = Worker {
            log: self.log.clone(),
            transport: self.transport.clone(),
            options: self.options.clone(),
            protocol: self.protocol.clone(),
            events: self.events.clone(),
            peers: self.peers.clone(),
            jobs: job_tx,
        };
        let handle = tokio::spawn(worker.run(event_rx, job_rx));
        *self.worker.lock() = Some(handle);

        debug!(topic = %self.topic, "sync session started");
        Ok(())
    }

    /// Stop the session: leave the topic, drop the handler, and wait for
    /// the worker to drain its queue. The session can be started again
    /// afterwards.
    pub async fn stop(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            self.transport.unregister_handler(&self.protocol).await?;
            // Closing the subscription ends the worker's event channel;
            // the worker drains what is already queued and exits.
            self.transport.unsubscribe(&self.topic).await?;
            let _ = handle.await;
            self.peers.lock().clear();
            debug!(topic = %self.topic, "sync session stopped");
        }
        Ok(())
    }

    /// Broadcast a locally appended entry to the topic.
    pub async fn add(&self, entry: &Entry) -> Result<()> {
        self.transport.publish(&self.topic, entry.encode()).await
    }
}

/// The single consumer of all session work.
///
/// Outbound head exchanges run in their own short-lived tasks so that two
/// peers dialing each other at the same time cannot block one another; the
/// results are fed back into the job queue, which keeps every merge into
/// the log on this one task.
struct Worker<T: Transport> {
    log: Arc<Log>,
    transport: Arc<T>,
    options: SyncOptions,
    protocol: String,
    events: broadcast::Sender<SyncEvent>,
    peers: Arc<Mutex<HashSet<PeerId>>>,
    jobs: mpsc::Sender<Job>,
}

impl<T: Transport> Worker<T> {
    async fn run(
        self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut jobs: mpsc::Receiver<Job>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => break,
                },
                job = jobs.recv() => match job {
                    Some(job) => self.on_job(job).await,
                    // The worker holds a sender, so the queue never closes
                    // before the event channel does.
                    None => break,
                },
            }
        }

        // The subscription is gone, but dialed-in exchanges and dial
        // results may already be queued. Answer them before exiting so
        // their reply channels are not dropped mid-exchange.
        while let Ok(job) = jobs.try_recv() {
            self.on_job(job).await;
        }
    }

    async fn on_job(&self, job: Job) {
        match job {
            Job::Inbound { from, heads, reply } => {
                let _ = reply.send(self.on_inbound(&from, heads).await);
            }
            Job::Dialed { peer, result } => match result {
                Ok(heads) => {
                    if let Err(e) = self.merge_heads(&peer, heads).await {
                        self.emit_error(&peer, e);
                    }
                }
                Err(e) => self.emit_error(&peer, e),
            },
        }
    }

    async fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Subscribed { peer, .. } => self.dial(peer),
            TransportEvent::Unsubscribed { peer, .. } => {
                if self.peers.lock().remove(&peer) {
                    debug!(%peer, "peer left");
                    let _ = self.events.send(SyncEvent::Leave { peer });
                }
            }
            TransportEvent::Message { from, data, .. } => {
                let result = async {
                    let entry = Entry::decode(&data)
                        .map_err(|e| SyncError::Decode(e.to_string()))?;
                    self.log.join_entry(entry).await?;
                    Ok(())
                }
                .await;
                if let Err(e) = result {
                    self.emit_error(&from, e);
                }
            }
        }
    }

    /// Dial a newly seen peer with our heads in a detached task and queue
    /// the outcome back to this worker.
    fn dial(&self, peer: PeerId) {
        let log = self.log.clone();
        let transport = self.transport.clone();
        let protocol = self.protocol.clone();
        let jobs = self.jobs.clone();
        let timeout = self.options.dial_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, async {
                let heads = log.heads().await;
                let request = encode_request(&SyncRequest::Heads(
                    heads.iter().map(|e| e.encode()).collect(),
                ));
                let response = transport.dial(&peer, &protocol, request).await?;
                decode_entries(&response)
            })
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SyncError::DialTimeout {
                    peer: peer.to_string(),
                    after: timeout,
                }),
            };
            let _ = jobs.send(Job::Dialed { peer, result }).await;
        });
    }

    /// Answer an inbound head exchange: merge the peer's heads and reply
    /// with the heads we had before the merge.
    async fn on_inbound(&self, from: &PeerId, heads: Vec<Entry>) -> Result<Vec<u8>> {
        let response = encode_entries(&self.log.heads().await);
        self.merge_heads(from, heads).await?;
        Ok(response)
    }

    /// Join a peer's heads, then repair any gaps behind them by asking
    /// that peer for the missing entries.
    async fn merge_heads(&self, peer: &PeerId, heads: Vec<Entry>) -> Result<()> {
        for entry in heads.iter().cloned() {
            self.log.join_entry(entry).await?;
        }

        let mut want = self.missing_parents(&heads).await?;
        while !want.is_empty() {
            let fetched = self.fetch_missing(peer, &want).await?;
            let arrived: HashSet<Hash> = fetched.iter().map(|e| e.hash()).collect();
            if !want.iter().any(|hash| arrived.contains(hash)) {
                // The peer no longer has these entries; stop asking.
                break;
            }
            for entry in fetched.iter().cloned() {
                self.log.join_entry(entry).await?;
            }
            want = self.missing_parents(&fetched).await?;
        }

        // Emit a single join per peer, whichever side's dial lands first.
        if self.peers.lock().insert(peer.clone()) {
            debug!(%peer, heads = heads.len(), "peer joined");
            let _ = self.events.send(SyncEvent::Join {
                peer: peer.clone(),
                heads,
            });
        }
        Ok(())
    }

    /// Hashes referenced by `entries` that are not in local storage.
    async fn missing_parents(&self, entries: &[Entry]) -> Result<Vec<Hash>> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for entry in entries {
            for hash in entry.next.iter().chain(entry.refs.iter()) {
                if seen.insert(*hash) && self.log.get(hash).await?.is_none() {
                    missing.push(*hash);
                }
            }
        }
        Ok(missing)
    }

    async fn fetch_missing(&self, peer: &PeerId, want: &[Hash]) -> Result<Vec<Entry>> {
        let request = encode_request(&SyncRequest::Want(want.to_vec()));
        let timeout = self.options.dial_timeout;
        match tokio::time::timeout(timeout, self.transport.dial(peer, &self.protocol, request))
            .await
        {
            Ok(response) => decode_entries(&response?),
            Err(_) => Err(SyncError::DialTimeout {
                peer: peer.to_string(),
                after: timeout,
            }),
        }
    }

    fn emit_error(&self, peer: &PeerId, error: SyncError) {
        warn!(%peer, %error, "sync error");
        let _ = self
            .events
            .send(SyncEvent::Error(format!("{}: {}", peer, error)));
    }
}

fn encode_request(request: &SyncRequest) -> Vec<u8> {
    postcard::to_allocvec(request).expect("request serialization should not fail")
}

fn decode_request(bytes: &[u8]) -> Result<SyncRequest> {
    postcard::from_bytes(bytes).map_err(|e| SyncError::Decode(e.to_string()))
}

/// Encode a list of entries as a length-delimited frame of entry bytes.
pub(crate) fn encode_entries(entries: &[Entry]) -> Vec<u8> {
    let frames: Vec<Vec<u8>> = entries.iter().map(|e| e.encode()).collect();
    postcard::to_allocvec(&frames).expect("entries frame serialization should not fail")
}

/// Decode an entries frame.
pub(crate) fn decode_entries(bytes: &[u8]) -> Result<Vec<Entry>> {
    let frames: Vec<Vec<u8>> =
        postcard::from_bytes(bytes).map_err(|e| SyncError::Decode(e.to_string()))?;
    decode_frames(&frames)
}

fn decode_frames(frames: &[Vec<u8>]) -> Result<Vec<Entry>> {
    frames
        .iter()
        .map(|frame| Entry::decode(frame).map_err(|e| SyncError::Decode(e.to_string())))
        .collect()
}
