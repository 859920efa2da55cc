//! The follow graph, its derived indices, and the five action primitives
//! that resolve an event to a set of recipient queues.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinSet;

use crate::error::SubscribeError;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// A bounded FIFO of raw wire lines owned by one subscription.
///
/// Identity is a monotonic id rather than sender-pointer identity, so
/// subscribe's "already present" check is stable regardless of how the
/// channel handle is cloned or boxed.
#[derive(Clone)]
pub struct Queue {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

impl Queue {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Queue {}

impl std::hash::Hash for Queue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Delivery mode fixed at Router construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Full queue blocks the dispatcher until the recipient drains.
    Backpressure,
    /// Full queue drops the message for that recipient only.
    NoBackpressure,
}

struct RouterState {
    graph: HashMap<i64, HashSet<i64>>,
    clients: HashMap<i64, HashSet<Queue>>,
    followers_cache: HashMap<i64, HashSet<Queue>>,
    all: HashSet<Queue>,
    done_tx: broadcast::Sender<()>,
}

impl RouterState {
    fn new() -> Self {
        let (done_tx, _) = broadcast::channel(1);
        Self {
            graph: HashMap::new(),
            clients: HashMap::new(),
            followers_cache: HashMap::new(),
            all: HashSet::new(),
            done_tx,
        }
    }
}

pub struct Router {
    state: RwLock<RouterState>,
    mode: DeliveryMode,
}

impl Router {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            state: RwLock::new(RouterState::new()),
            mode,
        }
    }

    /// Subscribe `queue` under `user_id`. Fails if `queue` is already
    /// present in `all` under a different subscription.
    pub async fn subscribe(
        self: &Arc<Self>,
        user_id: i64,
        queue: Queue,
    ) -> Result<(UnsubscribeHandle, broadcast::Receiver<()>), SubscribeError> {
        let mut state = self.state.write().await;
        if state.all.contains(&queue) {
            return Err(SubscribeError::AlreadySubscribed);
        }
        state.all.insert(queue.clone());
        state
            .clients
            .entry(user_id)
            .or_default()
            .insert(queue.clone());
        if let Some(followed) = state.graph.get(&user_id).cloned() {
            for v in followed {
                state.followers_cache.entry(v).or_default().insert(queue.clone());
            }
        }
        let done_rx = state.done_tx.subscribe();
        drop(state);

        let handle = UnsubscribeHandle {
            router: Arc::clone(self),
            user_id,
            queue,
            done: AtomicBool::new(false),
        };
        Ok((handle, done_rx))
    }

    async fn unsubscribe(&self, user_id: i64, queue: &Queue) {
        let mut state = self.state.write().await;
        state.all.remove(queue);
        if let Some(set) = state.clients.get_mut(&user_id) {
            set.remove(queue);
            if set.is_empty() {
                state.clients.remove(&user_id);
            }
        }
        if let Some(followed) = state.graph.get(&user_id).cloned() {
            for v in followed {
                if let Some(set) = state.followers_cache.get_mut(&v) {
                    set.remove(queue);
                    if set.is_empty() {
                        state.followers_cache.remove(&v);
                    }
                }
            }
        }
    }

    pub async fn follow(&self, a: i64, b: i64) {
        let mut state = self.state.write().await;
        state.graph.entry(a).or_default().insert(b);
        if let Some(queues) = state.clients.get(&a).cloned() {
            if !queues.is_empty() {
                state.followers_cache.entry(b).or_default().extend(queues);
            }
        }
    }

    pub async fn unfollow(&self, a: i64, b: i64) {
        let mut state = self.state.write().await;
        if let Some(set) = state.graph.get_mut(&a) {
            set.remove(&b);
            if set.is_empty() {
                state.graph.remove(&a);
            }
        }
        if let Some(queues) = state.clients.get(&a).cloned() {
            if let Some(set) = state.followers_cache.get_mut(&b) {
                for q in &queues {
                    set.remove(q);
                }
                if set.is_empty() {
                    state.followers_cache.remove(&b);
                }
            }
        }
    }

    pub async fn send_msg(&self, user_id: i64, line: Bytes) {
        let state = self.state.read().await;
        let recipients: Vec<Queue> = state
            .clients
            .get(&user_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        self.deliver(recipients, line).await;
    }

    pub async fn send_to_followers(&self, user_id: i64, line: Bytes) {
        let state = self.state.read().await;
        let recipients: Vec<Queue> = state
            .followers_cache
            .get(&user_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        self.deliver(recipients, line).await;
    }

    pub async fn broadcast(&self, line: Bytes) {
        let state = self.state.read().await;
        let recipients: Vec<Queue> = state.all.iter().cloned().collect();
        self.deliver(recipients, line).await;
    }

    /// Deliver `line` to every queue in `recipients` per the configured
    /// delivery mode. Callers hold their read-lock guard across this call,
    /// so in backpressure mode a full recipient queue blocks the shared
    /// lock for as long as the enqueue takes — the trade §4.2 requires.
    async fn deliver(&self, recipients: Vec<Queue>, line: Bytes) {
        match self.mode {
            DeliveryMode::NoBackpressure => {
                for q in &recipients {
                    let _ = q.tx.try_send(line.clone());
                }
            }
            DeliveryMode::Backpressure => match recipients.len() {
                0 => {}
                1 => {
                    let _ = recipients[0].tx.send(line).await;
                }
                _ => {
                    let mut set = JoinSet::new();
                    for q in recipients {
                        let line = line.clone();
                        let tx = q.tx.clone();
                        set.spawn(async move {
                            let _ = tx.send(line).await;
                        });
                    }
                    while set.join_next().await.is_some() {}
                }
            },
        }
    }

    /// Clear the follow graph and every derived index, and replace the
    /// done signal so every currently-subscribed forwarder observes a
    /// close on its next poll. Live subscriptions themselves are left in
    /// place — only the graph-derived state is wiped.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.graph.clear();
        state.followers_cache.clear();
        let (done_tx, _) = broadcast::channel(1);
        state.done_tx = done_tx;
    }
}

/// Idempotent cleanup token returned by [`Router::subscribe`].
pub struct UnsubscribeHandle {
    router: Arc<Router>,
    user_id: i64,
    queue: Queue,
    done: AtomicBool,
}

impl UnsubscribeHandle {
    /// Remove this subscription from every index. A second call is a
    /// no-op, from this handle or a previous run of it.
    pub async fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.router.unsubscribe(self.user_id, &self.queue).await;
    }
}
