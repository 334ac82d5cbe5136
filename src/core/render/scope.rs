//! Hook state, render sessions and the handle components use to request work.

use crate::store::{Store, StoreChange};
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identity of one logical external event and the renders it causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

pub(crate) type ResourceValue = Arc<dyn Any + Send + Sync>;

/// Work items for a root's render loop.
pub(crate) enum RenderRequest {
    Render,
    /// A component event arrived; memoized resources may be fetched afresh.
    BeginSession,
    ResourceReady {
        session: SessionId,
        key: String,
        value: ResourceValue,
    },
}

impl fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderRequest::Render => f.write_str("Render"),
            RenderRequest::BeginSession => f.write_str("BeginSession"),
            RenderRequest::ResourceReady { session, key, .. } => f
                .debug_struct("ResourceReady")
                .field("session", session)
                .field("key", key)
                .finish(),
        }
    }
}

/// Cloneable sender into a root's render loop.
#[derive(Debug, Clone)]
pub struct RenderRequester {
    tx: mpsc::UnboundedSender<RenderRequest>,
}

impl RenderRequester {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RenderRequest>) -> Self {
        Self { tx }
    }

    fn send(&self, request: RenderRequest) {
        if self.tx.send(request).is_err() {
            debug!("render loop is gone; dropping request");
        }
    }

    pub fn request_render(&self) {
        self.send(RenderRequest::Render);
    }

    pub fn begin_session(&self) {
        self.send(RenderRequest::BeginSession);
    }

    pub(crate) fn resource_ready(&self, session: SessionId, key: String, value: ResourceValue) {
        self.send(RenderRequest::ResourceReady {
            session,
            key,
            value,
        });
    }
}

enum Resource {
    Pending,
    Ready(ResourceValue),
}

/// Per-session memo of async work.
pub(crate) struct Session {
    id: SessionId,
    cache: HashMap<String, Resource>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: SessionId::next(),
            cache: HashMap::new(),
        }
    }
}

/// Everything a root keeps between render passes.
pub(crate) struct RenderState {
    hooks: HashMap<String, Vec<Box<dyn Any + Send>>>,
    session: Session,
    requester: RenderRequester,
    visited: HashSet<String>,
    suspended: Vec<String>,
}

impl RenderState {
    pub(crate) fn new(requester: RenderRequester) -> Self {
        Self {
            hooks: HashMap::new(),
            session: Session::new(),
            requester,
            visited: HashSet::new(),
            suspended: Vec::new(),
        }
    }

    pub(crate) fn session_id(&self) -> SessionId {
        self.session.id
    }

    /// Drops the session memo and starts a fresh one.
    pub(crate) fn begin_session(&mut self) {
        let previous = self.session.id;
        self.session = Session::new();
        debug!(%previous, next = %self.session.id, "render session started");
    }

    /// Stores a finished resource; false when it belongs to a superseded session.
    pub(crate) fn resolve(&mut self, session: SessionId, key: String, value: ResourceValue) -> bool {
        if session != self.session.id {
            debug!(%session, current = %self.session.id, %key, "discarding stale resource");
            return false;
        }
        self.session.cache.insert(key, Resource::Ready(value));
        true
    }

    pub(crate) fn start_pass(&mut self) {
        self.visited.clear();
        self.suspended.clear();
    }

    /// Prunes hooks of components the pass neither visited nor suspended under.
    pub(crate) fn finish_pass(&mut self) {
        let visited = &self.visited;
        let suspended = &self.suspended;
        self.hooks.retain(|path, _| {
            visited.contains(path)
                || suspended.iter().any(|scope| {
                    path.strip_prefix(scope.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
                })
        });
    }

    pub(crate) fn suspended_scopes(&self) -> &[String] {
        &self.suspended
    }

    pub(crate) fn hook_count(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    pub(crate) fn scope(&mut self, path: String) -> Scope<'_> {
        self.visited.insert(path.clone());
        Scope {
            path,
            cursor: 0,
            suspended: false,
            state: self,
        }
    }
}

/// What a component sees while it renders.
///
/// Hooks are identified by call order within the component, so they must be
/// called unconditionally and in the same order on every render.
pub struct Scope<'a> {
    path: String,
    cursor: usize,
    suspended: bool,
    state: &'a mut RenderState,
}

impl Scope<'_> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn session(&self) -> SessionId {
        self.state.session.id
    }

    pub fn requester(&self) -> RenderRequester {
        self.state.requester.clone()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub(crate) fn into_suspended(self) -> bool {
        if self.suspended {
            self.state.suspended.push(self.path.clone());
        }
        self.suspended
    }

    /// Returns a clone of the hook at the cursor, initializing it on first
    /// use or when a different hook type now sits at this position.
    fn slot<T, F>(&mut self, init: F) -> T
    where
        T: Any + Send + Clone,
        F: FnOnce() -> T,
    {
        let index = self.cursor;
        self.cursor += 1;
        let slots = self.state.hooks.entry(self.path.clone()).or_default();
        if let Some(existing) = slots.get(index).and_then(|slot| slot.downcast_ref::<T>()) {
            return existing.clone();
        }
        let value = init();
        if index < slots.len() {
            debug!(path = %self.path, index, "hook order changed; resetting slot");
            slots[index] = Box::new(value.clone());
        } else {
            slots.push(Box::new(value.clone()));
        }
        value
    }

    fn replace_slot<T: Any + Send>(&mut self, index: usize, value: T) {
        if let Some(slot) = self
            .state
            .hooks
            .get_mut(&self.path)
            .and_then(|slots| slots.get_mut(index))
        {
            *slot = Box::new(value);
        }
    }

    /// Local component state. Setting it schedules a re-render of the root.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> State<T>
    where
        T: Clone + Send + 'static,
    {
        let requester = self.state.requester.clone();
        self.slot(|| State {
            cell: Arc::new(Mutex::new(init())),
            requester,
        })
    }

    /// Runs `fetch` once per session and suspends this component until it
    /// resolves. Later renders in the same session reuse the value.
    pub fn use_resource<T, F, Fut>(&mut self, key: &str, fetch: F) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let cache_key = format!("{}/{}", self.path, key);
        match self.state.session.cache.get(&cache_key) {
            Some(Resource::Ready(value)) => match value.downcast_ref::<T>() {
                Some(value) => return Some(value.clone()),
                None => {
                    warn!(key = %cache_key, "resource cached with a different type");
                    return None;
                }
            },
            Some(Resource::Pending) => {
                self.suspended = true;
                return None;
            }
            None => {}
        }

        self.state
            .session
            .cache
            .insert(cache_key.clone(), Resource::Pending);
        let session = self.state.session.id;
        let requester = self.state.requester.clone();
        let future = fetch();
        debug!(%session, key = %cache_key, "resource fetch started");
        tokio::spawn(async move {
            let value = future.await;
            requester.resource_ready(session, cache_key, Arc::new(value));
        });
        self.suspended = true;
        None
    }

    /// Reads `key` from a keyed store and re-renders whenever it changes.
    /// Suspends until the first read completes.
    pub fn use_store(&mut self, store: &Arc<dyn Store>, key: &str, default: Value) -> Option<StoreState> {
        let index = self.cursor;
        let requester = self.state.requester.clone();
        let initial_default = default.clone();
        let mut hook = self.slot(|| {
            Arc::new(StoreHook::spawn(
                store.clone(),
                key.to_string(),
                initial_default,
                requester,
            ))
        });
        if hook.key != key || !Arc::ptr_eq(&hook.store, store) {
            debug!(old = %hook.key, new = %key, "store hook retargeted");
            hook = Arc::new(StoreHook::spawn(
                store.clone(),
                key.to_string(),
                default,
                self.state.requester.clone(),
            ));
            self.replace_slot(index, hook.clone());
        }
        let loaded = hook.value.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let state = loaded.map(|value| StoreState {
            store: hook.store.clone(),
            key: hook.key.clone(),
            default: hook.default.clone(),
            value,
        });
        if state.is_none() {
            self.suspended = true;
        }
        state
    }
}

/// Handle to one `use_state` slot.
pub struct State<T> {
    cell: Arc<Mutex<T>>,
    requester: RenderRequester,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            requester: self.requester.clone(),
        }
    }
}

impl<T: Clone> State<T> {
    pub fn get(&self) -> T {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, value: T) {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner()) = value;
        self.requester.request_render();
    }

    pub fn update(&self, transition: impl FnOnce(&T) -> T) {
        {
            let mut value = self.cell.lock().unwrap_or_else(|e| e.into_inner());
            *value = transition(&value);
        }
        self.requester.request_render();
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.lock() {
            Ok(value) => f.debug_tuple("State").field(&*value).finish(),
            Err(_) => f.write_str("State(<poisoned>)"),
        }
    }
}

struct StoreHook {
    store: Arc<dyn Store>,
    key: String,
    default: Value,
    value: Arc<Mutex<Option<Value>>>,
    _watch: DropGuard,
}

impl StoreHook {
    /// Loads the initial value and follows change events until the hook is dropped.
    fn spawn(store: Arc<dyn Store>, key: String, default: Value, requester: RenderRequester) -> Self {
        let value = Arc::new(Mutex::new(None));
        let token = CancellationToken::new();
        let mut changes = store.subscribe();
        let task_store = store.clone();
        let task_key = key.clone();
        let task_default = default.clone();
        let task_value = value.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            match task_store.get(&task_key, task_default.clone()).await {
                Ok(initial) => {
                    *task_value.lock().unwrap_or_else(|e| e.into_inner()) = Some(initial);
                    requester.request_render();
                }
                Err(err) => warn!(key = %task_key, error = %err, "store read failed"),
            }
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(StoreChange { key, value }) if key == task_key => {
                            *task_value.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
                            requester.request_render();
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "store watcher lagged; re-reading");
                            if let Ok(latest) = task_store.get(&task_key, task_default.clone()).await {
                                *task_value.lock().unwrap_or_else(|e| e.into_inner()) = Some(latest);
                                requester.request_render();
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        Self {
            store,
            key,
            default,
            value,
            _watch: token.drop_guard(),
        }
    }
}

/// A store value read during render, with writers that go back to the store.
#[derive(Clone)]
pub struct StoreState {
    store: Arc<dyn Store>,
    key: String,
    default: Value,
    value: Value,
}

impl StoreState {
    pub fn get(&self) -> &Value {
        &self.value
    }

    pub async fn set(&self, value: Value) -> Result<(), crate::store::StoreError> {
        self.store.set(&self.key, value).await
    }

    pub async fn update(
        &self,
        transition: impl FnOnce(Value) -> Value + Send + 'static,
    ) -> Result<Value, crate::store::StoreError> {
        self.store
            .update(&self.key, self.default.clone(), Box::new(transition))
            .await
    }
}

impl fmt::Debug for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreState")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}
