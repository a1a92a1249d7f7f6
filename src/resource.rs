//! Cached, single-flight access to one slice of server state.

use crate::api::ApiClient;
use crate::errors::FetchError;
use crate::session::SessionGuard;
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};
use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
    time::Instant,
};
use tracing::{debug, info, warn};

pub const DEFAULT_STALE_WINDOW: Duration = Duration::from_secs(30);

pub type Mapper<T> = Arc<dyn Fn(Value) -> Result<T, String> + Send + Sync>;

/// Where a resource lives and how its `result` payload becomes a `T`.
pub struct ResourceSpec<T> {
    pub name: &'static str,
    pub path: String,
    map: Mapper<T>,
}

impl<T> Clone for ResourceSpec<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            path: self.path.clone(),
            map: Arc::clone(&self.map),
        }
    }
}

impl<T> fmt::Debug for ResourceSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSpec")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> ResourceSpec<T> {
    pub fn new(name: &'static str, path: impl Into<String>) -> Self {
        Self::with_mapper(name, path, |value| {
            serde_json::from_value(value).map_err(|err| err.to_string())
        })
    }
}

impl<T> ResourceSpec<T> {
    pub fn with_mapper<F>(name: &'static str, path: impl Into<String>, map: F) -> Self
    where
        F: Fn(Value) -> Result<T, String> + Send + Sync + 'static,
    {
        Self {
            name,
            path: path.into(),
            map: Arc::new(map),
        }
    }

    pub fn map(&self, value: Value) -> Result<T, String> {
        (self.map)(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Fresh,
    Errored,
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub last_fetched_at: Option<Instant>,
    pub fetched_at: Option<DateTime<Local>>,
    /// First-paint flag; cleared once a fetch settles or the cache is reused.
    pub is_loading: bool,
    /// True only while a request is outstanding.
    pub is_fetching: bool,
    pub error: Option<String>,
    pub session_expired: bool,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_fetched_at: None,
            fetched_at: None,
            is_loading: true,
            is_fetching: false,
            error: None,
            session_expired: false,
        }
    }
}

impl<T> ResourceState<T> {
    pub fn phase(&self) -> Phase {
        if self.is_fetching {
            Phase::Fetching
        } else if self.session_expired {
            Phase::SessionExpired
        } else if self.error.is_some() {
            Phase::Errored
        } else if self.last_fetched_at.is_some() {
            Phase::Fresh
        } else {
            Phase::Idle
        }
    }

    pub fn is_stale(&self, window: Duration) -> bool {
        match self.last_fetched_at {
            Some(at) => at.elapsed() >= window,
            None => true,
        }
    }
}

pub struct RemoteResource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RemoteResource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    spec: ResourceSpec<T>,
    api: ApiClient,
    session: SessionGuard,
    stale_window: Duration,
    state: watch::Sender<ResourceState<T>>,
    flight: Mutex<Flight>,
    lifecycle: Mutex<Option<AbortHandle>>,
}

#[derive(Default)]
struct Flight {
    generation: u64,
    handle: Option<AbortHandle>,
}

impl<T> RemoteResource<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        spec: ResourceSpec<T>,
        api: ApiClient,
        session: SessionGuard,
        stale_window: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            inner: Arc::new(Inner {
                spec,
                api,
                session,
                stale_window,
                state,
                flight: Mutex::new(Flight::default()),
                lifecycle: Mutex::new(None),
            }),
        }
    }

    pub fn snapshot(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    /// Fetches unless a fetch is already running or the cached value is
    /// younger than the stale window. `force` skips the staleness check and
    /// supersedes a running fetch. Resolves once the fetch it started has
    /// been applied; never fails, outcomes land in the state.
    pub async fn ensure_fresh(&self, force: bool) {
        if let Some(task) = self.inner.start(force) {
            // An aborted task has been superseded or unmounted.
            let _ = task.await;
        }
    }

    pub async fn refetch(&self) {
        self.ensure_fresh(true).await;
    }

    pub fn clear_error(&self) {
        self.inner.clear_error();
    }

    /// Starts the lifecycle task: the first fetch waits until a token is
    /// available, later token changes trigger a forced refresh.
    pub fn mount(&self) {
        let mut slot = lock(&self.inner.lifecycle);
        if slot.is_some() {
            return;
        }
        let tokens = self.inner.session.subscribe_token();
        let task = tokio::spawn(lifecycle(Arc::downgrade(&self.inner), tokens));
        *slot = Some(task.abort_handle());
        debug!(resource = self.inner.spec.name, "mounted");
    }

    pub fn unmount(&self) {
        self.inner.abort_all();
        self.inner.state.send_replace(ResourceState::default());
        debug!(resource = self.inner.spec.name, "unmounted");
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn start(self: &Arc<Self>, force: bool) -> Option<JoinHandle<()>> {
        let mut flight = lock(&self.flight);
        let (fetching, fresh) = {
            let state = self.state.borrow();
            (state.is_fetching, !state.is_stale(self.stale_window))
        };

        if fetching && !force {
            return None;
        }
        if !force && fresh {
            self.state.send_if_modified(|state| {
                let changed = state.is_loading;
                state.is_loading = false;
                changed
            });
            return None;
        }
        if let Some(previous) = flight.handle.take() {
            debug!(resource = self.spec.name, "superseding in-flight fetch");
            previous.abort();
        }

        flight.generation += 1;
        let generation = flight.generation;
        self.state.send_modify(|state| {
            state.is_fetching = true;
            state.is_loading = true;
            state.error = None;
            state.session_expired = false;
        });

        let Some(token) = self.session.token() else {
            warn!(resource = self.spec.name, "fetch skipped: no auth token");
            self.state.send_modify(|state| {
                state.error = Some(FetchError::MissingToken.to_string());
                state.is_fetching = false;
                state.is_loading = false;
            });
            return None;
        };

        let task = tokio::spawn(run_fetch(
            Arc::downgrade(self),
            self.api.clone(),
            self.spec.clone(),
            token,
            generation,
        ));
        flight.handle = Some(task.abort_handle());
        Some(task)
    }

    /// A successful envelope without a payload clears `data`.
    async fn complete(&self, generation: u64, outcome: Result<Option<T>, FetchError>) {
        if let Err(err) = &outcome {
            if err.is_unauthorized() {
                warn!(resource = self.spec.name, "{err}");
                self.session.expire().await;
            }
        }

        let mut flight = lock(&self.flight);
        if flight.generation != generation {
            return;
        }
        flight.handle = None;

        self.state.send_modify(|state| {
            match outcome {
                Ok(data) => {
                    state.data = data;
                    state.last_fetched_at = Some(Instant::now());
                    state.fetched_at = Some(Local::now());
                }
                Err(FetchError::Unauthorized(_)) => {
                    state.session_expired = true;
                    state.error = None;
                }
                Err(err) => {
                    warn!(resource = self.spec.name, "fetch failed: {err}");
                    state.error = Some(err.to_string());
                }
            }
            state.is_fetching = false;
            state.is_loading = false;
        });
    }

    fn clear_error(&self) {
        self.state.send_if_modified(|state| {
            let changed = state.error.is_some() || state.session_expired;
            state.error = None;
            state.session_expired = false;
            changed
        });
    }
}

impl<T> Inner<T> {
    fn abort_all(&self) {
        if let Some(task) = lock(&self.lifecycle).take() {
            task.abort();
        }
        let mut flight = lock(&self.flight);
        flight.generation += 1;
        if let Some(task) = flight.handle.take() {
            task.abort();
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.abort_all();
    }
}

async fn run_fetch<T>(
    inner: Weak<Inner<T>>,
    api: ApiClient,
    spec: ResourceSpec<T>,
    token: String,
    generation: u64,
) where
    T: Clone + Send + Sync + 'static,
{
    let outcome = match api.get_envelope(&spec.path, &token, &[]).await {
        Ok(envelope) => envelope.into_result().and_then(|payload| match payload {
            None | Some(Value::Null) => Ok(None),
            Some(value) => spec.map(value).map(Some).map_err(FetchError::Decode),
        }),
        Err(err) => Err(err),
    };
    if let Some(inner) = inner.upgrade() {
        inner.complete(generation, outcome).await;
    }
}

async fn lifecycle<T>(inner: Weak<Inner<T>>, mut tokens: watch::Receiver<Option<String>>)
where
    T: Clone + Send + Sync + 'static,
{
    let mut last_seen = match tokens.wait_for(Option::is_some).await {
        Ok(token) => token.clone(),
        Err(_) => return,
    };
    match inner.upgrade() {
        Some(inner) => {
            info!(resource = inner.spec.name, "auth token available, loading");
            inner.start(false);
        }
        None => return,
    }

    while tokens.changed().await.is_ok() {
        let current = tokens.borrow_and_update().clone();
        let is_new_login = current.is_some() && current != last_seen;
        last_seen = current;
        if !is_new_login {
            continue;
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        info!(resource = inner.spec.name, "auth token changed, refreshing");
        inner.clear_error();
        inner.start(true);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
