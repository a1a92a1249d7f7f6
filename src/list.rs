use crate::api::ApiClient;
use crate::errors::{FetchError, GENERIC_ERROR_MESSAGE};
use crate::models::{Envelope, ListQuery, Pagination, non_empty};
use crate::session::SessionGuard;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{sync::watch, task::AbortHandle, time};
use tracing::{debug, warn};

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Countries,
    Currencies,
    Products,
    Organizations,
    CollectionPoints,
    Corridors,
    TransportMethods,
    TransportModes,
    Units,
    AnimalNatures,
    ProductNatures,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 11] = [
        ReferenceKind::Countries,
        ReferenceKind::Currencies,
        ReferenceKind::Products,
        ReferenceKind::Organizations,
        ReferenceKind::CollectionPoints,
        ReferenceKind::Corridors,
        ReferenceKind::TransportMethods,
        ReferenceKind::TransportModes,
        ReferenceKind::Units,
        ReferenceKind::AnimalNatures,
        ReferenceKind::ProductNatures,
    ];

    pub fn path(self) -> &'static str {
        match self {
            ReferenceKind::Countries => "/countries",
            ReferenceKind::Currencies => "/currencies",
            ReferenceKind::Products => "/products",
            ReferenceKind::Organizations => "/organizations",
            ReferenceKind::CollectionPoints => "/collection-points",
            ReferenceKind::Corridors => "/corridors",
            ReferenceKind::TransportMethods => "/transport-methods",
            ReferenceKind::TransportModes => "/transport-modes",
            ReferenceKind::Units => "/units",
            ReferenceKind::AnimalNatures => "/animal-natures",
            ReferenceKind::ProductNatures => "/product-natures",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

/// Outcome of a create/update/delete, shown to the user once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    fn success(message: Option<String>, fallback: &str) -> Self {
        Self {
            level: ToastLevel::Success,
            message: non_empty(message).unwrap_or_else(|| fallback.to_string()),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListState<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
    pub query: ListQuery,
    pub is_loading: bool,
    pub error: Option<String>,
    pub session_expired: bool,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            pagination: None,
            query: ListQuery::default(),
            is_loading: false,
            error: None,
            session_expired: false,
        }
    }
}

pub struct ResourceList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for ResourceList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ListInner<T> {
    path: String,
    api: ApiClient,
    session: SessionGuard,
    debounce: Duration,
    state: watch::Sender<ListState<T>>,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    generation: u64,
    load: Option<AbortHandle>,
    search: Option<AbortHandle>,
}

impl<T> ResourceList<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(kind: ReferenceKind, api: ApiClient, session: SessionGuard) -> Self {
        Self::with_path(kind.path(), api, session, SEARCH_DEBOUNCE)
    }

    pub fn with_path(
        path: impl Into<String>,
        api: ApiClient,
        session: SessionGuard,
        debounce: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ListState::default());
        Self {
            inner: Arc::new(ListInner {
                path: path.into(),
                api,
                session,
                debounce,
                state,
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn snapshot(&self) -> ListState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState<T>> {
        self.inner.state.subscribe()
    }

    /// Loads the current page; a newer load replaces an older one.
    pub async fn load(&self) {
        let task = {
            let mut tasks = lock(&self.inner.tasks);
            if let Some(previous) = tasks.load.take() {
                previous.abort();
            }
            tasks.generation += 1;
            let handle = tokio::spawn(run_load(Arc::clone(&self.inner), tasks.generation));
            tasks.load = Some(handle.abort_handle());
            handle
        };
        let _ = task.await;
    }

    pub async fn set_page(&self, page: u32) {
        self.inner
            .state
            .send_modify(|state| state.query.page = page.max(1));
        self.load().await;
    }

    /// Records the search text now and loads page one once typing pauses
    /// for the debounce interval.
    pub fn search(&self, text: &str) {
        let text = text.trim().to_string();
        self.inner.state.send_modify(|state| {
            state.query.search = (!text.is_empty()).then(|| text.clone());
            state.query.page = 1;
        });

        let list = self.clone();
        let debounce = self.inner.debounce;
        let mut tasks = lock(&self.inner.tasks);
        if let Some(previous) = tasks.search.take() {
            previous.abort();
        }
        let handle = tokio::spawn(async move {
            time::sleep(debounce).await;
            list.load().await;
        });
        tasks.search = Some(handle.abort_handle());
    }

    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Toast {
        let outcome = match self.inner.session.token() {
            Some(token) => self.inner.api.create(&self.inner.path, &token, body).await,
            None => Err(FetchError::MissingToken),
        };
        self.finish_mutation(outcome, "created").await
    }

    pub async fn update<B: Serialize + ?Sized>(&self, id: &str, body: &B) -> Toast {
        let outcome = match self.inner.session.token() {
            Some(token) => {
                self.inner
                    .api
                    .update(&self.inner.path, id, &token, body)
                    .await
            }
            None => Err(FetchError::MissingToken),
        };
        self.finish_mutation(outcome, "updated").await
    }

    pub async fn delete(&self, id: &str) -> Toast {
        let outcome = match self.inner.session.token() {
            Some(token) => self.inner.api.delete(&self.inner.path, id, &token).await,
            None => Err(FetchError::MissingToken),
        };
        self.finish_mutation(outcome, "deleted").await
    }

    async fn finish_mutation(
        &self,
        outcome: Result<Envelope<Value>, FetchError>,
        fallback: &str,
    ) -> Toast {
        let outcome = outcome.and_then(|envelope| {
            let message = envelope.message.clone();
            envelope.into_result().map(|_| message)
        });
        match outcome {
            Ok(message) => {
                self.load().await;
                Toast::success(message, fallback)
            }
            Err(err) if err.is_unauthorized() => {
                self.inner.session.expire().await;
                self.inner
                    .state
                    .send_modify(|state| state.session_expired = true);
                Toast::error(err.to_string())
            }
            Err(err) => {
                warn!(path = %self.inner.path, "mutation failed: {err}");
                Toast::error(err.to_string())
            }
        }
    }
}

async fn run_load<T>(inner: Arc<ListInner<T>>, generation: u64)
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let query = inner.state.borrow().query.clone();
    inner.state.send_modify(|state| {
        state.is_loading = true;
        state.error = None;
    });

    let outcome = match inner.session.token() {
        Some(token) => inner.api.list::<T>(&inner.path, &token, &query).await,
        None => Err(FetchError::MissingToken),
    };
    if let Err(err) = &outcome {
        if err.is_unauthorized() {
            inner.session.expire().await;
        }
    }

    if lock(&inner.tasks).generation != generation {
        return;
    }
    debug!(path = %inner.path, page = query.page, "list loaded");
    inner.state.send_modify(|state| {
        match outcome {
            Ok(page) => {
                state.items = page.data;
                state.pagination = Some(page.pagination);
            }
            Err(FetchError::Unauthorized(_)) => state.session_expired = true,
            Err(err) => {
                let message = err.to_string();
                state.error = Some(if message.is_empty() {
                    GENERIC_ERROR_MESSAGE.to_string()
                } else {
                    message
                });
            }
        }
        state.is_loading = false;
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
