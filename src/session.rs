use crate::errors::StorageError;
use crate::storage::{ACCESS_TOKEN_KEY, LOCALE_KEY, Storage, USER_DATA_KEY};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub const SIGNIN_ROUTE: &str = "/signin";
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    /// Credentials were purged; the UI should show a notice and navigate to
    /// `redirect_to` once `after` has elapsed.
    Expired {
        redirect_to: &'static str,
        after: Duration,
    },
}

#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    token: watch::Sender<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
    redirect_delay: Duration,
}

impl SessionGuard {
    pub async fn load(storage: Storage, redirect_delay: Duration) -> Self {
        let token = clean(storage.get(ACCESS_TOKEN_KEY).await);
        let (token, _) = watch::channel(token);
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                storage,
                token,
                events,
                redirect_delay,
            }),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.inner.token.borrow().clone()
    }

    pub fn subscribe_token(&self) -> watch::Receiver<Option<String>> {
        self.inner.token.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn redirect_delay(&self) -> Duration {
        self.inner.redirect_delay
    }

    pub async fn locale(&self) -> Option<String> {
        clean(self.inner.storage.get(LOCALE_KEY).await)
    }

    /// Stores a freshly issued token and signals that auth is ready.
    pub async fn sign_in(
        &self,
        token: &str,
        profile: Option<&serde_json::Value>,
    ) -> Result<(), StorageError> {
        let token = token.trim();
        if token.is_empty() {
            return self.clear_session().await;
        }
        self.inner.storage.set(ACCESS_TOKEN_KEY, token).await?;
        if let Some(profile) = profile {
            let encoded = serde_json::to_string(profile)?;
            self.inner.storage.set(USER_DATA_KEY, &encoded).await?;
        }
        self.publish(Some(token.to_string()));
        let _ = self.inner.events.send(SessionEvent::SignedIn);
        info!("session token stored");
        Ok(())
    }

    pub async fn clear_session(&self) -> Result<(), StorageError> {
        let result = self
            .inner
            .storage
            .remove(&[ACCESS_TOKEN_KEY, USER_DATA_KEY])
            .await;
        self.publish(None);
        result
    }

    /// Purges credentials after the API rejected them and announces the
    /// redirect to sign-in.
    pub async fn expire(&self) {
        if let Err(err) = self.clear_session().await {
            warn!("failed to purge session storage: {err}");
        }
        let _ = self.inner.events.send(SessionEvent::Expired {
            redirect_to: SIGNIN_ROUTE,
            after: self.inner.redirect_delay,
        });
        info!(
            "session expired, redirecting to {SIGNIN_ROUTE} in {:?}",
            self.inner.redirect_delay
        );
    }

    /// Picks up a token written or removed by another process. Returns true
    /// when the published token changed.
    pub async fn sync_from_storage(&self) -> Result<bool, StorageError> {
        let events = self.inner.storage.reload().await?;
        let Some(event) = events.into_iter().find(|e| e.key == ACCESS_TOKEN_KEY) else {
            return Ok(false);
        };
        debug!("access token changed in storage");
        Ok(self.publish(clean(event.new_value)))
    }

    pub fn spawn_watcher(&self, interval: Duration) -> JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = guard.sync_from_storage().await {
                    warn!("storage watcher failed: {err}");
                }
            }
        })
    }

    fn publish(&self, token: Option<String>) -> bool {
        self.inner.token.send_if_modified(|current| {
            if *current == token {
                false
            } else {
                *current = token;
                true
            }
        })
    }
}

fn clean(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
