use crate::errors::StorageError;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, warn};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const USER_DATA_KEY: &str = "userData";
pub const LOCALE_KEY: &str = "i18nextLng";

/// A key whose value changed underneath us, found by [`Storage::reload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Durable client-side key/value storage backed by a JSON file. Several
/// processes may share the same file.
#[derive(Debug)]
pub struct Storage {
    path: Option<PathBuf>,
    items: Mutex<BTreeMap<String, String>>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            items: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let items = load_items(&path).await;
        Ok(Self {
            path: Some(path),
            items: Mutex::new(items),
        })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.items.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value.to_string());
        self.write_through(&items, |disk| {
            disk.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
        .await
    }

    /// Removes every given key and persists once.
    pub async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut items = self.items.lock().await;
        for key in keys {
            items.remove(*key);
        }
        self.write_through(&items, |disk| {
            keys.iter()
                .fold(false, |changed, key| disk.remove(*key).is_some() || changed)
        })
        .await
    }

    /// Re-reads the backing file and returns the keys another writer changed.
    pub async fn reload(&self) -> Result<Vec<StorageEvent>, StorageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(Vec::new());
        };
        let mut items = self.items.lock().await;
        let fresh = read_items(path).await?;
        let events = diff(&items, &fresh);
        if !events.is_empty() {
            debug!(changed = events.len(), "storage changed on disk");
            *items = fresh;
        }
        Ok(events)
    }

    /// Applies one change to the current file contents, so keys written by
    /// other processes since our last reload are kept. The in-memory map only
    /// carries our own change; `reload` still reports the others.
    async fn write_through<F>(
        &self,
        items: &BTreeMap<String, String>,
        apply: F,
    ) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let mut disk = match read_items(path).await {
            Ok(disk) => disk,
            Err(err) => {
                warn!("storage file unreadable, overwriting: {err}");
                items.clone()
            }
        };
        if !apply(&mut disk) {
            return Ok(());
        }
        let payload = serde_json::to_vec_pretty(&disk)?;
        fs::write(path, payload).await?;
        Ok(())
    }
}

async fn load_items(path: &Path) -> BTreeMap<String, String> {
    match read_items(path).await {
        Ok(items) => items,
        Err(err) => {
            error!("failed to load storage file: {err}");
            BTreeMap::new()
        }
    }
}

async fn read_items(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn diff(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Vec<StorageEvent> {
    let mut events = Vec::new();
    for (key, value) in new {
        let previous = old.get(key);
        if previous != Some(value) {
            events.push(StorageEvent {
                key: key.clone(),
                old_value: previous.cloned(),
                new_value: Some(value.clone()),
            });
        }
    }
    for (key, value) in old {
        if !new.contains_key(key) {
            events.push(StorageEvent {
                key: key.clone(),
                old_value: Some(value.clone()),
                new_value: None,
            });
        }
    }
    events
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn unique_storage_path() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("ofr_storage_{}_{}.json", std::process::id(), nanos));
        path
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let storage = Storage::open(unique_storage_path()).await.unwrap();
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).await, None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let path = unique_storage_path();
        let storage = Storage::open(&path).await.unwrap();
        storage.set(ACCESS_TOKEN_KEY, "abc").await.unwrap();
        storage.set(LOCALE_KEY, "fr").await.unwrap();
        storage.remove(&[LOCALE_KEY]).await.unwrap();

        let reopened = Storage::open(&path).await.unwrap();
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).await.as_deref(), Some("abc"));
        assert_eq!(reopened.get(LOCALE_KEY).await, None);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn corrupt_file_opens_empty() {
        let path = unique_storage_path();
        std::fs::write(&path, b"{not json").unwrap();
        let storage = Storage::open(&path).await.unwrap();
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).await, None);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn reload_reports_changes_from_another_writer() {
        let path = unique_storage_path();
        let ours = Storage::open(&path).await.unwrap();
        ours.set(USER_DATA_KEY, "{}").await.unwrap();

        let theirs = Storage::open(&path).await.unwrap();
        theirs.set(ACCESS_TOKEN_KEY, "from-other-tab").await.unwrap();
        theirs.remove(&[USER_DATA_KEY]).await.unwrap();

        let mut events = ours.reload().await.unwrap();
        events.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(
            events,
            vec![
                StorageEvent {
                    key: ACCESS_TOKEN_KEY.into(),
                    old_value: None,
                    new_value: Some("from-other-tab".into()),
                },
                StorageEvent {
                    key: USER_DATA_KEY.into(),
                    old_value: Some("{}".into()),
                    new_value: None,
                },
            ]
        );
        assert!(ours.reload().await.unwrap().is_empty());
        assert_eq!(
            ours.get(ACCESS_TOKEN_KEY).await.as_deref(),
            Some("from-other-tab")
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn writes_keep_keys_from_another_writer() {
        let path = unique_storage_path();
        let tab_a = Storage::open(&path).await.unwrap();
        let tab_b = Storage::open(&path).await.unwrap();

        tab_b.set(ACCESS_TOKEN_KEY, "fresh-login").await.unwrap();
        tab_a.set(LOCALE_KEY, "en").await.unwrap();
        tab_a.remove(&[USER_DATA_KEY]).await.unwrap();

        let reopened = Storage::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(ACCESS_TOKEN_KEY).await.as_deref(),
            Some("fresh-login")
        );
        assert_eq!(reopened.get(LOCALE_KEY).await.as_deref(), Some("en"));

        let events = tab_a.reload().await.unwrap();
        assert_eq!(
            events,
            vec![StorageEvent {
                key: ACCESS_TOKEN_KEY.into(),
                old_value: None,
                new_value: Some("fresh-login".into()),
            }]
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn in_memory_reload_is_noop() {
        let storage = Storage::in_memory();
        storage.set(ACCESS_TOKEN_KEY, "t").await.unwrap();
        assert!(storage.reload().await.unwrap().is_empty());
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).await.as_deref(), Some("t"));
    }
}
