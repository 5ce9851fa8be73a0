use crate::notice::{NoticeKind, Window};
use crate::{Result, Source, SubscriptionError, WalletAddress};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Persisted key/value store
///
/// Keys are `/`-separated strings. Values are opaque strings; the typed
/// facade [`PremiumStorage`] stores JSON.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process store for tests and the demo.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// File-based store (native only)
///
/// One file per key under `base_path`; the key is hex-encoded into the file
/// name so wallet addresses with `:` or `/` stay valid on every filesystem.
/// Writes go through a temp file and a rename.
#[cfg(not(target_arch = "wasm32"))]
pub struct FileStore {
    base_path: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", hex::encode(key)))
    }

    fn key_for(file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(".json")?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(Self::key_for) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Purchase that was still pending when the process stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPurchase {
    pub source: Source,
    pub correlation_id: String,
    pub attempt: u64,
}

/// Typed view over a [`KeyValueStore`]
///
/// Layout:
/// - `premium/{wallet}/marker/{kind}/{window}`: lifetime id the notice was
///   raised for
/// - `premium/{wallet}/pending`: [`PendingPurchase`] JSON
/// - `premium/{wallet}/source`: last source used by the wallet
#[derive(Clone)]
pub struct PremiumStorage {
    store: Arc<dyn KeyValueStore>,
}

impl PremiumStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Storage backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn marker_key(wallet: &WalletAddress, kind: NoticeKind, window: Window) -> String {
        format!(
            "premium/{}/marker/{}/{}",
            wallet,
            kind.as_str(),
            window.as_str()
        )
    }

    fn pending_key(wallet: &WalletAddress) -> String {
        format!("premium/{}/pending", wallet)
    }

    fn source_key(wallet: &WalletAddress) -> String {
        format!("premium/{}/source", wallet)
    }

    /// Whether the marker for `window` was written for this `lifetime`.
    pub async fn marker_set(
        &self,
        wallet: &WalletAddress,
        kind: NoticeKind,
        window: Window,
        lifetime: &str,
    ) -> Result<bool> {
        let stored = self
            .store
            .get(&Self::marker_key(wallet, kind, window))
            .await?;
        Ok(stored.as_deref() == Some(lifetime))
    }

    /// Record that the notice for `window` was raised in `lifetime`.
    pub async fn set_marker(
        &self,
        wallet: &WalletAddress,
        kind: NoticeKind,
        window: Window,
        lifetime: &str,
    ) -> Result<()> {
        self.store
            .set(&Self::marker_key(wallet, kind, window), lifetime)
            .await
    }

    /// Windows of `kind` already marked in `lifetime`.
    pub async fn markers(
        &self,
        wallet: &WalletAddress,
        kind: NoticeKind,
        lifetime: &str,
    ) -> Result<Vec<Window>> {
        let mut set = Vec::new();
        for window in kind.windows() {
            if self.marker_set(wallet, kind, *window, lifetime).await? {
                set.push(*window);
            }
        }
        Ok(set)
    }

    pub async fn save_pending(&self, wallet: &WalletAddress, pending: &PendingPurchase) -> Result<()> {
        let json = serde_json::to_string(pending)?;
        self.store.set(&Self::pending_key(wallet), &json).await
    }

    pub async fn pending(&self, wallet: &WalletAddress) -> Result<Option<PendingPurchase>> {
        match self.store.get(&Self::pending_key(wallet)).await? {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                SubscriptionError::Storage(format!("corrupt pending purchase: {}", e))
            }),
            None => Ok(None),
        }
    }

    pub async fn clear_pending(&self, wallet: &WalletAddress) -> Result<()> {
        self.store.remove(&Self::pending_key(wallet)).await
    }

    pub async fn save_last_source(&self, wallet: &WalletAddress, source: Source) -> Result<()> {
        self.store
            .set(&Self::source_key(wallet), source.as_str())
            .await
    }

    /// Last source the wallet purchased with; unreadable values count as none.
    pub async fn last_source(&self, wallet: &WalletAddress) -> Result<Option<Source>> {
        Ok(self
            .store
            .get(&Self::source_key(wallet))
            .await?
            .and_then(|raw| raw.parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletAddress {
        WalletAddress::new("0:abc/def")
    }

    #[tokio::test]
    async fn test_memory_store_prefix_scan() {
        let store = MemoryStore::new();
        store.set("premium/a/x", "1").await.unwrap();
        store.set("premium/a/y", "2").await.unwrap();
        store.set("premium/b/x", "3").await.unwrap();

        let keys = store.keys_with_prefix("premium/a/").await.unwrap();
        assert_eq!(keys, vec!["premium/a/x", "premium/a/y"]);

        store.remove("premium/a/x").await.unwrap();
        store.remove("premium/a/x").await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(store.get("premium/0:abc/pending").await.unwrap(), None);
        store.set("premium/0:abc/pending", "{}").await.unwrap();
        assert_eq!(
            store.get("premium/0:abc/pending").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(
            store.keys_with_prefix("premium/0:abc").await.unwrap(),
            vec!["premium/0:abc/pending"]
        );

        // Survives reopening.
        let reopened = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert!(reopened.get("premium/0:abc/pending").await.unwrap().is_some());

        reopened.remove("premium/0:abc/pending").await.unwrap();
        reopened.remove("premium/0:abc/pending").await.unwrap();
        assert_eq!(reopened.get("premium/0:abc/pending").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_markers_scoped_to_lifetime() {
        let storage = PremiumStorage::in_memory();
        let w = wallet();

        assert!(!storage
            .marker_set(&w, NoticeKind::Ending, Window::Day, "crypto:tx-1")
            .await
            .unwrap());
        storage
            .set_marker(&w, NoticeKind::Ending, Window::Day, "crypto:tx-1")
            .await
            .unwrap();

        assert!(storage
            .marker_set(&w, NoticeKind::Ending, Window::Day, "crypto:tx-1")
            .await
            .unwrap());
        // Other kind, other lifetime: unset.
        assert!(!storage
            .marker_set(&w, NoticeKind::Balance, Window::Day, "crypto:tx-1")
            .await
            .unwrap());
        assert!(!storage
            .marker_set(&w, NoticeKind::Ending, Window::Day, "crypto:tx-2")
            .await
            .unwrap());

        assert_eq!(
            storage
                .markers(&w, NoticeKind::Ending, "crypto:tx-1")
                .await
                .unwrap(),
            vec![Window::Day]
        );
    }

    #[tokio::test]
    async fn test_pending_purchase_round_trip() {
        let storage = PremiumStorage::in_memory();
        let w = wallet();
        let pending = PendingPurchase {
            source: Source::MobileIap,
            correlation_id: "otx-7".into(),
            attempt: 2,
        };

        storage.save_pending(&w, &pending).await.unwrap();
        assert_eq!(storage.pending(&w).await.unwrap(), Some(pending));

        storage.clear_pending(&w).await.unwrap();
        assert_eq!(storage.pending(&w).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_source() {
        let storage = PremiumStorage::in_memory();
        let w = wallet();
        assert_eq!(storage.last_source(&w).await.unwrap(), None);

        storage.save_last_source(&w, Source::Extension).await.unwrap();
        assert_eq!(
            storage.last_source(&w).await.unwrap(),
            Some(Source::Extension)
        );
    }
}
