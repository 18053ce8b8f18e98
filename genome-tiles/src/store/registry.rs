//! Shared tile stores keyed by source, model and contig.
//!
//! Several tracks showing the same data share one [`TileStore`], so a tile
//! is fetched once no matter how many tracks draw it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::config::TileStoreConfig;
use crate::source::DataSource;
use crate::store::{StoreError, TileStore};

/// Identity of a shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    /// Id of the data source.
    pub source_id: String,
    /// Payload model served from that source (e.g. `"signal"`, `"annotation"`).
    pub model: String,
    /// Contig id.
    pub contig: String,
}

impl StoreKey {
    /// Create a key.
    pub fn new(
        source_id: impl Into<String>,
        model: impl Into<String>,
        contig: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            model: model.into(),
            contig: contig.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source_id, self.model, self.contig)
    }
}

/// Opens each store at most once and hands out shared references.
pub struct StoreRegistry<P: Send + Sync + 'static> {
    runtime: Handle,
    stores: RefCell<HashMap<StoreKey, Rc<TileStore<P>>>>,
}

impl<P: Send + Sync + 'static> StoreRegistry<P> {
    /// Create an empty registry whose stores fetch on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            stores: RefCell::new(HashMap::new()),
        }
    }

    /// Return the store for `(source, model, contig_id)`, opening it on
    /// first use.
    ///
    /// `config` only applies when the store is opened.
    ///
    /// # Errors
    ///
    /// Propagates [`TileStore::open`] errors; nothing is registered then.
    pub async fn get_or_open(
        &self,
        source: Arc<dyn DataSource<Payload = P>>,
        model: &str,
        contig_id: &str,
        config: TileStoreConfig,
    ) -> Result<Rc<TileStore<P>>, StoreError> {
        let key = StoreKey::new(source.id(), model, contig_id);
        if let Some(store) = self.get(&key) {
            return Ok(store);
        }

        let store = Rc::new(TileStore::open(source, contig_id, config, self.runtime.clone()).await?);

        // another caller may have opened it while we awaited
        let mut stores = self.stores.borrow_mut();
        let store = stores.entry(key).or_insert(store);
        Ok(Rc::clone(store))
    }

    /// Registered store for `key`.
    pub fn get(&self, key: &StoreKey) -> Option<Rc<TileStore<P>>> {
        self.stores.borrow().get(key).cloned()
    }

    /// Unregister and clear the store for `key`.
    ///
    /// Returns false if none was registered.
    pub fn remove(&self, key: &StoreKey) -> bool {
        let removed = self.stores.borrow_mut().remove(key);
        match removed {
            Some(store) => {
                store.clear();
                debug!(store = %key, "Removed tile store");
                true
            }
            None => false,
        }
    }

    /// Clear and unregister every store.
    pub fn clear_all(&self) {
        let stores: Vec<_> = self.stores.borrow_mut().drain().collect();
        for (_, store) in &stores {
            store.clear();
        }
        debug!(stores = stores.len(), "Cleared all tile stores");
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<StoreKey> {
        let mut keys: Vec<_> = self.stores.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.borrow().len()
    }

    /// Returns true if no store is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.borrow().is_empty()
    }
}
