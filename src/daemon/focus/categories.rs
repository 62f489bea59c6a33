use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    daemon::storage::{local::LocalStorage, store::KeyValueStore},
    domain::Domain,
};

/// Server provided classification of domains. Keys are normalised the same way tab URLs are, so
/// a lookup with a resolved domain never misses because of a `www.` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMap(BTreeMap<Domain, Arc<str>>);

impl CategoryMap {
    pub fn category_of(&self, domain: &Domain) -> Option<&str> {
        self.0.get(domain).map(|v| &**v)
    }

    /// Entries in ascending domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&Domain, &str)> {
        self.0.iter().map(|(d, c)| (d, &**c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for CategoryMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        CategoryMap(
            iter.into_iter()
                .map(|(k, v)| (Domain::from_host(k.as_ref()), Arc::from(v.as_ref())))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        )
    }
}

/// Holds the map used for blocking decisions. A failed refresh keeps blocking working off the
/// last copy that made it to storage.
#[derive(Default)]
pub struct CategoryCache {
    map: CategoryMap,
}

impl CategoryCache {
    pub fn map(&self) -> &CategoryMap {
        &self.map
    }

    /// Loads the persisted copy, used at startup before the first fetch completes.
    pub async fn restore<S: KeyValueStore>(&mut self, storage: &LocalStorage<S>) -> Result<()> {
        if let Some(map) = storage.category_map().await? {
            debug!("Restored {} categorised domains from storage", map.len());
            self.map = map;
        }
        Ok(())
    }

    /// Applies the outcome of a fetch. Returns whether the map in use changed.
    pub async fn apply_fetch<S: KeyValueStore>(
        &mut self,
        fetched: Result<CategoryMap>,
        storage: &mut LocalStorage<S>,
    ) -> Result<bool> {
        match fetched {
            Ok(map) => {
                info!("Loaded {} categorised domains", map.len());
                let changed = map != self.map;
                if let Err(e) = storage.set_category_map(&map).await {
                    warn!("Couldn't persist category map: {e:?}");
                }
                self.map = map;
                Ok(changed)
            }
            Err(e) => {
                warn!("Couldn't fetch category map, falling back to cached copy: {e:?}");
                match storage.category_map().await? {
                    Some(stored) if stored != self.map => {
                        self.map = stored;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
        }
    }
}
