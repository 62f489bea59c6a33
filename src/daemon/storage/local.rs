use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use crate::{
    daemon::focus::{categories::CategoryMap, session::FocusSession},
    domain::Domain,
    utils::time::{date_key, parse_date_key},
};

use super::{
    keys::{self, is_domain_key},
    store::KeyValueStore,
};

/// Typed view over a [KeyValueStore]. Values that fail to decode are treated as absent, the store
/// is shared with older versions of the tracker and is not schema-checked.
pub struct LocalStorage<S> {
    store: S,
}

impl<S: KeyValueStore> LocalStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!("Ignoring undecodable value under {key:?}: {e}");
                Ok(None)
            }
        }
    }

    pub async fn total(&self, domain: &Domain) -> Result<u64> {
        Ok(self.read::<u64>(domain.as_str()).await?.unwrap_or(0))
    }

    pub async fn set_total(&mut self, domain: &Domain, seconds: u64) -> Result<()> {
        self.store
            .set(vec![(domain.to_string(), json!(seconds))])
            .await
    }

    pub async fn history(&self) -> Result<Vec<Domain>> {
        Ok(self
            .read::<Vec<Domain>>(keys::HISTORY_DOMAINS)
            .await?
            .unwrap_or_default())
    }

    /// Appends the domain unless it is already present. Entries are never removed except by a
    /// daily reset or a full clear.
    pub async fn push_history(&mut self, domain: &Domain) -> Result<()> {
        let mut history = self.history().await?;
        if history.contains(domain) {
            return Ok(());
        }
        history.push(domain.clone());
        self.store
            .set(vec![(keys::HISTORY_DOMAINS.into(), json!(history))])
            .await
    }

    /// Totals of every domain seen, in history order.
    pub async fn totals(&self) -> Result<Vec<(Domain, u64)>> {
        let mut totals = vec![];
        for domain in self.history().await? {
            let seconds = self.total(&domain).await?;
            totals.push((domain, seconds));
        }
        Ok(totals)
    }

    /// Drops every per-domain total and the history list, keeping focus and category state.
    pub async fn clear_totals(&mut self) -> Result<()> {
        let all = self.store.get_all().await?;
        let mut doomed = all
            .iter()
            .filter(|(key, value)| is_domain_key(key) && value.is_number())
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        doomed.push(keys::HISTORY_DOMAINS);
        self.store.remove(&doomed).await
    }

    pub async fn category_map(&self) -> Result<Option<CategoryMap>> {
        self.read(keys::CATEGORY_MAP).await
    }

    pub async fn set_category_map(&mut self, map: &CategoryMap) -> Result<()> {
        self.store
            .set(vec![(keys::CATEGORY_MAP.into(), serde_json::to_value(map)?)])
            .await
    }

    pub async fn save_focus(&mut self, session: &FocusSession) -> Result<()> {
        self.store
            .set(vec![
                (keys::FOCUS_ACTIVE.into(), json!(true)),
                (
                    keys::BLOCKED_CATEGORIES.into(),
                    json!(session.blocked_categories().collect::<Vec<_>>()),
                ),
                (keys::STRICT_MODE.into(), json!(session.strict_mode())),
                (keys::SESSION_ID.into(), json!(session.session_id())),
            ])
            .await
    }

    pub async fn clear_focus(&mut self) -> Result<()> {
        self.store.remove(&keys::FOCUS_KEYS).await
    }

    /// Restores an active session persisted by a previous run. Skipped domains are not part of
    /// the persisted state.
    pub async fn load_focus(&self) -> Result<Option<FocusSession>> {
        if !self.read::<bool>(keys::FOCUS_ACTIVE).await?.unwrap_or(false) {
            return Ok(None);
        }
        let categories = self
            .read::<Vec<Arc<str>>>(keys::BLOCKED_CATEGORIES)
            .await?
            .unwrap_or_default();
        let strict = self.read::<bool>(keys::STRICT_MODE).await?.unwrap_or(false);
        let session_id = self.read::<Option<Arc<str>>>(keys::SESSION_ID).await?.flatten();
        Ok(Some(FocusSession::restored(categories, strict, session_id)))
    }

    pub async fn user_id(&self) -> Result<Option<u64>> {
        self.read(keys::USER_ID).await
    }

    pub async fn set_user_id(&mut self, user_id: Option<u64>) -> Result<()> {
        match user_id {
            Some(id) => self.store.set(vec![(keys::USER_ID.into(), json!(id))]).await,
            None => self.store.remove(&[keys::USER_ID]).await,
        }
    }

    pub async fn last_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .read::<String>(keys::LAST_DATE)
            .await?
            .and_then(|v| parse_date_key(&v)))
    }

    pub async fn set_last_date(&mut self, date: NaiveDate) -> Result<()> {
        self.store
            .set(vec![(keys::LAST_DATE.into(), Value::String(date_key(date)))])
            .await
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.store.clear().await
    }
}
