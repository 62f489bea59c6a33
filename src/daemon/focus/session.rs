use std::{collections::BTreeSet, sync::Arc};

use thiserror::Error;

use crate::domain::Domain;

/// A desired focus state, from the dashboard's start/end message or from the server's status
/// endpoint. Both sources go through [FocusSession::reconcile].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusUpdate {
    Activate {
        categories: Vec<String>,
        strict: bool,
        session_id: Option<String>,
    },
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activated,
    /// Still active, but categories, strictness or session changed.
    Updated,
    Deactivated,
    Unchanged,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkipRefused {
    #[error("no focus session is active")]
    Inactive,
    #[error("strict mode does not allow skipping blocks")]
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusSession {
    active: bool,
    blocked_categories: BTreeSet<Arc<str>>,
    strict_mode: bool,
    session_id: Option<Arc<str>>,
    skipped_domains: BTreeSet<Domain>,
}

impl FocusSession {
    pub(crate) fn restored(
        categories: Vec<Arc<str>>,
        strict_mode: bool,
        session_id: Option<Arc<str>>,
    ) -> Self {
        Self {
            active: true,
            blocked_categories: categories.into_iter().collect(),
            strict_mode,
            session_id,
            skipped_domains: BTreeSet::new(),
        }
    }

    /// The only place the session changes state. Deactivating wipes every field. While the
    /// session stays active the skipped domains are kept, unless the update names a different
    /// session than the known one. An update without an id keeps the id already known.
    pub fn reconcile(&mut self, update: FocusUpdate) -> Transition {
        let next = match update {
            FocusUpdate::Deactivate => FocusSession::default(),
            FocusUpdate::Activate {
                categories,
                strict,
                session_id,
            } => {
                let session_id = session_id.map(Arc::<str>::from);
                let same_session = self.active
                    && match (&self.session_id, &session_id) {
                        (Some(known), Some(reported)) => known == reported,
                        _ => true,
                    };
                let session_id = match session_id {
                    Some(id) => Some(id),
                    None if self.active => self.session_id.clone(),
                    None => None,
                };
                FocusSession {
                    active: true,
                    blocked_categories: categories.into_iter().map(Arc::<str>::from).collect(),
                    strict_mode: strict,
                    session_id,
                    skipped_domains: if same_session {
                        self.skipped_domains.clone()
                    } else {
                        BTreeSet::new()
                    },
                }
            }
        };

        let transition = match (self.active, next.active) {
            (false, true) => Transition::Activated,
            (true, false) => Transition::Deactivated,
            (true, true) if *self != next => Transition::Updated,
            _ => Transition::Unchanged,
        };
        *self = next;
        transition
    }

    /// Lets one domain through for the rest of the session. Returns `false` when it was already
    /// skipped.
    pub fn skip(&mut self, domain: Domain) -> Result<bool, SkipRefused> {
        if !self.active {
            return Err(SkipRefused::Inactive);
        }
        if self.strict_mode {
            return Err(SkipRefused::Strict);
        }
        Ok(self.skipped_domains.insert(domain))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn blocks_category(&self, category: &str) -> bool {
        self.blocked_categories.contains(category)
    }

    pub fn is_skipped(&self, domain: &Domain) -> bool {
        self.skipped_domains.contains(domain)
    }

    pub fn blocked_categories(&self) -> impl Iterator<Item = &str> {
        self.blocked_categories.iter().map(|v| &**v)
    }

    pub fn skipped_domains(&self) -> impl Iterator<Item = &Domain> {
        self.skipped_domains.iter()
    }
}
