use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::domain::Domain;

use super::{blocked::BlockedPageParams, categories::CategoryMap, session::FocusSession};

/// Most dynamic rules a browser accepts for one extension.
pub const MAX_DYNAMIC_RULES: usize = 5000;

/// A redirect rule in the browser's declarativeNetRequest schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub redirect: Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

impl BlockingRule {
    /// `||domain` matches the domain and all of its subdomains on any scheme.
    fn redirecting(id: u32, params: &BlockedPageParams, blocked_page: &Url) -> Self {
        BlockingRule {
            id,
            priority: 1,
            action: RuleAction {
                kind: ActionType::Redirect,
                redirect: Redirect {
                    url: params.to_url(blocked_page).into(),
                },
            },
            condition: RuleCondition {
                url_filter: format!("||{}", params.domain),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    pub fn blocked_domain(&self) -> &str {
        self.condition.url_filter.trim_start_matches("||")
    }
}

/// Turns focus state into the full rule set. Pure, the output only depends on the inputs, which
/// is what makes remove-all-then-add replacement safe to repeat.
pub struct RuleSynthesizer {
    blocked_page: Url,
    max_rules: usize,
}

impl RuleSynthesizer {
    pub fn new(blocked_page: Url, max_rules: usize) -> Self {
        Self {
            blocked_page,
            max_rules: max_rules.min(MAX_DYNAMIC_RULES),
        }
    }

    /// Rules for every categorised domain whose category is blocked and that wasn't skipped,
    /// in ascending domain order with ids from 1. Domains past the cap are left unblocked.
    pub fn synthesize(&self, session: &FocusSession, map: &CategoryMap) -> Vec<BlockingRule> {
        if !session.is_active() {
            return vec![];
        }

        let blocked = map
            .iter()
            .filter(|(domain, category)| {
                session.blocks_category(category) && !session.is_skipped(domain)
            })
            .collect::<Vec<(&Domain, &str)>>();

        if blocked.len() > self.max_rules {
            warn!(
                "{} domains to block, only the first {} get a rule",
                blocked.len(),
                self.max_rules
            );
        }

        let rules = blocked
            .into_iter()
            .take(self.max_rules)
            .zip(1u32..)
            .map(|((domain, category), id)| {
                let params = BlockedPageParams {
                    domain: domain.clone(),
                    category: category.into(),
                    strict: session.strict_mode(),
                };
                BlockingRule::redirecting(id, &params, &self.blocked_page)
            })
            .collect::<Vec<_>>();
        debug!("Synthesized {} blocking rules", rules.len());
        rules
    }
}
