use std::{collections::HashSet, path::PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    daemon::focus::rules::{BlockingRule, MAX_DYNAMIC_RULES},
    fs::operations::{overwrite_locked, read_locked},
};

use super::RuleSink;

/// Dynamic rules kept as a JSON array in the browser's rule schema. Updates are validated the
/// way a browser validates them, a rejected update leaves the file untouched.
pub struct RulesetFile {
    path: PathBuf,
    rules: Vec<BlockingRule>,
}

impl RulesetFile {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let rules = match read_locked(&path).await? {
            Some(content) if !content.trim().is_empty() => serde_json::from_str(&content)
                .with_context(|| format!("ruleset {path:?} is not a rule array"))?,
            _ => vec![],
        };
        Ok(Self { path, rules })
    }

    pub fn rules(&self) -> &[BlockingRule] {
        &self.rules
    }
}

#[async_trait]
impl RuleSink for RulesetFile {
    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>> {
        Ok(self.rules.iter().map(|r| r.id).collect())
    }

    async fn update_dynamic_rules(
        &mut self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockingRule>,
    ) -> Result<()> {
        let mut next = self
            .rules
            .iter()
            .filter(|r| !remove_rule_ids.contains(&r.id))
            .cloned()
            .collect::<Vec<_>>();
        next.extend(add_rules);

        let mut ids = HashSet::new();
        for rule in &next {
            if rule.id == 0 {
                bail!("rule id must be at least 1");
            }
            if !ids.insert(rule.id) {
                bail!("duplicate rule id {}", rule.id);
            }
        }
        if next.len() > MAX_DYNAMIC_RULES {
            bail!(
                "{} rules exceed the quota of {MAX_DYNAMIC_RULES}",
                next.len()
            );
        }

        overwrite_locked(&self.path, &serde_json::to_vec_pretty(&next)?).await?;
        debug!("Wrote {} rules to {:?}", next.len(), self.path);
        self.rules = next;
        Ok(())
    }
}
