//! Contract with the browser's dynamic redirect rules. [RuleSink] mirrors the two calls a
//! browser exposes for dynamic rules, [ruleset::RulesetFile] is the implementation a browser
//! bridge picks up from disk.

pub mod ruleset;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::daemon::focus::rules::BlockingRule;

#[async_trait]
pub trait RuleSink: Send + Sync {
    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>>;

    /// Removes `remove_rule_ids` and adds `add_rules` as one update. Either both happen or
    /// neither does.
    async fn update_dynamic_rules(
        &mut self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockingRule>,
    ) -> Result<()>;
}

/// Swaps whatever rules are installed for `rules`. Nothing is diffed, every existing rule is
/// removed in the same update that adds the new set.
pub async fn replace_all_rules<R: RuleSink + ?Sized>(
    sink: &mut R,
    rules: Vec<BlockingRule>,
) -> Result<()> {
    let existing = sink.dynamic_rule_ids().await?;
    if existing.is_empty() && rules.is_empty() {
        return Ok(());
    }
    let (removed, added) = (existing.len(), rules.len());
    sink.update_dynamic_rules(existing, rules).await?;
    info!("Replaced {removed} blocking rules with {added}");
    Ok(())
}

#[cfg(test)]
pub use memory::MemoryRuleSink;
