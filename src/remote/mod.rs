//! The tracker's view of the TiempoCheck server. [TrackerApi] is the contract, [http] talks to
//! the real thing.

pub mod http;
pub mod responses;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    daemon::{accumulator::TimeReport, focus::categories::CategoryMap},
    domain::Domain,
};

use responses::{AlertResponse, Category, FocusStatus};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Reports one flushed interval. Fire-and-forget for the caller, never retried.
    async fn log_time(&self, report: TimeReport) -> Result<()>;

    async fn fetch_category_map(&self) -> Result<CategoryMap>;

    async fn fetch_focus_status(&self) -> Result<FocusStatus>;

    /// Records that the user bypassed a block during a non-strict session.
    async fn report_skip(&self, domain: Domain, category: Option<Arc<str>>) -> Result<()>;

    async fn fetch_categories(&self, user_id: u64) -> Result<Vec<Category>>;

    async fn check_category_alert(&self, user_id: u64, category_id: i64) -> Result<AlertResponse>;

    async fn check_domain_alert(&self, user_id: u64, domain: Domain) -> Result<AlertResponse>;
}
