//! Periodic work that runs beside the tracker: refreshing the category map, polling the
//! server's focus status and checking usage alerts. Fetches happen here so a slow server never
//! holds up tab events; results reach the tracker as [TrackerEvent](super::tracker::TrackerEvent)s.

pub mod poller;

use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt};
use tracing::warn;

use crate::remote::TrackerApi;

use super::tracker::TrackerEvent;

pub fn category_job(
    api: Arc<dyn TrackerApi>,
) -> impl FnMut() -> BoxFuture<'static, Option<TrackerEvent>> {
    move || {
        let api = api.clone();
        async move { Some(TrackerEvent::CategoriesFetched(api.fetch_category_map().await)) }.boxed()
    }
}

pub fn focus_job(
    api: Arc<dyn TrackerApi>,
) -> impl FnMut() -> BoxFuture<'static, Option<TrackerEvent>> {
    move || {
        let api = api.clone();
        async move {
            match api.fetch_focus_status().await {
                Ok(status) => Some(TrackerEvent::FocusPolled(status)),
                Err(e) => {
                    // Keep the current session, the next poll will try again.
                    warn!("Couldn't poll focus status: {e:?}");
                    None
                }
            }
        }
        .boxed()
    }
}
