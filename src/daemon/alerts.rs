//! Usage-limit alerts. The server decides whether a limit was crossed, this side only asks and
//! raises a notification.

use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    domain::Domain,
    remote::{responses::AlertResponse, TrackerApi},
    utils::logging::NOTIFICATION_TARGET,
};

use super::{ipc::messages::Reply, tracker::TrackerEvent};

pub fn notify(title: &str, message: &str) {
    info!(target: NOTIFICATION_TARGET, title, "{message}");
}

/// Asks about every category of the user. Returns how many notifications were raised.
pub async fn check_usage_alerts(api: &dyn TrackerApi, user_id: u64) -> usize {
    let categories = match api.fetch_categories(user_id).await {
        Ok(categories) => categories,
        Err(e) => {
            warn!("Couldn't fetch categories for alerts: {e:?}");
            return 0;
        }
    };

    let mut raised = 0;
    for category in categories {
        match api.check_category_alert(user_id, category.id).await {
            Ok(AlertResponse {
                alert: true,
                message: Some(message),
            }) => {
                notify(&category.name, &message);
                raised += 1;
            }
            Ok(_) => {}
            Err(e) => warn!("Alert check for {} failed: {e:?}", category.name),
        }
    }
    raised
}

/// Answers the bridge's question whether the page it just opened is over a limit. Without a
/// signed in user, or when the server can't be reached, the answer is no.
pub async fn check_domain_alert(
    api: &dyn TrackerApi,
    user_id: Option<u64>,
    domain: Domain,
) -> Reply {
    let Some(user_id) = user_id else {
        debug!("No user signed in, {domain} is not checked");
        return Reply::ok("not signed in").with_data(json!({ "alerta": false }));
    };
    match api.check_domain_alert(user_id, domain.clone()).await {
        Ok(response) => {
            if response.alert {
                if let Some(message) = &response.message {
                    notify(&domain, message);
                }
            }
            Reply::ok("checked").with_data(json!({
                "alerta": response.alert,
                "mensaje": response.message,
            }))
        }
        Err(e) => {
            warn!("Alert check for {domain} failed: {e:?}");
            Reply::failure("alert check failed").with_data(json!({ "alerta": false }))
        }
    }
}

/// Polling job for alerts. Skips the round while nobody is signed in.
pub fn alert_job(
    api: Arc<dyn TrackerApi>,
    user: watch::Receiver<Option<u64>>,
) -> impl FnMut() -> BoxFuture<'static, Option<TrackerEvent>> {
    move || {
        let api = api.clone();
        let user_id = *user.borrow();
        async move {
            match user_id {
                Some(user_id) => {
                    check_usage_alerts(&*api, user_id).await;
                }
                None => debug!("No user signed in, skipping alert check"),
            }
            None
        }
        .boxed()
    }
}
