//! The tracker owns every piece of mutable state: the time accumulator, the focus session, the
//! category map and the installed rules. Everything else talks to it through [TrackerEvent]s,
//! so state changes happen one at a time and in arrival order.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures::{future::BoxFuture, FutureExt};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    browser_api::{replace_all_rules, RuleSink},
    domain::Domain,
    remote::{responses::FocusStatus, TrackerApi},
    utils::clock::Clock,
};

use super::{
    accumulator::TimeAccumulator,
    alerts::check_domain_alert,
    focus::{
        categories::{CategoryCache, CategoryMap},
        rules::RuleSynthesizer,
        session::{FocusSession, FocusUpdate, Transition},
    },
    ipc::messages::{
        DomainTotal, FocusCommand, InternalRequest, LegacyRequest, Reply, Request, StatusSnapshot,
    },
    storage::{local::LocalStorage, store::KeyValueStore},
};

#[derive(Debug)]
pub enum TrackerEvent {
    Request {
        request: Request,
        reply: oneshot::Sender<Reply>,
    },
    CategoriesFetched(Result<CategoryMap>),
    FocusPolled(FocusStatus),
}

/// A reply that is ready, or one that only waits on the server and is awaited off the loop.
enum Answer {
    Now(Reply),
    Later(BoxFuture<'static, Reply>),
}

pub struct Tracker<S, R> {
    storage: LocalStorage<S>,
    rules: R,
    api: Arc<dyn TrackerApi>,
    clock: Arc<dyn Clock>,
    accumulator: TimeAccumulator,
    focus: FocusSession,
    categories: CategoryCache,
    synthesizer: RuleSynthesizer,
    user: watch::Sender<Option<u64>>,
    rule_count: usize,
    remaining_minutes: Option<f64>,
    fetched: mpsc::UnboundedSender<Result<CategoryMap>>,
    fetch_results: mpsc::UnboundedReceiver<Result<CategoryMap>>,
}

impl<S: KeyValueStore, R: RuleSink> Tracker<S, R> {
    pub fn new(
        storage: LocalStorage<S>,
        rules: R,
        api: Arc<dyn TrackerApi>,
        clock: Arc<dyn Clock>,
        accumulator: TimeAccumulator,
        synthesizer: RuleSynthesizer,
        user: watch::Sender<Option<u64>>,
    ) -> Self {
        let (fetched, fetch_results) = mpsc::unbounded_channel();
        Self {
            storage,
            rules,
            api,
            clock,
            accumulator,
            focus: FocusSession::default(),
            categories: CategoryCache::default(),
            synthesizer,
            user,
            rule_count: 0,
            remaining_minutes: None,
            fetched,
            fetch_results,
        }
    }

    /// Picks up where the previous run stopped: persisted focus session, cached category map and
    /// signed in user. A user id from the configuration wins over the stored one.
    pub async fn restore(&mut self, configured_user: Option<u64>) -> Result<()> {
        self.categories.restore(&self.storage).await?;
        if let Some(session) = self.storage.load_focus().await? {
            info!(
                "Resuming focus session {:?}",
                session.session_id().unwrap_or("without id")
            );
            self.focus = session;
        }

        let user = match configured_user {
            Some(user) => Some(user),
            None => self.storage.user_id().await?,
        };
        self.user.send_replace(user);

        self.roll_day().await;
        self.recompute_rules().await;
        Ok(())
    }

    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<TrackerEvent>,
        shutdown: CancellationToken,
        flush_interval: Duration,
    ) -> Result<()> {
        let mut flush_point = self.clock.instant() + flush_interval;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                Some(fetched) = self.fetch_results.recv() => {
                    self.handle(TrackerEvent::CategoriesFetched(fetched)).await;
                }
                _ = self.clock.sleep_until(flush_point) => {
                    flush_point += flush_interval;
                    self.tick().await;
                }
            }
        }

        info!("Tracker stopping, flushing current interval");
        self.flush(false).await;
        Ok(())
    }

    pub async fn handle(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Request { request, reply } => match self.handle_request(request).await {
                Answer::Now(answer) => {
                    if reply.send(answer).is_err() {
                        debug!("Requester went away before the reply");
                    }
                }
                Answer::Later(answer) => {
                    tokio::spawn(async move {
                        let _ = reply.send(answer.await);
                    });
                }
            },
            TrackerEvent::CategoriesFetched(fetched) => {
                if self.apply_categories(fetched).await {
                    self.recompute_rules().await;
                }
            }
            TrackerEvent::FocusPolled(status) => {
                let remaining = status.remaining_minutes;
                self.reconcile_focus(status.into()).await;
                if self.focus.is_active() {
                    self.remaining_minutes = remaining;
                }
            }
        }
    }

    async fn handle_request(&mut self, request: Request) -> Answer {
        match request {
            Request::Focus(command @ FocusCommand::Start { .. }) => {
                // Block off the cached map right away, the fresh one arrives as its own event.
                self.refresh_categories();
                self.reconcile_focus(command.into()).await;
                Answer::Now(Reply::ok("Focus activated"))
            }
            Request::Focus(command @ FocusCommand::End { .. }) => {
                self.reconcile_focus(command.into()).await;
                Answer::Now(Reply::ok("Focus deactivated"))
            }
            Request::Internal(request) => self.handle_internal(request).await,
            Request::Legacy(LegacyRequest::ResetStorage) => {
                Answer::Now(self.reset_storage().await)
            }
        }
    }

    async fn handle_internal(&mut self, request: InternalRequest) -> Answer {
        let reply = match request {
            InternalRequest::TabActivated { url } | InternalRequest::WindowFocusChanged { url } => {
                self.flush(false).await;
                self.observe(url.as_deref()).await;
                Reply::ok("tracked")
            }
            InternalRequest::TabUpdated { url, status } => {
                if status.as_deref() == Some("complete") {
                    self.observe(url.as_deref()).await;
                }
                Reply::ok("tracked")
            }
            InternalRequest::Suspend => {
                self.flush(false).await;
                Reply::ok("flushed")
            }
            InternalRequest::SkipDomain { domain } => self.skip_domain(&domain).await,
            InternalRequest::ResetStorage => self.reset_storage().await,
            InternalRequest::CheckAlert { domain } => {
                let api = self.api.clone();
                let user = *self.user.borrow();
                let domain = Domain::from_host(&domain);
                return Answer::Later(
                    async move { check_domain_alert(&*api, user, domain).await }.boxed(),
                );
            }
            InternalRequest::SetUser { user_id } => {
                if let Err(e) = self.storage.set_user_id(user_id).await {
                    warn!("Couldn't persist user id: {e:?}");
                }
                self.user.send_replace(user_id);
                info!("Signed in user is now {user_id:?}");
                Reply::ok("user updated")
            }
            InternalRequest::Status => match serde_json::to_value(self.status().await) {
                Ok(data) => Reply::ok("status").with_data(data),
                Err(e) => Reply::failure(format!("couldn't encode status: {e}")),
            },
        };
        Answer::Now(reply)
    }

    /// Fetches the category map without holding up the event loop. The result comes back
    /// through `fetch_results` and is applied like a poller refresh.
    fn refresh_categories(&self) {
        let api = self.api.clone();
        let fetched = self.fetched.clone();
        tokio::spawn(async move {
            let _ = fetched.send(api.fetch_category_map().await);
        });
    }

    async fn observe(&mut self, url: Option<&str>) {
        let now = self.clock.time();
        if let Err(e) = self.accumulator.observe(url, now, &mut self.storage).await {
            warn!("Couldn't switch tracked domain: {e:?}");
        }
    }

    async fn flush(&mut self, force: bool) {
        let now = self.clock.time();
        if let Err(e) = self.accumulator.flush(force, now, &mut self.storage).await {
            warn!("Flush failed: {e:?}");
        }
    }

    /// Periodic work between events: a forced flush, after checking whether the day changed.
    pub async fn tick(&mut self) {
        self.roll_day().await;
        self.flush(true).await;
    }

    /// Clears stored totals and history the first time the tracker runs on a new local date.
    async fn roll_day(&mut self) {
        let today = self.clock.local_date();
        let last = match self.storage.last_date().await {
            Ok(last) => last,
            Err(e) => {
                warn!("Couldn't read last active date: {e:?}");
                return;
            }
        };
        match last {
            Some(last) if last == today => return,
            Some(last) => {
                info!("New day {today}, clearing totals of {last}");
                if let Err(e) = self.storage.clear_totals().await {
                    warn!("Couldn't clear totals: {e:?}");
                    return;
                }
                self.accumulator.reset_totals();
            }
            None => {}
        }
        if let Err(e) = self.storage.set_last_date(today).await {
            warn!("Couldn't store last active date: {e:?}");
        }
    }

    async fn apply_categories(&mut self, fetched: Result<CategoryMap>) -> bool {
        match self.categories.apply_fetch(fetched, &mut self.storage).await {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Couldn't update category map: {e:?}");
                false
            }
        }
    }

    async fn reconcile_focus(&mut self, update: FocusUpdate) {
        let persisted = match self.focus.reconcile(update) {
            Transition::Activated | Transition::Updated => {
                info!(
                    "Focus session {:?} blocks {:?} (strict: {})",
                    self.focus.session_id(),
                    self.focus.blocked_categories().collect::<Vec<_>>(),
                    self.focus.strict_mode()
                );
                self.storage.save_focus(&self.focus).await
            }
            Transition::Deactivated => {
                info!("Focus session ended");
                self.remaining_minutes = None;
                self.storage.clear_focus().await
            }
            Transition::Unchanged => return,
        };
        if let Err(e) = persisted {
            warn!("Couldn't persist focus session: {e:?}");
        }
        self.recompute_rules().await;
    }

    async fn skip_domain(&mut self, domain: &str) -> Reply {
        let domain = Domain::from_host(domain);
        if domain.is_empty() {
            return Reply::failure("no domain to skip");
        }
        match self.focus.skip(domain.clone()) {
            Err(refused) => {
                info!("Refusing to skip {domain}: {refused}");
                Reply::failure(refused.to_string())
            }
            Ok(newly_skipped) => {
                if newly_skipped {
                    info!("Skipping {domain} for the rest of the session");
                    self.recompute_rules().await;

                    let category = self
                        .categories
                        .map()
                        .category_of(&domain)
                        .map(Arc::<str>::from);
                    let api = self.api.clone();
                    let reported = domain.clone();
                    tokio::spawn(async move {
                        if let Err(e) = api.report_skip(reported.clone(), category).await {
                            warn!("Couldn't report skip of {reported}: {e:?}");
                        }
                    });
                }
                Reply::ok("Domain skipped")
                    .with_data(json!({ "redirect": format!("https://{domain}") }))
            }
        }
    }

    async fn reset_storage(&mut self) -> Reply {
        if let Err(e) = self.storage.clear().await {
            error!("Couldn't clear storage: {e:?}");
            return Reply::failure("couldn't clear storage");
        }
        self.accumulator.reset_totals();
        self.user.send_replace(None);

        // The session and the map mirror the server, keep them across a reset.
        if self.focus.is_active() {
            if let Err(e) = self.storage.save_focus(&self.focus).await {
                warn!("Couldn't persist focus session: {e:?}");
            }
        }
        if !self.categories.map().is_empty() {
            if let Err(e) = self.storage.set_category_map(self.categories.map()).await {
                warn!("Couldn't persist category map: {e:?}");
            }
        }
        info!("Local storage cleared");
        Reply::ok("storage cleared")
    }

    async fn recompute_rules(&mut self) {
        let rules = self.synthesizer.synthesize(&self.focus, self.categories.map());
        let count = rules.len();
        match replace_all_rules(&mut self.rules, rules).await {
            Ok(()) => self.rule_count = count,
            Err(e) => error!("Couldn't update blocking rules: {e:?}"),
        }
    }

    async fn status(&self) -> StatusSnapshot {
        let totals = match self.storage.totals().await {
            Ok(totals) => totals,
            Err(e) => {
                warn!("Couldn't read totals: {e:?}");
                vec![]
            }
        };
        StatusSnapshot {
            tracking: self.accumulator.current().map(|t| t.domain.to_string()),
            pending_seconds: self.accumulator.pending_seconds(self.clock.time()),
            focus_active: self.focus.is_active(),
            strict_mode: self.focus.strict_mode(),
            session_id: self.focus.session_id().map(str::to_owned),
            remaining_minutes: self.remaining_minutes,
            blocked_categories: self.focus.blocked_categories().map(str::to_owned).collect(),
            skipped_domains: self.focus.skipped_domains().map(|d| d.to_string()).collect(),
            rule_count: self.rule_count,
            categorised_domains: self.categories.map().len(),
            user_id: *self.user.borrow(),
            totals: totals
                .into_iter()
                .map(|(domain, seconds)| DomainTotal {
                    domain: domain.to_string(),
                    seconds,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tokio::sync::{
        mpsc::{self, UnboundedReceiver},
        Notify,
    };
    use url::Url;

    use crate::{
        browser_api::MemoryRuleSink,
        daemon::{
            accumulator::{AccumulatorSettings, TimeReport},
            focus::rules::MAX_DYNAMIC_RULES,
            ipc::messages::StartData,
            storage::{keys, store::MemoryStore},
        },
        remote::{
            responses::{AlertResponse, Category},
            MockTrackerApi,
        },
        utils::clock::test_clock::TestClock,
    };

    use super::*;

    fn category_map() -> CategoryMap {
        [
            ("facebook.com", "Social"),
            ("wikipedia.org", "Education"),
            ("youtube.com", "Video"),
        ]
        .into_iter()
        .collect()
    }

    /// Api that always serves [category_map] and accepts skip reports.
    fn api() -> MockTrackerApi {
        let mut api = MockTrackerApi::new();
        api.expect_fetch_category_map()
            .returning(|| Ok(category_map()));
        api.expect_report_skip().returning(|_, _| Ok(()));
        api
    }

    /// Serves [category_map] only once the test releases the gate.
    struct GatedApi {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TrackerApi for GatedApi {
        async fn log_time(&self, _report: TimeReport) -> Result<()> {
            Ok(())
        }

        async fn fetch_category_map(&self) -> Result<CategoryMap> {
            self.gate.notified().await;
            Ok(category_map())
        }

        async fn fetch_focus_status(&self) -> Result<FocusStatus> {
            Err(anyhow!("not served"))
        }

        async fn report_skip(&self, _domain: Domain, _category: Option<Arc<str>>) -> Result<()> {
            Ok(())
        }

        async fn fetch_categories(&self, _user_id: u64) -> Result<Vec<Category>> {
            Err(anyhow!("not served"))
        }

        async fn check_category_alert(&self, _user_id: u64, _id: i64) -> Result<AlertResponse> {
            Err(anyhow!("not served"))
        }

        async fn check_domain_alert(
            &self,
            _user_id: u64,
            _domain: Domain,
        ) -> Result<AlertResponse> {
            Err(anyhow!("not served"))
        }
    }

    struct Fixture {
        tracker: Tracker<MemoryStore, MemoryRuleSink>,
        store: MemoryStore,
        sink: MemoryRuleSink,
        clock: TestClock,
        reports: UnboundedReceiver<TimeReport>,
        user: watch::Receiver<Option<u64>>,
    }

    impl Fixture {
        async fn new(api: MockTrackerApi) -> Self {
            Self::with_store(api, MemoryStore::default()).await
        }

        async fn with_store(api: MockTrackerApi, store: MemoryStore) -> Self {
            Self::build(Arc::new(api), store).await
        }

        async fn build(api: Arc<dyn TrackerApi>, store: MemoryStore) -> Self {
            let clock = TestClock::starting_2025();
            let sink = MemoryRuleSink::default();
            let (sender, reports) = mpsc::unbounded_channel();
            let (user_sender, user) = watch::channel(None);
            let mut tracker = Tracker::new(
                LocalStorage::new(store.clone()),
                sink.clone(),
                api,
                Arc::new(clock.clone()),
                TimeAccumulator::new(AccumulatorSettings::default(), sender),
                RuleSynthesizer::new(
                    Url::parse("chrome-extension://test/blocked.html").unwrap(),
                    MAX_DYNAMIC_RULES,
                ),
                user_sender,
            );
            tracker.restore(None).await.unwrap();
            Self {
                tracker,
                store,
                sink,
                clock,
                reports,
                user,
            }
        }

        async fn send(&mut self, request: Request) -> Reply {
            let (reply, answer) = oneshot::channel();
            self.tracker
                .handle(TrackerEvent::Request { request, reply })
                .await;
            answer.await.unwrap()
        }

        async fn start(&mut self, categories: &[&str], strict: bool, session_id: &str) -> Reply {
            self.start_with(categories, strict, Some(session_id)).await
        }

        /// Starts a session and applies the category fetch it triggers.
        async fn start_with(
            &mut self,
            categories: &[&str],
            strict: bool,
            session_id: Option<&str>,
        ) -> Reply {
            let reply = self.send(start_request(categories, strict, session_id)).await;
            self.apply_fetch().await;
            reply
        }

        async fn apply_fetch(&mut self) {
            let fetched = self.tracker.fetch_results.recv().await.unwrap();
            self.tracker
                .handle(TrackerEvent::CategoriesFetched(fetched))
                .await;
        }

        async fn internal(&mut self, request: InternalRequest) -> Reply {
            self.send(Request::Internal(request)).await
        }

        async fn tab(&mut self, url: &str) {
            self.internal(InternalRequest::TabActivated {
                url: Some(url.into()),
            })
            .await;
        }

        fn drain(&mut self) -> Vec<TimeReport> {
            let mut out = vec![];
            while let Ok(report) = self.reports.try_recv() {
                out.push(report);
            }
            out
        }
    }

    fn start_request(categories: &[&str], strict: bool, session_id: Option<&str>) -> Request {
        Request::Focus(FocusCommand::Start {
            data: StartData {
                categorias: categories.iter().map(|c| c.to_string()).collect(),
                strict,
                session_id: session_id.map(str::to_owned),
            },
        })
    }

    fn active(categories: &[&str], strict: bool, session_id: &str) -> FocusStatus {
        FocusStatus {
            success: true,
            active: true,
            blocked_categories: categories.iter().map(|c| c.to_string()).collect(),
            strict_mode: strict,
            session_id: Some(session_id.into()),
            remaining_minutes: Some(25.0),
        }
    }

    fn inactive() -> FocusStatus {
        FocusStatus {
            success: true,
            ..FocusStatus::default()
        }
    }

    #[tokio::test]
    async fn start_blocks_only_listed_categories() {
        let mut f = Fixture::new(api()).await;

        let reply = f.start(&["Social", "Education"], false, "1").await;
        assert!(reply.success);
        let mut blocked = f.sink.blocked_domains();
        blocked.sort();
        assert_eq!(blocked, vec!["facebook.com", "wikipedia.org"]);

        let reply = f.send(Request::Focus(FocusCommand::End { data: None })).await;
        assert!(reply.success);
        assert!(f.sink.rules().is_empty());
        assert!(f.store.snapshot().get(keys::FOCUS_ACTIVE).is_none());
    }

    #[tokio::test]
    async fn skip_lifts_one_block_and_reports_it() {
        let mut api = MockTrackerApi::new();
        api.expect_fetch_category_map()
            .returning(|| Ok(category_map()));
        api.expect_report_skip()
            .withf(|domain, category| {
                domain.as_str() == "facebook.com" && category.as_deref() == Some("Social")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut f = Fixture::new(api).await;
        f.start(&["Social", "Education"], false, "1").await;

        let reply = f
            .internal(InternalRequest::SkipDomain {
                domain: "facebook.com".into(),
            })
            .await;
        assert!(reply.success);
        assert_eq!(
            reply.data.unwrap()["redirect"],
            json!("https://facebook.com")
        );
        assert_eq!(f.sink.blocked_domains(), vec!["wikipedia.org"]);

        // Skipping twice is not reported twice.
        f.internal(InternalRequest::SkipDomain {
            domain: "facebook.com".into(),
        })
        .await;
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn strict_session_refuses_skips() {
        let mut api = MockTrackerApi::new();
        api.expect_fetch_category_map()
            .returning(|| Ok(category_map()));
        api.expect_report_skip().never();
        let mut f = Fixture::new(api).await;
        f.start(&["Social"], true, "1").await;

        let reply = f
            .internal(InternalRequest::SkipDomain {
                domain: "facebook.com".into(),
            })
            .await;
        assert!(!reply.success);
        assert_eq!(f.sink.blocked_domains(), vec!["facebook.com"]);
    }

    #[tokio::test]
    async fn skip_without_session_is_refused() {
        let mut f = Fixture::new(api()).await;
        let reply = f
            .internal(InternalRequest::SkipDomain {
                domain: "facebook.com".into(),
            })
            .await;
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn repeated_poll_does_not_touch_rules() {
        let mut f = Fixture::new(api()).await;
        f.tracker
            .handle(TrackerEvent::CategoriesFetched(Ok(category_map())))
            .await;

        f.tracker
            .handle(TrackerEvent::FocusPolled(active(&["Video"], false, "7")))
            .await;
        let updates = f.sink.updates();
        assert_eq!(f.sink.blocked_domains(), vec!["youtube.com"]);

        f.tracker
            .handle(TrackerEvent::FocusPolled(active(&["Video"], false, "7")))
            .await;
        assert_eq!(f.sink.updates(), updates);
    }

    #[tokio::test]
    async fn poll_keeps_skips_of_the_same_session_only() {
        let mut f = Fixture::new(api()).await;
        f.start(&["Social", "Video"], false, "7").await;
        f.internal(InternalRequest::SkipDomain {
            domain: "youtube.com".into(),
        })
        .await;

        f.tracker
            .handle(TrackerEvent::FocusPolled(active(&["Social", "Video"], false, "7")))
            .await;
        assert_eq!(f.sink.blocked_domains(), vec!["facebook.com"]);

        f.tracker
            .handle(TrackerEvent::FocusPolled(active(&["Social", "Video"], false, "8")))
            .await;
        let mut blocked = f.sink.blocked_domains();
        blocked.sort();
        assert_eq!(blocked, vec!["facebook.com", "youtube.com"]);
    }

    #[tokio::test]
    async fn skip_survives_poll_that_first_reports_the_session_id() {
        let mut f = Fixture::new(api()).await;
        f.start_with(&["Social", "Video"], false, None).await;
        f.internal(InternalRequest::SkipDomain {
            domain: "facebook.com".into(),
        })
        .await;
        assert_eq!(f.sink.blocked_domains(), vec!["youtube.com"]);

        f.tracker
            .handle(TrackerEvent::FocusPolled(active(&["Social", "Video"], false, "42")))
            .await;
        assert_eq!(f.sink.blocked_domains(), vec!["youtube.com"]);
        assert_eq!(f.tracker.focus.session_id(), Some("42"));
    }

    #[tokio::test]
    async fn poll_reports_time_left() {
        let mut f = Fixture::new(api()).await;
        f.tracker
            .handle(TrackerEvent::FocusPolled(active(&["Video"], false, "7")))
            .await;
        let reply = f.internal(InternalRequest::Status).await;
        assert_eq!(reply.data.unwrap()["remaining_minutes"], json!(25.0));

        f.tracker.handle(TrackerEvent::FocusPolled(inactive())).await;
        let reply = f.internal(InternalRequest::Status).await;
        assert_eq!(reply.data.unwrap()["remaining_minutes"], json!(null));
    }

    #[tokio::test]
    async fn start_does_not_wait_for_the_category_fetch() {
        let gate = Arc::new(Notify::new());
        let store = MemoryStore::default();
        LocalStorage::new(store.clone())
            .set_category_map(&CategoryMap::from_iter([("facebook.com", "Social")]))
            .await
            .unwrap();
        let mut f = Fixture::build(Arc::new(GatedApi { gate: gate.clone() }), store).await;

        let reply = tokio::time::timeout(
            Duration::from_secs(5),
            f.send(start_request(&["Social", "Video"], false, Some("1"))),
        )
        .await
        .expect("start waited for the fetch");
        assert!(reply.success);
        assert_eq!(f.sink.blocked_domains(), vec!["facebook.com"]);

        // Tab events keep flowing while the fetch is outstanding.
        f.tab("https://a.com").await;
        assert_eq!(
            f.tracker.accumulator.current().map(|t| t.domain.as_str()),
            Some("a.com")
        );

        gate.notify_one();
        f.apply_fetch().await;
        let mut blocked = f.sink.blocked_domains();
        blocked.sort();
        assert_eq!(blocked, vec!["facebook.com", "youtube.com"]);
    }

    #[tokio::test]
    async fn inactive_poll_ends_session() {
        let mut f = Fixture::new(api()).await;
        f.start(&["Social"], false, "1").await;

        f.tracker.handle(TrackerEvent::FocusPolled(inactive())).await;
        assert!(f.sink.rules().is_empty());
        let reply = f.internal(InternalRequest::Status).await;
        assert_eq!(reply.data.unwrap()["focus_active"], json!(false));
    }

    #[tokio::test]
    async fn failed_start_fetch_uses_cached_map() {
        let mut api = MockTrackerApi::new();
        api.expect_fetch_category_map()
            .returning(|| Err(anyhow!("offline")));
        let store = MemoryStore::default();
        LocalStorage::new(store.clone())
            .set_category_map(&category_map())
            .await
            .unwrap();
        let mut f = Fixture::with_store(api, store).await;

        f.start(&["Video"], false, "3").await;
        assert_eq!(f.sink.blocked_domains(), vec!["youtube.com"]);
    }

    #[tokio::test]
    async fn session_survives_restart() {
        let store = MemoryStore::default();
        {
            let mut f = Fixture::with_store(api(), store.clone()).await;
            f.start(&["Social"], false, "11").await;
        }

        let f = Fixture::with_store(api(), store).await;
        assert_eq!(f.sink.blocked_domains(), vec!["facebook.com"]);
        assert_eq!(f.tracker.focus.session_id(), Some("11"));
    }

    #[tokio::test]
    async fn tab_switches_report_dwell_time() {
        let mut f = Fixture::new(api()).await;
        f.tab("https://www.example.com/a").await;
        f.clock.advance(Duration::from_secs(65));
        f.tab("https://news.org").await;
        f.clock.advance(Duration::from_secs(30));
        f.tracker.tick().await;

        let reports = f.drain();
        let summary: Vec<_> = reports
            .iter()
            .map(|r| (r.domain.as_str(), r.delta_seconds))
            .collect();
        assert_eq!(summary, vec![("example.com", 65), ("news.org", 30)]);
    }

    #[tokio::test]
    async fn incomplete_tab_updates_are_ignored() {
        let mut f = Fixture::new(api()).await;
        f.internal(InternalRequest::TabUpdated {
            url: Some("https://a.com".into()),
            status: Some("loading".into()),
        })
        .await;
        assert!(f.tracker.accumulator.current().is_none());

        f.internal(InternalRequest::TabUpdated {
            url: Some("https://a.com".into()),
            status: Some("complete".into()),
        })
        .await;
        assert_eq!(
            f.tracker.accumulator.current().map(|t| t.domain.as_str()),
            Some("a.com")
        );
    }

    #[tokio::test]
    async fn reset_clears_totals_but_keeps_session() -> Result<()> {
        let mut f = Fixture::new(api()).await;
        f.start(&["Social"], false, "1").await;
        f.tab("https://a.com").await;
        f.clock.advance(Duration::from_secs(40));
        f.tracker.tick().await;
        assert!(f.store.snapshot().contains_key("a.com"));

        let reply = f.send(Request::Legacy(LegacyRequest::ResetStorage)).await;
        assert!(reply.success);
        let snapshot = f.store.snapshot();
        assert!(!snapshot.contains_key("a.com"));
        assert_eq!(snapshot.get(keys::FOCUS_ACTIVE), Some(&json!(true)));
        assert_eq!(f.sink.blocked_domains(), vec!["facebook.com"]);
        Ok(())
    }

    #[tokio::test]
    async fn new_day_clears_totals() -> Result<()> {
        let store = MemoryStore::default();
        let mut storage = LocalStorage::new(store.clone());
        storage.set_total(&"a.com".into(), 300).await?;
        let yesterday = TestClock::starting_2025().local_date().pred_opt().unwrap();
        storage.set_last_date(yesterday).await?;

        let f = Fixture::with_store(api(), store).await;
        assert_eq!(LocalStorage::new(f.store.clone()).total(&"a.com".into()).await?, 0);
        assert_eq!(
            LocalStorage::new(f.store.clone()).last_date().await?,
            Some(f.clock.local_date())
        );
        Ok(())
    }

    #[tokio::test]
    async fn same_day_keeps_totals() -> Result<()> {
        let store = MemoryStore::default();
        let mut storage = LocalStorage::new(store.clone());
        storage.set_total(&"a.com".into(), 300).await?;
        storage
            .set_last_date(TestClock::starting_2025().local_date())
            .await?;

        let f = Fixture::with_store(api(), store).await;
        assert_eq!(LocalStorage::new(f.store).total(&"a.com".into()).await?, 300);
        Ok(())
    }

    #[tokio::test]
    async fn set_user_is_published() {
        let mut f = Fixture::new(api()).await;
        f.internal(InternalRequest::SetUser { user_id: Some(5) })
            .await;
        assert_eq!(*f.user.borrow(), Some(5));
    }

    #[tokio::test]
    async fn alert_check_without_user_answers_no() {
        let mut f = Fixture::new(api()).await;
        let reply = f
            .internal(InternalRequest::CheckAlert {
                domain: "youtube.com".into(),
            })
            .await;
        assert_eq!(reply.data.unwrap()["alerta"], json!(false));
    }

    #[tokio::test(start_paused = true)]
    async fn run_flushes_periodically_and_on_shutdown() {
        let f = Fixture::new(api()).await;
        let mut reports = f.reports;
        let (events, receiver) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(f.tracker.run(
            receiver,
            shutdown.clone(),
            Duration::from_secs(20),
        ));

        let (reply, answer) = oneshot::channel();
        events
            .send(TrackerEvent::Request {
                request: Request::Internal(InternalRequest::TabActivated {
                    url: Some("https://a.com".into()),
                }),
                reply,
            })
            .await
            .unwrap();
        answer.await.unwrap();

        tokio::time::sleep(Duration::from_secs(55)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        let mut deltas = vec![];
        while let Ok(report) = reports.try_recv() {
            deltas.push(report.delta_seconds);
        }
        assert_eq!(deltas, vec![20, 20, 15]);
    }
}
