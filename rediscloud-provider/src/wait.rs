//! Resource activation waiters
//!
//! Some transitions are not tracked as tasks and can only be observed by
//! re-reading the resource. Each waiter polls one status field at a fixed
//! interval until it reaches a target status, the resource is gone (deletion
//! only), or the timeout runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rediscloud_api::clock::{Clock, TokioClock, sleep_or_cancel};
use rediscloud_api::models::PeeringListing;
use rediscloud_api::{ApiError, CloudApi, TaskApi, TaskPollConfig, WaitError, WaitResult};
use tokio_util::sync::CancellationToken;

/// Cadence of the resource waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Fixed delay between two reads of the resource
    pub poll_interval: Duration,
    /// Pause between two activity checks while the service settles
    pub settle_delay: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(10),
        }
    }
}

/// Statuses a waiter keeps polling on and statuses that end the wait
struct StatusRule {
    pending: &'static [&'static str],
    target: &'static [&'static str],
}

const SUBSCRIPTION_ACTIVE: StatusRule = StatusRule {
    pending: &["pending"],
    target: &["active"],
};

const SUBSCRIPTION_DELETED: StatusRule = StatusRule {
    pending: &["deleting", "active", "pending"],
    target: &[],
};

const DATABASE_ACTIVE: StatusRule = StatusRule {
    pending: &[
        "draft",
        "pending",
        "active-change-draft",
        "active-change-pending",
        "rcp-draft",
        "rcp-change-pending",
        "rcp-active-change-draft",
        "proxy-policy-change-pending",
        "proxy-policy-change-draft",
    ],
    target: &["active"],
};

const PEERING_INITIATED: StatusRule = StatusRule {
    pending: &["initiating-request"],
    target: &["pending-acceptance", "active"],
};

/// One read of the watched resource
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Status(String),
    /// The resource no longer exists
    Gone,
}

enum Progress {
    Done,
    Pending(String),
}

impl StatusRule {
    fn classify(&self, target: &str, observed: Observed) -> WaitResult<Progress> {
        let status = match observed {
            Observed::Gone => return Ok(Progress::Done),
            Observed::Status(status) => status,
        };

        if self.target.contains(&status.as_str()) {
            Ok(Progress::Done)
        } else if self.pending.contains(&status.as_str()) {
            Ok(Progress::Pending(status))
        } else {
            let expected: Vec<&str> = self.pending.iter().chain(self.target).copied().collect();
            Err(WaitError::UnexpectedStatus {
                target: target.to_string(),
                status,
                expected: expected.join(", "),
            })
        }
    }
}

/// Polls subscriptions, databases and peerings until they settle
pub struct ResourceWaiter {
    api: Arc<dyn CloudApi>,
    clock: Arc<dyn Clock>,
    settings: WaitSettings,
    task_config: TaskPollConfig,
}

impl ResourceWaiter {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self {
            api,
            clock: Arc::new(TokioClock),
            settings: WaitSettings::default(),
            task_config: TaskPollConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: WaitSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Backoff for the listing task behind peering reads
    pub fn with_task_config(mut self, config: TaskPollConfig) -> Self {
        self.task_config = config;
        self
    }

    pub async fn wait_for_subscription_active(
        &self,
        subscription_id: i64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult<()> {
        let target = format!("subscription {}", subscription_id);
        let (api, name) = (&self.api, target.as_str());
        self.wait_for_status(name, &SUBSCRIPTION_ACTIVE, timeout, cancel, move |_| async move {
            let subscription = api
                .get_subscription(subscription_id)
                .await
                .map_err(|e| WaitError::fetch(name, e))?;
            Ok(Observed::Status(subscription.status.unwrap_or_default()))
        })
        .await
    }

    /// Wait until the subscription is gone; a not-found read is success
    pub async fn wait_for_subscription_deleted(
        &self,
        subscription_id: i64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult<()> {
        let target = format!("subscription {}", subscription_id);
        let (api, name) = (&self.api, target.as_str());
        self.wait_for_status(name, &SUBSCRIPTION_DELETED, timeout, cancel, move |_| async move {
            match api.get_subscription(subscription_id).await {
                Ok(subscription) => Ok(Observed::Status(subscription.status.unwrap_or_default())),
                Err(e) if e.is_not_found() => Ok(Observed::Gone),
                Err(e) => Err(WaitError::fetch(name, e)),
            }
        })
        .await
    }

    pub async fn wait_for_database_active(
        &self,
        subscription_id: i64,
        database_id: i64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult<()> {
        let target = format!(
            "database {} in subscription {}",
            database_id, subscription_id
        );
        let (api, name) = (&self.api, target.as_str());
        self.wait_for_status(name, &DATABASE_ACTIVE, timeout, cancel, move |_| async move {
            let database = api
                .get_database(subscription_id, database_id)
                .await
                .map_err(|e| WaitError::fetch(name, e))?;
            Ok(Observed::Status(database.status.unwrap_or_default()))
        })
        .await
    }

    /// Wait until the peering has left `initiating-request`
    ///
    /// Each read lists the subscription's peerings, which is itself a task.
    /// The listing task is bounded by the time left, so a stuck listing ends
    /// in `Timeout` like a stuck status.
    pub async fn wait_for_peering_initiated(
        &self,
        subscription_id: i64,
        peering_id: i64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult<()> {
        let target = format!("peering {} of subscription {}", peering_id, subscription_id);
        let name = target.as_str();
        let read = move |remaining: Duration| async move {
            let listing = self
                .fetch_peerings(subscription_id, Some(remaining), cancel)
                .await?;
            let peering = listing.find(peering_id).ok_or_else(|| {
                WaitError::fetch(name, ApiError::not_found(format!("find {}", name)))
            })?;
            Ok(Observed::Status(peering.status.unwrap_or_default()))
        };
        self.wait_for_status(name, &PEERING_INITIATED, timeout, cancel, read)
            .await
    }

    /// Run the listing task and decode its payload
    pub async fn list_peerings(
        &self,
        subscription_id: i64,
        cancel: &CancellationToken,
    ) -> WaitResult<PeeringListing> {
        self.fetch_peerings(subscription_id, None, cancel).await
    }

    async fn fetch_peerings(
        &self,
        subscription_id: i64,
        time_limit: Option<Duration>,
        cancel: &CancellationToken,
    ) -> WaitResult<PeeringListing> {
        let target = format!("peerings of subscription {}", subscription_id);
        let task_id = self
            .api
            .list_active_active_peerings(subscription_id)
            .await
            .map_err(|e| WaitError::fetch(target.as_str(), e))?;

        let mut tasks = TaskApi::new(self.api.clone())
            .with_clock(self.clock.clone())
            .with_config(self.task_config);
        if let Some(limit) = time_limit {
            tasks = tasks.with_time_limit(limit);
        }
        let task = tasks.wait_for_task_to_complete(&task_id, cancel).await?;

        match task.resource() {
            Some(resource) => serde_json::from_value(resource.clone()).map_err(|e| {
                WaitError::fetch(
                    target.as_str(),
                    ApiError::Decode {
                        operation: format!("list {}", target),
                        message: e.to_string(),
                    },
                )
            }),
            None => Ok(PeeringListing::default()),
        }
    }

    /// Sleep for the settle delay
    pub async fn settle(&self, target: &str, cancel: &CancellationToken) -> WaitResult<()> {
        debug!("Letting {} settle for {:?}", target, self.settings.settle_delay);
        if sleep_or_cancel(self.clock.as_ref(), self.settings.settle_delay, cancel).await {
            Ok(())
        } else {
            Err(WaitError::cancelled(target))
        }
    }

    async fn wait_for_status<F, Fut>(
        &self,
        target: &str,
        rule: &StatusRule,
        timeout: Duration,
        cancel: &CancellationToken,
        check: F,
    ) -> WaitResult<()>
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = WaitResult<Observed>>,
    {
        let start = self.clock.now();
        let mut attempts = 0u32;
        let mut last_status: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::cancelled(target));
            }

            attempts += 1;
            let elapsed = self.clock.now().saturating_duration_since(start);
            let remaining = timeout.saturating_sub(elapsed);
            let observed = match check(remaining).await {
                Ok(observed) => observed,
                // A read that ran out of time is this wait running out of time
                Err(WaitError::Timeout { .. }) => {
                    return Err(WaitError::Timeout {
                        target: target.to_string(),
                        timeout,
                        last_status,
                    });
                }
                Err(e) => return Err(e),
            };
            let status = match rule.classify(target, observed)? {
                Progress::Done => {
                    debug!("{} ready after {} reads", target, attempts);
                    return Ok(());
                }
                Progress::Pending(status) => status,
            };
            last_status = Some(status.clone());

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= timeout {
                return Err(WaitError::Timeout {
                    target: target.to_string(),
                    timeout,
                    last_status: Some(status),
                });
            }

            let delay = self.settings.poll_interval.min(timeout - elapsed);
            debug!(
                "{} is {} (read {}, checking again in {:?})",
                target, status, attempts, delay
            );

            if !sleep_or_cancel(self.clock.as_ref(), delay, cancel).await {
                return Err(WaitError::cancelled(target));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rediscloud_api::models::{Database, Peering, Subscription};
    use rediscloud_api::testing::{FakeCloud, ManualClock};

    fn subscription(id: i64) -> Subscription {
        Subscription {
            id,
            ..Default::default()
        }
    }

    fn waiter(cloud: Arc<FakeCloud>, clock: Arc<ManualClock>) -> ResourceWaiter {
        ResourceWaiter::new(cloud).with_clock(clock)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn subscription_becomes_active_on_third_read() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["pending", "pending", "active"]);
        let clock = Arc::new(ManualClock::new());

        waiter(cloud.clone(), clock.clone())
            .wait_for_subscription_active(7, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cloud.count_calls("get_subscription"), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn pending_past_the_timeout_is_a_timeout() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["pending"]);
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud.clone(), clock.clone())
            .wait_for_subscription_active(7, MINUTE, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("last status: pending"));
        assert_eq!(cloud.count_calls("get_subscription"), 7);
        assert_eq!(clock.elapsed(), MINUTE);
    }

    #[tokio::test]
    async fn last_delay_is_clamped_to_the_deadline() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["pending"]);
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud, clock.clone())
            .wait_for_subscription_active(7, Duration::from_secs(25), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(5)
            ]
        );
    }

    #[tokio::test]
    async fn unexpected_status_ends_the_wait() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["pending", "error"]);
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud.clone(), clock)
            .wait_for_subscription_active(7, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            WaitError::UnexpectedStatus { status, .. } => assert_eq!(status, "error"),
            other => panic!("Expected UnexpectedStatus, got {other:?}"),
        }
        assert_eq!(cloud.count_calls("get_subscription"), 2);
    }

    #[tokio::test]
    async fn missing_subscription_fails_activation() {
        let cloud = Arc::new(FakeCloud::new());
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud, clock.clone())
            .wait_for_subscription_active(7, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn missing_subscription_satisfies_deletion() {
        let cloud = Arc::new(FakeCloud::new());
        let clock = Arc::new(ManualClock::new());

        waiter(cloud, clock.clone())
            .wait_for_subscription_deleted(7, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap();

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn deletion_polls_through_deleting() {
        let cloud = Arc::new(FakeCloud::new().with_deleting_reads(2));
        cloud.insert_subscription(subscription(7), &["active"]);
        let clock = Arc::new(ManualClock::new());
        let cancel = CancellationToken::new();

        cloud.delete_subscription(7).await.unwrap();
        waiter(cloud.clone(), clock.clone())
            .wait_for_subscription_deleted(7, 10 * MINUTE, &cancel)
            .await
            .unwrap();

        assert_eq!(cloud.count_calls("get_subscription"), 3);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn database_waits_through_change_statuses() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["active"]);
        cloud.insert_database(
            7,
            Database {
                id: 70,
                ..Default::default()
            },
            &["draft", "rcp-change-pending", "active-change-pending", "active"],
        );
        let clock = Arc::new(ManualClock::new());

        waiter(cloud.clone(), clock)
            .wait_for_database_active(7, 70, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cloud.count_calls("get_database 7/70"), 4);
    }

    #[tokio::test]
    async fn peering_initiated_once_pending_acceptance() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["active"]);
        cloud.insert_peering(
            7,
            Peering {
                id: 40,
                region_name: Some("us-east-1".to_string()),
                ..Default::default()
            },
            &["initiating-request", "pending-acceptance"],
        );
        let clock = Arc::new(ManualClock::new());

        waiter(cloud.clone(), clock)
            .wait_for_peering_initiated(7, 40, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cloud.count_calls("list_peerings 7"), 2);
    }

    #[tokio::test]
    async fn stuck_peering_listing_times_out_on_schedule() {
        let cloud = Arc::new(FakeCloud::new().with_task_progress(&["processing-in-progress"; 200]));
        cloud.insert_subscription(subscription(7), &["active"]);
        cloud.insert_peering(
            7,
            Peering {
                id: 40,
                ..Default::default()
            },
            &["pending-acceptance"],
        );
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud.clone(), clock.clone())
            .wait_for_peering_initiated(7, 40, MINUTE, &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            WaitError::Timeout { target, timeout, .. } => {
                assert_eq!(target, "peering 40 of subscription 7");
                assert_eq!(*timeout, MINUTE);
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
        assert_eq!(clock.elapsed(), MINUTE);
        assert_eq!(cloud.count_calls("list_peerings 7"), 1);
    }

    #[tokio::test]
    async fn peering_listing_is_bounded_by_the_time_left() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["active"]);
        cloud.insert_peering(
            7,
            Peering {
                id: 40,
                ..Default::default()
            },
            &["initiating-request"],
        );
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud.clone(), clock.clone())
            .wait_for_peering_initiated(7, 40, MINUTE, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("last status: initiating-request"));
        assert_eq!(clock.elapsed(), MINUTE);
    }

    #[tokio::test]
    async fn absent_peering_is_a_fetch_error() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["active"]);
        let clock = Arc::new(ManualClock::new());

        let err = waiter(cloud, clock)
            .wait_for_peering_initiated(7, 40, 10 * MINUTE, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cancelled_before_start_reads_nothing() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["pending"]);
        let clock = Arc::new(ManualClock::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter(cloud.clone(), clock)
            .wait_for_subscription_active(7, 10 * MINUTE, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(cloud.count_calls("get_subscription"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_interval() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(subscription(7), &["pending"]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let err = ResourceWaiter::new(cloud.clone())
            .wait_for_subscription_active(7, 10 * MINUTE, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(cloud.count_calls("get_subscription"), 2);
    }

    #[tokio::test]
    async fn settle_sleeps_the_settle_delay() {
        let cloud = Arc::new(FakeCloud::new());
        let clock = Arc::new(ManualClock::new());

        waiter(cloud, clock.clone())
            .settle("subscription 7", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
    }
}
