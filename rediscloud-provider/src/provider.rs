//! Redis Cloud Provider implementation
//!
//! Dispatches resource operations to the subscription and peering
//! lifecycles. Every operation runs under a child of the provider's
//! cancellation token and is bounded by the resource type's timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rediscloud_api::clock::{Clock, TokioClock};
use rediscloud_api::{
    ApiResult, ClientConfig, CloudApi, RestClient, TaskApi, TaskPollConfig, WaitError,
};
use rediscloud_core::lock::KeyedMutex;
use rediscloud_core::provider::{ProviderError, ProviderResult, ResourceTimeouts, ResourceType};
use rediscloud_core::resource::{Resource, ResourceId, State};
use tokio_util::sync::CancellationToken;

use crate::resources::{self, PEERING, SUBSCRIPTION};
use crate::wait::{ResourceWaiter, WaitSettings};

/// Task poller over the provider's API
pub type Tasks = TaskApi<Arc<dyn CloudApi>>;

/// Redis Cloud Provider
pub struct RedisCloudProvider {
    pub(crate) api: Arc<dyn CloudApi>,
    clock: Arc<dyn Clock>,
    task_config: TaskPollConfig,
    settings: WaitSettings,
    /// Serialises mutations of one subscription and its peerings
    pub(crate) locks: Arc<KeyedMutex<i64>>,
    cancel: CancellationToken,
    timeout_override: Option<Duration>,
}

impl RedisCloudProvider {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self {
            api,
            clock: Arc::new(TokioClock),
            task_config: TaskPollConfig::default(),
            settings: WaitSettings::default(),
            locks: Arc::new(KeyedMutex::new()),
            cancel: CancellationToken::new(),
            timeout_override: None,
        }
    }

    /// Create a provider talking to the REST API
    pub fn from_config(config: &ClientConfig) -> ApiResult<Self> {
        Ok(Self::new(Arc::new(RestClient::new(config)?)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_task_config(mut self, config: TaskPollConfig) -> Self {
        self.task_config = config;
        self
    }

    pub fn with_wait_settings(mut self, settings: WaitSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a lock service with other providers
    pub fn with_locks(mut self, locks: Arc<KeyedMutex<i64>>) -> Self {
        self.locks = locks;
        self
    }

    /// Root token; cancelling it aborts every running operation
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use one timeout for every operation instead of the per-type defaults
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tasks(&self) -> Tasks {
        TaskApi::new(self.api.clone())
            .with_clock(self.clock.clone())
            .with_config(self.task_config)
    }

    pub fn waiter(&self) -> ResourceWaiter {
        ResourceWaiter::new(self.api.clone())
            .with_clock(self.clock.clone())
            .with_settings(self.settings)
            .with_task_config(self.task_config)
    }

    fn resource_type(&self, id: &ResourceId) -> ProviderResult<Box<dyn ResourceType>> {
        resources::resource_type(&id.resource_type)
            .ok_or_else(|| unknown_type(&id.resource_type).for_resource(id.clone()))
    }

    fn timeouts(&self, id: &ResourceId) -> ProviderResult<ResourceTimeouts> {
        let timeouts = self.resource_type(id)?.timeouts();
        Ok(self
            .timeout_override
            .map(ResourceTimeouts::uniform)
            .unwrap_or(timeouts))
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let timeout = self.timeouts(id)?.read;
        let cancel = self.cancel.child_token();
        let op = async {
            match id.resource_type.as_str() {
                SUBSCRIPTION => self.read_subscription(id, identifier).await,
                PEERING => self.read_peering(id, identifier, &cancel).await,
                other => Err(unknown_type(other)),
            }
        };
        self.run(id, "read", timeout, &cancel, op).await
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let timeout = self.timeouts(id)?.create;
        let cancel = self.cancel.child_token();
        let op = async {
            match id.resource_type.as_str() {
                SUBSCRIPTION => self.create_subscription(resource, timeout, &cancel).await,
                PEERING => self.create_peering(resource, timeout, &cancel).await,
                other => Err(unknown_type(other)),
            }
        };
        self.run(id, "create", timeout, &cancel, op).await
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        if !self.resource_type(id)?.updatable() {
            return Err(ProviderError::new(format!(
                "{} cannot be updated in place",
                id.resource_type
            ))
            .for_resource(id.clone()));
        }
        let timeout = self.timeouts(id)?.update;
        let cancel = self.cancel.child_token();
        let op = async {
            match id.resource_type.as_str() {
                SUBSCRIPTION => {
                    self.update_subscription(id, identifier, from, to, timeout, &cancel)
                        .await
                }
                other => Err(unknown_type(other)),
            }
        };
        self.run(id, "update", timeout, &cancel, op).await
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let timeout = self.timeouts(id)?.delete;
        let cancel = self.cancel.child_token();
        let op = async {
            match id.resource_type.as_str() {
                SUBSCRIPTION => self.delete_subscription(identifier, timeout, &cancel).await,
                PEERING => self.delete_peering(identifier, &cancel).await,
                other => Err(unknown_type(other)),
            }
        };
        self.run(id, "delete", timeout, &cancel, op).await
    }

    /// Drive one operation to completion, cancellation or deadline
    async fn run<T>(
        &self,
        id: &ResourceId,
        operation: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        op: impl Future<Output = ProviderResult<T>>,
    ) -> ProviderResult<T> {
        let target = format!("{} of {}.{}", operation, id.resource_type, id.name);
        let result = tokio::select! {
            biased;
            result = op => result,
            _ = cancel.cancelled() => Err(ProviderError::from_cause(WaitError::cancelled(target))),
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                Err(ProviderError::from_cause(WaitError::Timeout {
                    target,
                    timeout,
                    last_status: None,
                }))
            }
        };
        result.map_err(|e| e.for_resource(id.clone()))
    }
}

fn unknown_type(resource_type: &str) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", resource_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rediscloud_api::testing::{FakeCloud, ManualClock};
    use rediscloud_core::resource::Value;

    fn provider(cloud: Arc<FakeCloud>) -> RedisCloudProvider {
        RedisCloudProvider::new(cloud).with_clock(Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn unknown_resource_types_are_rejected() {
        let cloud = Arc::new(FakeCloud::new());
        let provider = provider(cloud.clone());
        let id = ResourceId::new("database", "db");

        let err = provider.read_resource(&id, "1").await.unwrap_err();
        assert!(err.to_string().contains("Unknown resource type: database"));
        assert_eq!(err.resource_id, Some(id.clone()));

        let err = provider.delete_resource(&id, "1").await.unwrap_err();
        assert_eq!(err.to_string(), "[database.db] Unknown resource type: database");

        let err = provider
            .update_resource(
                &id,
                "1",
                &State::not_found(id.clone()),
                &Resource::new("database", "db"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.resource_id, Some(id));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn timeout_override_applies_to_every_operation() {
        let provider = provider(Arc::new(FakeCloud::new())).with_timeout(Duration::from_secs(5));
        let timeouts = provider
            .timeouts(&ResourceId::new(SUBSCRIPTION, "sub"))
            .unwrap();
        assert_eq!(timeouts, ResourceTimeouts::uniform(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn peerings_cannot_be_updated() {
        let provider = provider(Arc::new(FakeCloud::new()));
        let id = ResourceId::new(PEERING, "peer");
        let err = provider
            .update_resource(
                &id,
                "1/2",
                &State::not_found(id.clone()),
                &Resource::new(PEERING, "peer")
                    .with_attribute("region", Value::String("us-east-1".into())),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be updated in place"));
        assert_eq!(err.resource_id, Some(id));
    }

    #[tokio::test]
    async fn cancelled_root_token_aborts_operations() {
        let cloud = Arc::new(FakeCloud::new());
        let provider = provider(cloud.clone());
        provider.cancellation_token().cancel();

        let err = provider
            .delete_resource(&ResourceId::new(SUBSCRIPTION, "sub"), "7")
            .await
            .unwrap_err();

        assert!(err.cause_as::<WaitError>().is_some_and(WaitError::is_cancelled));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn operations_are_bounded_by_their_timeout() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.insert_subscription(
            rediscloud_api::models::Subscription {
                id: 7,
                ..Default::default()
            },
            &["active"],
        );
        let locks = Arc::new(KeyedMutex::new());
        let _held = locks.lock(7, "test").await;
        let provider = RedisCloudProvider::new(cloud)
            .with_locks(locks.clone())
            .with_timeout(Duration::from_secs(30));

        let err = provider
            .delete_resource(&ResourceId::new(SUBSCRIPTION, "sub"), "7")
            .await
            .unwrap_err();

        assert!(err.cause_as::<WaitError>().is_some_and(WaitError::is_timeout));
    }
}
