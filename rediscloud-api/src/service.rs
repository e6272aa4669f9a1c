//! Capabilities consumed by the waiting core and the provider
//!
//! Every mutating call returns the id of the task the service accepted; the
//! caller decides how to wait for it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::models::{
    CreatePeering, CreateSubscription, Database, Subscription, UpdateSubscription,
};
use crate::task::Task;

/// Fetch one task record by id
#[async_trait]
pub trait TaskFetcher: Send + Sync {
    async fn get_task(&self, id: &str) -> ApiResult<Task>;
}

#[async_trait]
impl<T: TaskFetcher + ?Sized> TaskFetcher for Arc<T> {
    async fn get_task(&self, id: &str) -> ApiResult<Task> {
        (**self).get_task(id).await
    }
}

/// Subscription, database and peering operations
///
/// Lookups of missing resources fail with `ApiError::NotFound`.
#[async_trait]
pub trait CloudApi: TaskFetcher {
    async fn create_subscription(&self, request: &CreateSubscription) -> ApiResult<String>;

    async fn get_subscription(&self, subscription_id: i64) -> ApiResult<Subscription>;

    async fn update_subscription(
        &self,
        subscription_id: i64,
        request: &UpdateSubscription,
    ) -> ApiResult<String>;

    async fn delete_subscription(&self, subscription_id: i64) -> ApiResult<String>;

    async fn list_databases(&self, subscription_id: i64) -> ApiResult<Vec<Database>>;

    async fn get_database(&self, subscription_id: i64, database_id: i64) -> ApiResult<Database>;

    async fn delete_database(&self, subscription_id: i64, database_id: i64) -> ApiResult<String>;

    async fn create_active_active_peering(
        &self,
        subscription_id: i64,
        request: &CreatePeering,
    ) -> ApiResult<String>;

    /// Listing peerings is itself a task; its result carries a `PeeringListing`
    async fn list_active_active_peerings(&self, subscription_id: i64) -> ApiResult<String>;

    async fn delete_active_active_peering(
        &self,
        subscription_id: i64,
        peering_id: i64,
    ) -> ApiResult<String>;
}
