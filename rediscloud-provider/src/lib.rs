//! Redis Cloud Provider
//!
//! Active-Active subscriptions and their VPC peerings on top of the Redis
//! Cloud REST API.
//!
//! ## Module Structure
//!
//! - `provider` - RedisCloudProvider and operation dispatch
//! - `resources` - Resource type definitions and timeouts
//! - `subscription` - Active-Active subscription lifecycle
//! - `peering` - Active-Active peering lifecycle
//! - `wait` - Resource activation waiters
//! - `utils` - Identifier parsing and attribute helpers

pub mod peering;
pub mod provider;
pub mod resources;
pub mod subscription;
pub mod utils;
pub mod wait;

// Re-export main types
pub use provider::{RedisCloudProvider, Tasks};
pub use utils::{format_peering_id, parse_peering_id};
pub use wait::{ResourceWaiter, WaitSettings};

use rediscloud_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use rediscloud_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for RedisCloudProvider {
    fn name(&self) -> &'static str {
        "rediscloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
