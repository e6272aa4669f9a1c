//! Active-Active subscription lifecycle
//!
//! A subscription is created together with a creation plan of placeholder
//! databases. Once the subscription is active the placeholders are deleted,
//! leaving an empty subscription ready for real databases.

use std::time::Duration;

use log::{info, warn};
use rediscloud_api::models::{
    CreateCloudProvider, CreateDatabase, CreateNetworking, CreateRegion, CreateSubscription,
    LocalThroughput, Subscription, UpdateSubscription,
};
use rediscloud_core::provider::{ProviderError, ProviderResult};
use rediscloud_core::resource::{Resource, ResourceId, State, Value};
use tokio_util::sync::CancellationToken;

use crate::provider::RedisCloudProvider;
use crate::utils::{
    Attributes, optional_int, optional_str, parse_subscription_id, required_bool, required_float,
    required_int, required_str, set_optional,
};

const DEPLOYMENT_TYPE: &str = "active-active";
const DEFAULT_PAYMENT_METHOD: &str = "credit-card";
const PLAN_DATABASE_PREFIX: &str = "creation-plan-db-";
/// Active-Active subscriptions run on Redis internal cloud resources
const INTERNAL_CLOUD_ACCOUNT_ID: i64 = 1;

/// Build the creation request from resource attributes
pub fn build_create_request(resource: &Resource) -> ProviderResult<CreateSubscription> {
    let attrs = &resource.attributes;

    let cloud_provider = required_str(attrs, "cloud_provider")?;
    if !matches!(cloud_provider, "AWS" | "GCP") {
        return Err(ProviderError::new(format!(
            "`cloud_provider` must be 'AWS' or 'GCP', got '{}'",
            cloud_provider
        )));
    }

    let payment_method =
        optional_str(attrs, "payment_method")?.unwrap_or(DEFAULT_PAYMENT_METHOD);
    if !matches!(payment_method, "credit-card" | "marketplace") {
        return Err(ProviderError::new(format!(
            "`payment_method` must be 'credit-card' or 'marketplace', got '{}'",
            payment_method
        )));
    }

    let plan = attrs
        .get("creation_plan")
        .and_then(plan_block)
        .ok_or_else(|| ProviderError::new("the `creation_plan` block is required"))?;

    let regions = plan
        .get("region")
        .and_then(Value::as_list)
        .filter(|regions| !regions.is_empty())
        .ok_or_else(|| ProviderError::new("`creation_plan` needs at least one `region`"))?
        .iter()
        .map(|region| {
            region
                .as_map()
                .ok_or_else(|| ProviderError::new("`creation_plan.region` entries must be blocks"))
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    let mut create_regions = Vec::with_capacity(regions.len());
    let mut throughputs = Vec::with_capacity(regions.len());
    for region in regions {
        let name = required_str(region, "region")?;
        let networking = CreateNetworking {
            deployment_cidr: optional_str(region, "networking_deployment_cidr")?
                .map(str::to_string),
            vpc_id: optional_str(region, "networking_vpc_id")?.map(str::to_string),
        };
        create_regions.push(CreateRegion {
            region: name.to_string(),
            networking: (networking.deployment_cidr.is_some() || networking.vpc_id.is_some())
                .then_some(networking),
        });
        throughputs.push(LocalThroughput {
            region: name.to_string(),
            write_operations_per_second: required_int(region, "write_operations_per_second")?,
            read_operations_per_second: required_int(region, "read_operations_per_second")?,
        });
    }

    let quantity = required_int(plan, "quantity")?;
    if quantity < 1 {
        return Err(ProviderError::new("`creation_plan.quantity` must be at least 1"));
    }
    let memory_limit_in_gb = required_float(plan, "memory_limit_in_gb")?;
    let support_oss_cluster_api = required_bool(plan, "support_oss_cluster_api")?;

    let databases = (1..=quantity)
        .map(|n| CreateDatabase {
            name: format!("{}{}", PLAN_DATABASE_PREFIX, n),
            protocol: "redis".to_string(),
            memory_limit_in_gb,
            support_oss_cluster_api,
            local_throughput_measurement: throughputs.clone(),
            quantity: 1,
        })
        .collect();

    Ok(CreateSubscription {
        name: optional_str(attrs, "name")?.map(str::to_string),
        dry_run: false,
        deployment_type: DEPLOYMENT_TYPE.to_string(),
        payment_method: Some(payment_method.to_string()),
        payment_method_id: optional_int(attrs, "payment_method_id")?,
        cloud_providers: vec![CreateCloudProvider {
            provider: cloud_provider.to_string(),
            cloud_account_id: INTERNAL_CLOUD_ACCOUNT_ID,
            regions: create_regions,
        }],
        databases,
    })
}

/// The plan is a single block, written either bare or as a one-element list
fn plan_block(value: &Value) -> Option<&Attributes> {
    match value {
        Value::Map(map) => Some(map),
        Value::List(items) if items.len() == 1 => items[0].as_map(),
        _ => None,
    }
}

/// Map a subscription onto resource attributes
pub fn subscription_attributes(subscription: &Subscription) -> ProviderResult<Attributes> {
    let cloud_detail = subscription.cloud_details.first().ok_or_else(|| {
        ProviderError::new(format!(
            "Cloud details is empty. Subscription status: {}",
            subscription.status.as_deref().unwrap_or_default()
        ))
    })?;

    let mut attrs = Attributes::new();
    set_optional(&mut attrs, "name", subscription.name.clone());
    set_optional(&mut attrs, "payment_method", subscription.payment_method.clone());
    set_optional(
        &mut attrs,
        "payment_method_id",
        subscription
            .payment_method_id
            .filter(|id| *id != 0)
            .map(|id| id.to_string()),
    );
    set_optional(&mut attrs, "cloud_provider", cloud_detail.provider.clone());
    Ok(attrs)
}

/// Fields that changed between the current state and the desired resource
fn build_update_request(from: &State, to: &Resource) -> ProviderResult<UpdateSubscription> {
    for key in ["cloud_provider", "payment_method"] {
        let current = from.attributes.get(key).and_then(Value::as_str);
        let desired = optional_str(&to.attributes, key)?;
        if desired.is_some() && current.is_some() && desired != current {
            return Err(ProviderError::new(format!(
                "`{}` cannot be changed on an existing subscription",
                key
            )));
        }
    }

    let mut request = UpdateSubscription::default();

    let name = optional_str(&to.attributes, "name")?;
    if name.is_some() && name != from.attributes.get("name").and_then(Value::as_str) {
        request.name = name.map(str::to_string);
    }

    let payment_method_id = optional_int(&to.attributes, "payment_method_id")?;
    if payment_method_id.is_some()
        && payment_method_id != from.attributes.get("payment_method_id").and_then(Value::as_int)
    {
        request.payment_method_id = payment_method_id;
    }

    Ok(request)
}

impl RedisCloudProvider {
    pub(crate) async fn read_subscription(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let subscription_id = parse_subscription_id(identifier)?;
        let subscription = match self.api.get_subscription(subscription_id).await {
            Ok(subscription) => subscription,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => return Err(ProviderError::from_cause(e)),
        };

        let attributes = subscription_attributes(&subscription)?;
        Ok(State::existing(id.clone(), attributes).with_identifier(subscription_id.to_string()))
    }

    pub(crate) async fn create_subscription(
        &self,
        resource: &Resource,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<State> {
        let request = build_create_request(resource)?;
        let task_id = self
            .api
            .create_subscription(&request)
            .await
            .map_err(ProviderError::from_cause)?;
        let subscription_id = self
            .tasks()
            .wait_for_resource_id(&task_id, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        info!("Created subscription {}", subscription_id);

        self.prepare_subscription(subscription_id, timeout, cancel)
            .await
            .inspect_err(|e| {
                warn!(
                    "Subscription {} was created but is not ready: {}",
                    subscription_id, e
                )
            })?;

        self.read_subscription(&resource.id, &subscription_id.to_string())
            .await
    }

    /// Wait for the new subscription, then remove its creation plan databases
    async fn prepare_subscription(
        &self,
        subscription_id: i64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<()> {
        let waiter = self.waiter();
        let target = format!("subscription {}", subscription_id);

        waiter
            .wait_for_subscription_active(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        // Creation plan databases are listed some time after the subscription turns active
        waiter
            .settle(&target, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        waiter
            .wait_for_subscription_active(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;

        let databases = self
            .api
            .list_databases(subscription_id)
            .await
            .map_err(ProviderError::from_cause)?;

        let tasks = self.tasks();
        for database in databases {
            waiter
                .wait_for_database_active(subscription_id, database.id, timeout, cancel)
                .await
                .map_err(ProviderError::from_cause)?;
            let task_id = self
                .api
                .delete_database(subscription_id, database.id)
                .await
                .map_err(ProviderError::from_cause)?;
            tasks
                .wait(&task_id, cancel)
                .await
                .map_err(ProviderError::from_cause)?;
            info!(
                "Deleted creation plan database {} from subscription {}",
                database.id, subscription_id
            );
        }

        waiter
            .wait_for_subscription_active(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)
    }

    pub(crate) async fn update_subscription(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<State> {
        let subscription_id = parse_subscription_id(identifier)?;
        let request = build_update_request(from, to)?;

        let _guard = self.locks.lock(subscription_id, "update").await;

        if !request.is_empty() {
            let task_id = self
                .api
                .update_subscription(subscription_id, &request)
                .await
                .map_err(ProviderError::from_cause)?;
            self.tasks()
                .wait(&task_id, cancel)
                .await
                .map_err(ProviderError::from_cause)?;
            info!("Updated subscription {}", subscription_id);
        }

        self.waiter()
            .wait_for_subscription_active(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;

        self.read_subscription(id, identifier).await
    }

    pub(crate) async fn delete_subscription(
        &self,
        identifier: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<()> {
        let subscription_id = parse_subscription_id(identifier)?;
        let waiter = self.waiter();
        let target = format!("subscription {}", subscription_id);

        let _guard = self.locks.lock(subscription_id, "delete").await;

        waiter
            .wait_for_subscription_active(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        // Creation plan databases may still be going away after the subscription turns active
        waiter
            .settle(&target, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        waiter
            .wait_for_subscription_active(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;

        let task_id = self
            .api
            .delete_subscription(subscription_id)
            .await
            .map_err(ProviderError::from_cause)?;
        self.tasks()
            .wait(&task_id, cancel)
            .await
            .map_err(ProviderError::from_cause)?;

        waiter
            .wait_for_subscription_deleted(subscription_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        info!("Deleted subscription {}", subscription_id);
        Ok(())
    }
}
