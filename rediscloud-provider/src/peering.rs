//! Active-Active subscription peering lifecycle

use std::time::Duration;

use log::info;
use rediscloud_api::models::{CreatePeering, Peering};
use rediscloud_core::provider::{ProviderError, ProviderResult};
use rediscloud_core::resource::{Resource, ResourceId, State, Value};
use tokio_util::sync::CancellationToken;

use crate::provider::RedisCloudProvider;
use crate::utils::{
    Attributes, format_peering_id, optional_str, parse_peering_id, required_int, required_str,
    set_optional,
};

const DEFAULT_PROVIDER: &str = "AWS";

/// Build the peering request, checking the fields each cloud requires
pub fn build_peering_request(attrs: &Attributes) -> ProviderResult<CreatePeering> {
    let provider = optional_str(attrs, "provider_name")?.unwrap_or(DEFAULT_PROVIDER);
    let require = |key: &str| {
        required_str(attrs, key).map_err(|_| {
            ProviderError::new(format!(
                "`{}` must be set when `provider_name` is `{}`",
                key, provider
            ))
        })
    };

    match provider {
        "AWS" => Ok(CreatePeering {
            region: Some(require("region")?.to_string()),
            aws_account_id: Some(require("aws_account_id")?.to_string()),
            vpc_id: Some(require("vpc_id")?.to_string()),
            vpc_cidr: Some(require("vpc_cidr")?.to_string()),
            ..Default::default()
        }),
        "GCP" => Ok(CreatePeering {
            provider: Some(provider.to_lowercase()),
            vpc_project_uid: Some(require("gcp_project_id")?.to_string()),
            vpc_network_name: Some(require("gcp_network_name")?.to_string()),
            ..Default::default()
        }),
        other => Err(ProviderError::new(format!(
            "`provider_name` must be `AWS` or `GCP`, got `{}`",
            other
        ))),
    }
}

/// Map a listed peering onto resource attributes
pub fn peering_attributes(subscription_id: i64, peering: Peering) -> Attributes {
    let provider = if peering.vpc_project_uid.is_some() {
        "GCP"
    } else {
        "AWS"
    };

    let mut attrs = Attributes::new();
    attrs.insert(
        "subscription_id".to_string(),
        Value::String(subscription_id.to_string()),
    );
    attrs.insert(
        "provider_name".to_string(),
        Value::String(provider.to_string()),
    );
    set_optional(&mut attrs, "status", peering.status);
    set_optional(&mut attrs, "region", peering.region_name);
    set_optional(&mut attrs, "aws_account_id", peering.aws_account_id);
    set_optional(&mut attrs, "aws_peering_id", peering.aws_peering_id);
    set_optional(&mut attrs, "vpc_id", peering.vpc_id);
    set_optional(&mut attrs, "vpc_cidr", peering.vpc_cidr);
    set_optional(&mut attrs, "gcp_project_id", peering.vpc_project_uid);
    set_optional(&mut attrs, "gcp_network_name", peering.vpc_network_name);
    set_optional(&mut attrs, "gcp_redis_project_id", peering.redis_project_uid);
    set_optional(&mut attrs, "gcp_redis_network_name", peering.redis_network_name);
    set_optional(&mut attrs, "gcp_peering_id", peering.cloud_peering_id);
    attrs
}

impl RedisCloudProvider {
    pub(crate) async fn read_peering(
        &self,
        id: &ResourceId,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<State> {
        let (subscription_id, peering_id) = parse_peering_id(identifier)?;

        let listing = match self.waiter().list_peerings(subscription_id, cancel).await {
            Ok(listing) => listing,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => return Err(ProviderError::from_cause(e)),
        };

        Ok(match listing.find(peering_id) {
            Some(peering) => State::existing(id.clone(), peering_attributes(subscription_id, peering))
                .with_identifier(identifier),
            None => State::not_found(id.clone()),
        })
    }

    pub(crate) async fn create_peering(
        &self,
        resource: &Resource,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<State> {
        let subscription_id = required_int(&resource.attributes, "subscription_id")?;
        let request = build_peering_request(&resource.attributes)?;

        let _guard = self.locks.lock(subscription_id, "create peering").await;

        let task_id = self
            .api
            .create_active_active_peering(subscription_id, &request)
            .await
            .map_err(ProviderError::from_cause)?;
        let peering_id = self
            .tasks()
            .wait_for_resource_id(&task_id, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        let identifier = format_peering_id(subscription_id, peering_id);
        info!("Created peering {}", identifier);

        self.waiter()
            .wait_for_peering_initiated(subscription_id, peering_id, timeout, cancel)
            .await
            .map_err(ProviderError::from_cause)?;

        self.read_peering(&resource.id, &identifier, cancel).await
    }

    pub(crate) async fn delete_peering(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<()> {
        let (subscription_id, peering_id) = parse_peering_id(identifier)?;

        let _guard = self.locks.lock(subscription_id, "delete peering").await;

        let task_id = match self
            .api
            .delete_active_active_peering(subscription_id, peering_id)
            .await
        {
            Ok(task_id) => task_id,
            Err(e) if e.is_not_found() => {
                info!("Peering {} is already gone", identifier);
                return Ok(());
            }
            Err(e) => return Err(ProviderError::from_cause(e)),
        };

        self.tasks()
            .wait(&task_id, cancel)
            .await
            .map_err(ProviderError::from_cause)?;
        info!("Deleted peering {}", identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(entries: &[(&str, &str)]) -> Attributes {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn aws_is_the_default_provider() {
        let request = build_peering_request(&attrs(&[
            ("region", "us-east-1"),
            ("aws_account_id", "123456789012"),
            ("vpc_id", "vpc-1"),
            ("vpc_cidr", "10.10.0.0/16"),
        ]))
        .unwrap();

        assert_eq!(request.provider, None);
        assert_eq!(request.region.as_deref(), Some("us-east-1"));
        assert_eq!(request.vpc_cidr.as_deref(), Some("10.10.0.0/16"));
    }

    #[test]
    fn aws_requires_its_fields() {
        let err = build_peering_request(&attrs(&[("region", "us-east-1")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`aws_account_id` must be set when `provider_name` is `AWS`"
        );
    }

    #[test]
    fn gcp_sends_lowercase_provider() {
        let request = build_peering_request(&attrs(&[
            ("provider_name", "GCP"),
            ("gcp_project_id", "my-project"),
            ("gcp_network_name", "my-network"),
        ]))
        .unwrap();

        assert_eq!(request.provider.as_deref(), Some("gcp"));
        assert_eq!(request.vpc_project_uid.as_deref(), Some("my-project"));
        assert_eq!(request.region, None);
    }

    #[test]
    fn gcp_requires_network_name() {
        let err = build_peering_request(&attrs(&[
            ("provider_name", "GCP"),
            ("gcp_project_id", "my-project"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("gcp_network_name"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(build_peering_request(&attrs(&[("provider_name", "Azure")])).is_err());
    }

    #[test]
    fn gcp_peering_attributes() {
        let attrs = peering_attributes(
            12,
            Peering {
                id: 40,
                status: Some("pending-acceptance".to_string()),
                vpc_project_uid: Some("my-project".to_string()),
                vpc_network_name: Some("my-network".to_string()),
                redis_project_uid: Some("redis-project".to_string()),
                cloud_peering_id: Some("peering-40".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(attrs["provider_name"], Value::String("GCP".to_string()));
        assert_eq!(attrs["subscription_id"], Value::String("12".to_string()));
        assert_eq!(attrs["gcp_peering_id"], Value::String("peering-40".to_string()));
        assert!(!attrs.contains_key("aws_peering_id"));
    }
}
