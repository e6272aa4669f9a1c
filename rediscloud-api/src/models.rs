//! Request and response bodies for subscriptions, databases and peerings
//!
//! Only the fields the provider reads or writes are modelled; unknown fields
//! are ignored on input.

use serde::{Deserialize, Serialize};

/// Body returned by every accepted mutating request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAccepted {
    pub task_id: String,
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "paymentMethodType")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<i64>,
    #[serde(default)]
    pub deployment_type: Option<String>,
    #[serde(default)]
    pub cloud_details: Vec<CloudDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDetail {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub cloud_account_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub dry_run: bool,
    pub deployment_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<i64>,
    pub cloud_providers: Vec<CreateCloudProvider>,
    pub databases: Vec<CreateDatabase>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCloudProvider {
    pub provider: String,
    pub cloud_account_id: i64,
    pub regions: Vec<CreateRegion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegion {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networking: Option<CreateNetworking>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateNetworking {
    #[serde(rename = "deploymentCIDR", skip_serializing_if = "Option::is_none")]
    pub deployment_cidr: Option<String>,
    #[serde(rename = "vpcId", skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabase {
    pub name: String,
    pub protocol: String,
    pub memory_limit_in_gb: f64,
    #[serde(rename = "supportOSSClusterApi")]
    pub support_oss_cluster_api: bool,
    pub local_throughput_measurement: Vec<LocalThroughput>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalThroughput {
    pub region: String,
    pub write_operations_per_second: i64,
    pub read_operations_per_second: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<i64>,
}

impl UpdateSubscription {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.payment_method_id.is_none()
    }
}

// =============================================================================
// Databases
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(rename = "databaseId")]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Body of `GET /subscriptions/{id}/databases`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseList {
    #[serde(default)]
    pub subscription: Vec<SubscriptionDatabases>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDatabases {
    pub subscription_id: i64,
    #[serde(default)]
    pub databases: Vec<Database>,
}

impl DatabaseList {
    pub fn into_databases(self) -> Vec<Database> {
        self.subscription
            .into_iter()
            .flat_map(|s| s.databases)
            .collect()
    }
}

// =============================================================================
// Active-Active peerings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeering {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_project_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_network_name: Option<String>,
}

/// Resource payload of a completed peering listing task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeeringListing {
    #[serde(default)]
    pub regions: Vec<PeeringRegion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeeringRegion {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub vpc_peerings: Vec<Peering>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peering {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub aws_account_id: Option<String>,
    #[serde(default, rename = "awsPeeringUid")]
    pub aws_peering_id: Option<String>,
    #[serde(default, rename = "vpcUid")]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub vpc_cidr: Option<String>,
    #[serde(default)]
    pub vpc_project_uid: Option<String>,
    #[serde(default)]
    pub vpc_network_name: Option<String>,
    #[serde(default)]
    pub redis_project_uid: Option<String>,
    #[serde(default)]
    pub redis_network_name: Option<String>,
    #[serde(default)]
    pub cloud_peering_id: Option<String>,
}

impl PeeringListing {
    /// Find a peering in any region, filling in the region name if absent
    pub fn find(&self, peering_id: i64) -> Option<Peering> {
        self.regions.iter().find_map(|region| {
            region
                .vpc_peerings
                .iter()
                .find(|p| p.id == peering_id)
                .map(|p| {
                    let mut peering = p.clone();
                    if peering.region_name.is_none() {
                        peering.region_name = region.region.clone();
                    }
                    peering
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_subscription_omits_unset_fields() {
        let request = CreateSubscription {
            name: Some("aa".to_string()),
            deployment_type: "active-active".to_string(),
            ..Default::default()
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["deploymentType"], "active-active");
        assert_eq!(body["dryRun"], false);
        assert!(body.get("paymentMethodId").is_none());
    }

    #[test]
    fn networking_uses_cidr_casing() {
        let networking = CreateNetworking {
            deployment_cidr: Some("10.0.0.0/24".to_string()),
            vpc_id: None,
        };
        assert_eq!(
            serde_json::to_value(&networking).unwrap(),
            json!({ "deploymentCIDR": "10.0.0.0/24" })
        );
    }

    #[test]
    fn database_list_flattens_subscriptions() {
        let list: DatabaseList = serde_json::from_value(json!({
            "accountId": 1,
            "subscription": [{
                "subscriptionId": 12,
                "numberOfDatabases": 2,
                "databases": [
                    { "databaseId": 1, "name": "creation-plan-db-1", "status": "active" },
                    { "databaseId": 2, "name": "creation-plan-db-2", "status": "pending" }
                ]
            }]
        }))
        .unwrap();

        let dbs = list.into_databases();
        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs[1].status.as_deref(), Some("pending"));
    }

    #[test]
    fn peering_listing_find_fills_region() {
        let listing: PeeringListing = serde_json::from_value(json!({
            "regions": [{
                "id": 1,
                "region": "us-east-1",
                "vpcPeerings": [
                    { "id": 40, "status": "pending-acceptance", "awsPeeringUid": "pcx-1", "vpcUid": "vpc-1" }
                ]
            }]
        }))
        .unwrap();

        let peering = listing.find(40).unwrap();
        assert_eq!(peering.region_name.as_deref(), Some("us-east-1"));
        assert_eq!(peering.aws_peering_id.as_deref(), Some("pcx-1"));
        assert!(listing.find(41).is_none());
    }
}
