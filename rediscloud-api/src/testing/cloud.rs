//! In-memory stand-in for the managed service
//!
//! Every resource carries a status script. Each read consumes the next
//! status and the last one sticks. Mutations return a task id whose record
//! walks through `task_progress` before completing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::lock;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CloudDetail, CreatePeering, CreateSubscription, Database, Peering, PeeringListing,
    PeeringRegion, Subscription, UpdateSubscription,
};
use crate::service::{CloudApi, TaskFetcher};
use crate::task::status::{PROCESSING_COMPLETED, PROCESSING_IN_PROGRESS, RECEIVED};
use crate::task::{Task, TaskResponse, TaskResponseError};

#[derive(Debug, Clone)]
struct Script(VecDeque<String>);

impl Script {
    fn new<S: AsRef<str>>(statuses: &[S]) -> Self {
        Self(statuses.iter().map(|s| s.as_ref().to_string()).collect())
    }

    fn next(&mut self) -> Option<String> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

struct SubscriptionEntry {
    subscription: Subscription,
    statuses: Script,
    /// Reads left before a deleted subscription disappears
    deleting_reads: Option<usize>,
}

struct DatabaseEntry {
    database: Database,
    statuses: Script,
}

struct PeeringEntry {
    peering: Peering,
    statuses: Script,
}

struct TaskEntry {
    records: VecDeque<Task>,
}

struct FakeState {
    next_id: i64,
    next_task: u64,
    subscriptions: HashMap<i64, SubscriptionEntry>,
    databases: HashMap<i64, Vec<DatabaseEntry>>,
    peerings: HashMap<i64, Vec<PeeringEntry>>,
    tasks: HashMap<String, TaskEntry>,
    task_progress: Vec<String>,
    task_failure: Option<(String, String)>,
    task_error: Option<TaskResponseError>,
    new_subscription_statuses: Vec<String>,
    new_database_statuses: Vec<String>,
    new_peering_statuses: Vec<String>,
    deleting_reads: usize,
    calls: Vec<String>,
}

/// Fake `CloudApi` holding subscriptions, databases and peerings in memory
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                next_task: 1,
                subscriptions: HashMap::new(),
                databases: HashMap::new(),
                peerings: HashMap::new(),
                tasks: HashMap::new(),
                task_progress: vec![RECEIVED.to_string(), PROCESSING_IN_PROGRESS.to_string()],
                task_failure: None,
                task_error: None,
                new_subscription_statuses: vec!["pending".to_string(), "active".to_string()],
                new_database_statuses: vec!["pending".to_string(), "active".to_string()],
                new_peering_statuses: vec![
                    "initiating-request".to_string(),
                    "pending-acceptance".to_string(),
                ],
                deleting_reads: 1,
                calls: Vec::new(),
            }),
        }
    }

    /// Statuses a task reports before `processing-completed`
    pub fn with_task_progress<S: AsRef<str>>(self, statuses: &[S]) -> Self {
        lock(&self.state).task_progress =
            statuses.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Statuses reported by subscriptions created from now on
    pub fn with_subscription_statuses<S: AsRef<str>>(self, statuses: &[S]) -> Self {
        lock(&self.state).new_subscription_statuses =
            statuses.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Statuses reported by databases created from now on
    pub fn with_database_statuses<S: AsRef<str>>(self, statuses: &[S]) -> Self {
        lock(&self.state).new_database_statuses =
            statuses.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Statuses reported by peerings created from now on
    pub fn with_peering_statuses<S: AsRef<str>>(self, statuses: &[S]) -> Self {
        lock(&self.state).new_peering_statuses =
            statuses.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Reads answered with `deleting` before a deleted subscription is gone
    pub fn with_deleting_reads(self, reads: usize) -> Self {
        lock(&self.state).deleting_reads = reads;
        self
    }

    /// Make the next task end in `status` instead of completing
    pub fn fail_next_task(&self, status: &str, description: &str) {
        lock(&self.state).task_failure = Some((status.to_string(), description.to_string()));
    }

    /// Make the next task complete with an embedded error
    pub fn error_next_task(&self, error: TaskResponseError) {
        lock(&self.state).task_error = Some(error);
    }

    pub fn insert_subscription<S: AsRef<str>>(&self, subscription: Subscription, statuses: &[S]) {
        let mut state = lock(&self.state);
        state.next_id = state.next_id.max(subscription.id + 1);
        state.subscriptions.insert(
            subscription.id,
            SubscriptionEntry {
                subscription,
                statuses: Script::new(statuses),
                deleting_reads: None,
            },
        );
    }

    pub fn insert_database<S: AsRef<str>>(
        &self,
        subscription_id: i64,
        database: Database,
        statuses: &[S],
    ) {
        let mut state = lock(&self.state);
        state.next_id = state.next_id.max(database.id + 1);
        state
            .databases
            .entry(subscription_id)
            .or_default()
            .push(DatabaseEntry {
                database,
                statuses: Script::new(statuses),
            });
    }

    pub fn insert_peering<S: AsRef<str>>(
        &self,
        subscription_id: i64,
        peering: Peering,
        statuses: &[S],
    ) {
        let mut state = lock(&self.state);
        state.next_id = state.next_id.max(peering.id + 1);
        state
            .peerings
            .entry(subscription_id)
            .or_default()
            .push(PeeringEntry {
                peering,
                statuses: Script::new(statuses),
            });
    }

    /// Every call served so far, e.g. `delete_database 1/2`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls whose description starts with `prefix`
    pub fn count_calls(&self, prefix: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn subscription(&self, id: i64) -> Option<Subscription> {
        lock(&self.state)
            .subscriptions
            .get(&id)
            .map(|e| e.subscription.clone())
    }

    pub fn database_ids(&self, subscription_id: i64) -> Vec<i64> {
        lock(&self.state)
            .databases
            .get(&subscription_id)
            .map(|dbs| dbs.iter().map(|e| e.database.id).collect())
            .unwrap_or_default()
    }

    pub fn peering(&self, subscription_id: i64, peering_id: i64) -> Option<Peering> {
        lock(&self.state)
            .peerings
            .get(&subscription_id)
            .and_then(|ps| ps.iter().find(|e| e.peering.id == peering_id))
            .map(|e| e.peering.clone())
    }
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeState {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, call: String) {
        self.calls.push(call);
    }

    /// Register a task that finishes with `response`
    fn accept(&mut self, command: &str, response: TaskResponse) -> String {
        let id = format!("task-{}", self.next_task);
        self.next_task += 1;

        let record = |status: &str| Task {
            id: id.clone(),
            command_type: Some(command.to_string()),
            status: Some(status.to_string()),
            description: Some(format!("{} request", command)),
            timestamp: None,
            response: None,
        };

        let mut records: VecDeque<Task> = self
            .task_progress
            .iter()
            .map(|s| record(s.as_str()))
            .collect();
        let last = match (self.task_failure.take(), self.task_error.take()) {
            (Some((status, description)), _) => Task {
                description: Some(description),
                ..record(status.as_str())
            },
            (None, Some(error)) => Task {
                response: Some(TaskResponse {
                    error: Some(error),
                    ..Default::default()
                }),
                ..record(PROCESSING_COMPLETED)
            },
            (None, None) => Task {
                response: Some(response),
                ..record(PROCESSING_COMPLETED)
            },
        };
        records.push_back(last);

        self.tasks.insert(id.clone(), TaskEntry { records });
        id
    }

    fn live_subscription(
        &mut self,
        id: i64,
        operation: &str,
    ) -> ApiResult<&mut SubscriptionEntry> {
        self.subscriptions
            .get_mut(&id)
            .filter(|e| e.deleting_reads.is_none())
            .ok_or_else(|| ApiError::not_found(operation))
    }
}

fn resource_id(id: i64) -> TaskResponse {
    TaskResponse {
        resource_id: Some(id),
        ..Default::default()
    }
}

#[async_trait]
impl TaskFetcher for FakeCloud {
    async fn get_task(&self, id: &str) -> ApiResult<Task> {
        let mut state = lock(&self.state);
        state.record(format!("get_task {}", id));
        let entry = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("retrieve task {}", id)))?;
        let task = if entry.records.len() > 1 {
            entry.records.pop_front()
        } else {
            entry.records.front().cloned()
        };
        task.ok_or_else(|| ApiError::not_found(format!("retrieve task {}", id)))
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn create_subscription(&self, request: &CreateSubscription) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record("create_subscription".to_string());

        let id = state.allocate_id();
        let subscription = Subscription {
            id,
            name: request.name.clone(),
            status: None,
            payment_method: request.payment_method.clone(),
            payment_method_id: request.payment_method_id,
            deployment_type: Some(request.deployment_type.clone()),
            cloud_details: request
                .cloud_providers
                .iter()
                .map(|p| CloudDetail {
                    provider: Some(p.provider.clone()),
                    cloud_account_id: Some(p.cloud_account_id),
                })
                .collect(),
        };
        let statuses = Script::new(&state.new_subscription_statuses);
        state.subscriptions.insert(
            id,
            SubscriptionEntry {
                subscription,
                statuses,
                deleting_reads: None,
            },
        );

        for db in &request.databases {
            let db_id = state.allocate_id();
            let statuses = Script::new(&state.new_database_statuses);
            state.databases.entry(id).or_default().push(DatabaseEntry {
                database: Database {
                    id: db_id,
                    name: Some(db.name.clone()),
                    status: None,
                },
                statuses,
            });
        }

        Ok(state.accept("subscriptionCreateRequest", resource_id(id)))
    }

    async fn get_subscription(&self, subscription_id: i64) -> ApiResult<Subscription> {
        let mut state = lock(&self.state);
        state.record(format!("get_subscription {}", subscription_id));
        let operation = format!("retrieve subscription {}", subscription_id);

        let entry = state
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| ApiError::not_found(&operation))?;

        if let Some(reads) = entry.deleting_reads {
            if reads == 0 {
                state.subscriptions.remove(&subscription_id);
                return Err(ApiError::not_found(operation));
            }
            entry.deleting_reads = Some(reads - 1);
            return Ok(Subscription {
                status: Some("deleting".to_string()),
                ..entry.subscription.clone()
            });
        }

        let status = entry.statuses.next();
        Ok(Subscription {
            status,
            ..entry.subscription.clone()
        })
    }

    async fn update_subscription(
        &self,
        subscription_id: i64,
        request: &UpdateSubscription,
    ) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record(format!("update_subscription {}", subscription_id));
        let operation = format!("update subscription {}", subscription_id);
        let entry = state.live_subscription(subscription_id, &operation)?;

        if let Some(name) = &request.name {
            entry.subscription.name = Some(name.clone());
        }
        if let Some(payment_method_id) = request.payment_method_id {
            entry.subscription.payment_method_id = Some(payment_method_id);
        }

        Ok(state.accept("subscriptionUpdateRequest", resource_id(subscription_id)))
    }

    async fn delete_subscription(&self, subscription_id: i64) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record(format!("delete_subscription {}", subscription_id));
        let reads = state.deleting_reads;
        let operation = format!("delete subscription {}", subscription_id);
        let entry = state.live_subscription(subscription_id, &operation)?;
        entry.deleting_reads = Some(reads);

        Ok(state.accept("subscriptionDeleteRequest", resource_id(subscription_id)))
    }

    async fn list_databases(&self, subscription_id: i64) -> ApiResult<Vec<Database>> {
        let mut state = lock(&self.state);
        state.record(format!("list_databases {}", subscription_id));
        state.live_subscription(
            subscription_id,
            &format!("list databases of subscription {}", subscription_id),
        )?;

        Ok(state
            .databases
            .get(&subscription_id)
            .map(|dbs| dbs.iter().map(|e| e.database.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_database(&self, subscription_id: i64, database_id: i64) -> ApiResult<Database> {
        let mut state = lock(&self.state);
        state.record(format!("get_database {}/{}", subscription_id, database_id));
        let entry = state
            .databases
            .get_mut(&subscription_id)
            .and_then(|dbs| dbs.iter_mut().find(|e| e.database.id == database_id))
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "retrieve database {} in subscription {}",
                    database_id, subscription_id
                ))
            })?;

        let status = entry.statuses.next();
        Ok(Database {
            status,
            ..entry.database.clone()
        })
    }

    async fn delete_database(&self, subscription_id: i64, database_id: i64) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record(format!("delete_database {}/{}", subscription_id, database_id));
        let dbs = state.databases.entry(subscription_id).or_default();
        let before = dbs.len();
        dbs.retain(|e| e.database.id != database_id);
        if dbs.len() == before {
            return Err(ApiError::not_found(format!(
                "delete database {} in subscription {}",
                database_id, subscription_id
            )));
        }

        Ok(state.accept("databaseDeleteRequest", resource_id(database_id)))
    }

    async fn create_active_active_peering(
        &self,
        subscription_id: i64,
        request: &CreatePeering,
    ) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record(format!("create_peering {}", subscription_id));
        state.live_subscription(
            subscription_id,
            &format!("create peering for subscription {}", subscription_id),
        )?;

        let id = state.allocate_id();
        let gcp = request.vpc_project_uid.is_some();
        let peering = Peering {
            id,
            status: None,
            region_name: request.region.clone(),
            aws_account_id: request.aws_account_id.clone(),
            aws_peering_id: (!gcp).then(|| format!("pcx-{}", id)),
            vpc_id: request.vpc_id.clone(),
            vpc_cidr: request.vpc_cidr.clone(),
            vpc_project_uid: request.vpc_project_uid.clone(),
            vpc_network_name: request.vpc_network_name.clone(),
            redis_project_uid: gcp.then(|| "redis-project".to_string()),
            redis_network_name: gcp.then(|| "redis-network".to_string()),
            cloud_peering_id: gcp.then(|| format!("peering-{}", id)),
        };
        let statuses = Script::new(&state.new_peering_statuses);
        state
            .peerings
            .entry(subscription_id)
            .or_default()
            .push(PeeringEntry { peering, statuses });

        Ok(state.accept("vpcPeeringCreateRequest", resource_id(id)))
    }

    async fn list_active_active_peerings(&self, subscription_id: i64) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record(format!("list_peerings {}", subscription_id));
        state.live_subscription(
            subscription_id,
            &format!("list peerings of subscription {}", subscription_id),
        )?;

        let mut regions: Vec<PeeringRegion> = Vec::new();
        for entry in state.peerings.entry(subscription_id).or_default().iter_mut() {
            let peering = Peering {
                status: entry.statuses.next(),
                region_name: None,
                ..entry.peering.clone()
            };
            let region = entry.peering.region_name.clone();
            match regions.iter_mut().find(|r| r.region == region) {
                Some(existing) => existing.vpc_peerings.push(peering),
                None => regions.push(PeeringRegion {
                    id: None,
                    region,
                    vpc_peerings: vec![peering],
                }),
            }
        }

        let listing = PeeringListing { regions };
        let resource = serde_json::to_value(&listing).map_err(|e| ApiError::Decode {
            operation: "list peerings".to_string(),
            message: e.to_string(),
        })?;
        let response = TaskResponse {
            resource_id: Some(subscription_id),
            resource: Some(resource),
            ..Default::default()
        };
        Ok(state.accept("vpcPeeringGetRequest", response))
    }

    async fn delete_active_active_peering(
        &self,
        subscription_id: i64,
        peering_id: i64,
    ) -> ApiResult<String> {
        let mut state = lock(&self.state);
        state.record(format!("delete_peering {}/{}", subscription_id, peering_id));
        let peerings = state.peerings.entry(subscription_id).or_default();
        let before = peerings.len();
        peerings.retain(|e| e.peering.id != peering_id);
        if peerings.len() == before {
            return Err(ApiError::not_found(format!(
                "delete peering {} of subscription {}",
                peering_id, subscription_id
            )));
        }

        Ok(state.accept("vpcPeeringDeleteRequest", resource_id(peering_id)))
    }
}
