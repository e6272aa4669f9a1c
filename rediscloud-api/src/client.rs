//! HTTP client for the Redis Cloud REST API

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CreatePeering, CreateSubscription, Database, DatabaseList, Subscription, TaskAccepted,
    UpdateSubscription,
};
use crate::service::{CloudApi, TaskFetcher};
use crate::task::Task;

const API_KEY_HEADER: &str = "x-api-key";
const API_SECRET_KEY_HEADER: &str = "x-api-secret-key";

/// REST client authenticated with an account key pair
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            header_value(&config.access_key)?,
        );
        headers.insert(
            HeaderName::from_static(API_SECRET_KEY_HEADER),
            header_value(&config.secret_key)?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn get<T: DeserializeOwned>(&self, name: &str, path: &str) -> ApiResult<T> {
        self.send(name, self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        name: &str,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(name, self.request(Method::POST, path).json(body))
            .await
    }

    async fn put<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        name: &str,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(name, self.request(Method::PUT, path).json(body))
            .await
    }

    async fn delete<T: DeserializeOwned>(&self, name: &str, path: &str) -> ApiResult<T> {
        self.send(name, self.request(Method::DELETE, path)).await
    }

    async fn send<T: DeserializeOwned>(&self, name: &str, request: RequestBuilder) -> ApiResult<T> {
        debug!("Sending request to {}", name);
        let response = request.send().await.map_err(|e| ApiError::Transport {
            operation: name.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            operation: name.to_string(),
            message: e.to_string(),
        })?;

        decode_response(name, status, &body)
    }
}

fn header_value(value: &str) -> ApiResult<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|e| ApiError::Configuration(format!("invalid API key: {}", e)))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Map an HTTP status and body onto a typed result
fn decode_response<T: DeserializeOwned>(name: &str, status: u16, body: &str) -> ApiResult<T> {
    if status == 404 {
        return Err(ApiError::not_found(name));
    }
    if !(200..300).contains(&status) {
        return Err(ApiError::Http {
            operation: name.to_string(),
            status,
            body: body.to_string(),
        });
    }
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        operation: name.to_string(),
        message: e.to_string(),
    })
}

fn task_path(id: &str) -> String {
    format!("/tasks/{}", urlencoding::encode(id))
}

#[async_trait]
impl TaskFetcher for RestClient {
    async fn get_task(&self, id: &str) -> ApiResult<Task> {
        self.get(&format!("retrieve task {}", id), &task_path(id))
            .await
    }
}

#[async_trait]
impl CloudApi for RestClient {
    async fn create_subscription(&self, request: &CreateSubscription) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .post("create subscription", "/subscriptions", request)
            .await?;
        Ok(accepted.task_id)
    }

    async fn get_subscription(&self, subscription_id: i64) -> ApiResult<Subscription> {
        self.get(
            &format!("retrieve subscription {}", subscription_id),
            &format!("/subscriptions/{}", subscription_id),
        )
        .await
    }

    async fn update_subscription(
        &self,
        subscription_id: i64,
        request: &UpdateSubscription,
    ) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .put(
                &format!("update subscription {}", subscription_id),
                &format!("/subscriptions/{}", subscription_id),
                request,
            )
            .await?;
        Ok(accepted.task_id)
    }

    async fn delete_subscription(&self, subscription_id: i64) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .delete(
                &format!("delete subscription {}", subscription_id),
                &format!("/subscriptions/{}", subscription_id),
            )
            .await?;
        Ok(accepted.task_id)
    }

    async fn list_databases(&self, subscription_id: i64) -> ApiResult<Vec<Database>> {
        let list: DatabaseList = self
            .get(
                &format!("list databases of subscription {}", subscription_id),
                &format!("/subscriptions/{}/databases", subscription_id),
            )
            .await?;
        Ok(list.into_databases())
    }

    async fn get_database(&self, subscription_id: i64, database_id: i64) -> ApiResult<Database> {
        self.get(
            &format!(
                "retrieve database {} in subscription {}",
                database_id, subscription_id
            ),
            &format!(
                "/subscriptions/{}/databases/{}",
                subscription_id, database_id
            ),
        )
        .await
    }

    async fn delete_database(&self, subscription_id: i64, database_id: i64) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .delete(
                &format!(
                    "delete database {} in subscription {}",
                    database_id, subscription_id
                ),
                &format!(
                    "/subscriptions/{}/databases/{}",
                    subscription_id, database_id
                ),
            )
            .await?;
        Ok(accepted.task_id)
    }

    async fn create_active_active_peering(
        &self,
        subscription_id: i64,
        request: &CreatePeering,
    ) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .post(
                &format!("create peering for subscription {}", subscription_id),
                &format!("/subscriptions/{}/regions/peerings", subscription_id),
                request,
            )
            .await?;
        Ok(accepted.task_id)
    }

    async fn list_active_active_peerings(&self, subscription_id: i64) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .get(
                &format!("list peerings of subscription {}", subscription_id),
                &format!("/subscriptions/{}/regions/peerings", subscription_id),
            )
            .await?;
        Ok(accepted.task_id)
    }

    async fn delete_active_active_peering(
        &self,
        subscription_id: i64,
        peering_id: i64,
    ) -> ApiResult<String> {
        let accepted: TaskAccepted = self
            .delete(
                &format!(
                    "delete peering {} of subscription {}",
                    peering_id, subscription_id
                ),
                &format!(
                    "/subscriptions/{}/regions/peerings/{}",
                    subscription_id, peering_id
                ),
            )
            .await?;
        Ok(accepted.task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn task_ids_are_path_escaped() {
        assert_eq!(task_path("abc-123"), "/tasks/abc-123");
        assert_eq!(task_path("a/b c"), "/tasks/a%2Fb%20c");
    }

    #[test]
    fn not_found_is_distinguished() {
        let err = decode_response::<Subscription>("retrieve subscription 1", 404, "")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn non_success_carries_body() {
        let err = decode_response::<Subscription>("retrieve subscription 1", 401, "denied")
            .unwrap_err();
        match err {
            ApiError::Http { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "denied");
            }
            other => panic!("Expected Http error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode_response::<Task>("retrieve task t", 200, "{not json").unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn success_decodes_body() {
        let task: Task = decode_response(
            "retrieve task t",
            200,
            r#"{"taskId":"t","status":"received"}"#,
        )
        .unwrap();
        assert_eq!(task.status(), TaskStatus::Received);
    }

    #[test]
    fn client_builds_from_config() {
        let config = ClientConfig::new("access", "secret")
            .with_base_url("http://localhost:9000/v1/")
            .unwrap();
        let client = RestClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000/v1");
    }

    #[test]
    fn invalid_key_is_rejected() {
        let config = ClientConfig::new("bad\nkey", "secret");
        assert!(matches!(
            RestClient::new(&config),
            Err(ApiError::Configuration(_))
        ));
    }
}
