//! Startup lookup of a task's scopes through the queue service.
//!
//! With `--task-id` the proxy adds the task definition's `scopes` to the ones
//! given on the command line, so a worker can hand the proxy its task id
//! instead of repeating every scope.

use serde::Deserialize;
use trogon_hawk::{Delegator, ScopeSet};

use crate::clock::WallClock;
use crate::services::{ServiceRegistry, UnknownService};

#[derive(Debug, thiserror::Error)]
pub enum TaskScopesError {
    #[error(transparent)]
    UnknownService(#[from] UnknownService),

    #[error("failed to sign task lookup: {0}")]
    Signing(String),

    #[error("task lookup failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("queue answered task lookup with HTTP {0}")]
    Status(u16),

    #[error("task definition could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TaskDefinition {
    #[serde(default)]
    scopes: Vec<String>,
}

/// Fetch `GET {queue}/task/{task_id}` signed by `delegator` and return the
/// task's scopes. A task without a `scopes` field yields an empty set.
pub async fn fetch(
    client: &reqwest::Client,
    services: &ServiceRegistry,
    delegator: &Delegator,
    clock: &dyn WallClock,
    task_id: &str,
) -> Result<ScopeSet, TaskScopesError> {
    let route = services.resolve(&format!("/queue/v1/task/{task_id}"), None)?;

    let authorization = delegator
        .sign("GET", &route.target, clock.now())
        .map_err(|e| TaskScopesError::Signing(e.to_string()))?;

    tracing::info!(task_id, endpoint = %route.target, "Fetching task scopes");

    let response = client
        .get(route.target)
        .header(reqwest::header::AUTHORIZATION, authorization)
        .send()
        .await
        .map_err(TaskScopesError::Transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(TaskScopesError::Status(status.as_u16()));
    }

    let task: TaskDefinition = response.json().await.map_err(TaskScopesError::Decode)?;
    tracing::debug!(task_id, count = task.scopes.len(), "Loaded task scopes");
    Ok(ScopeSet::new(task.scopes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;
    use trogon_hawk::{Credentials, HmacSha256};
    use url::Url;

    fn delegator() -> Delegator {
        Delegator::new(
            Credentials::new("project/proxy", "secret"),
            ScopeSet::empty(),
            HmacSha256,
        )
    }

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    fn registry(server: &MockServer) -> ServiceRegistry {
        ServiceRegistry::new([("queue", Url::parse(&server.url("/v1")).unwrap())])
    }

    #[tokio::test]
    async fn returns_scopes_from_task_definition() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/task/T1")
                    .header_exists("authorization");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"taskGroupId":"G","scopes":["queue:get-artifact:*","secrets:get:x"]}"#);
            })
            .await;

        let scopes = fetch(
            &reqwest::Client::new(),
            &registry(&server),
            &delegator(),
            &clock(),
            "T1",
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(scopes.as_slice(), ["queue:get-artifact:*", "secrets:get:x"]);
    }

    #[tokio::test]
    async fn missing_scopes_field_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/task/T2");
                then.status(200).body(r#"{"taskGroupId":"G"}"#);
            })
            .await;

        let scopes = fetch(
            &reqwest::Client::new(),
            &registry(&server),
            &delegator(),
            &clock(),
            "T2",
        )
        .await
        .unwrap();
        assert!(scopes.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/task/missing");
                then.status(404).body(r#"{"code":"ResourceNotFound"}"#);
            })
            .await;

        let err = fetch(
            &reqwest::Client::new(),
            &registry(&server),
            &delegator(),
            &clock(),
            "missing",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskScopesError::Status(404)));
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/task/T3");
                then.status(200).body("not json");
            })
            .await;

        let err = fetch(
            &reqwest::Client::new(),
            &registry(&server),
            &delegator(),
            &clock(),
            "T3",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskScopesError::Decode(_)));
    }

    #[tokio::test]
    async fn registry_without_queue_is_unknown_service() {
        let err = fetch(
            &reqwest::Client::new(),
            &ServiceRegistry::default(),
            &delegator(),
            &clock(),
            "T4",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskScopesError::UnknownService(UnknownService(ref s)) if s == "queue"));
    }

    #[tokio::test]
    async fn missing_access_token_is_a_signing_error() {
        let server = MockServer::start_async().await;
        let unsigned = Delegator::new(Credentials::new("project/proxy", ""), ScopeSet::empty(), HmacSha256);

        let err = fetch(
            &reqwest::Client::new(),
            &registry(&server),
            &unsigned,
            &clock(),
            "T5",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskScopesError::Signing(_)));
    }
}
