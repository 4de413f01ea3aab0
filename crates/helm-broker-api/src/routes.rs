//! API route definitions
//!
//! The OSB v2 routes are mounted twice: under `/cluster` for cluster-wide
//! addons and under `/ns/{namespace}` for namespaced ones.

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use crate::{
    handlers::{
        bind, deprovision, get_binding, get_catalog, last_operation, live, provision, ready,
        unbind, AppState,
    },
    middleware::require_api_version,
};

/// Prefix of the cluster-wide broker
pub const CLUSTER_PREFIX: &str = "/cluster";

/// Prefix of the namespaced brokers
pub const NAMESPACE_PREFIX: &str = "/ns/{namespace}";

/// Build the API router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .merge(osb_routes(CLUSTER_PREFIX))
        .merge(osb_routes(NAMESPACE_PREFIX))
        .with_state(state)
}

fn osb_routes(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{}/v2/catalog", prefix), get(get_catalog))
        .route(
            &format!("{}/v2/service_instances/{{instance_id}}", prefix),
            put(provision).delete(deprovision),
        )
        .route(
            &format!("{}/v2/service_instances/{{instance_id}}/last_operation", prefix),
            get(last_operation),
        )
        .route(
            &format!(
                "{}/v2/service_instances/{{instance_id}}/service_bindings/{{binding_id}}",
                prefix
            ),
            put(bind).get(get_binding).delete(unbind),
        )
        .route_layer(middleware::from_fn(require_api_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use helm_broker_core::{Chart, ChartValues, Namespace, ReleaseName};
    use helm_broker_service::{Broker, HelmClient, InstallResponse, InstallerError};
    use helm_broker_storage::MemoryStorage;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct NoopInstaller;

    #[async_trait]
    impl HelmClient for NoopInstaller {
        async fn install(
            &self,
            _chart: &Chart,
            _values: &ChartValues,
            release_name: &ReleaseName,
            namespace: &Namespace,
        ) -> Result<InstallResponse, InstallerError> {
            Ok(InstallResponse {
                release_name: release_name.clone(),
                namespace: namespace.clone(),
                status: None,
            })
        }

        async fn delete(&self, _release_name: &ReleaseName) -> Result<(), InstallerError> {
            Ok(())
        }
    }

    fn router() -> Router {
        let storage = MemoryStorage::new();
        let broker = Broker::builder()
            .storage((&storage).into())
            .installer(Arc::new(NoopInstaller))
            .build()
            .unwrap();
        build_router(AppState::new(broker))
    }

    async fn send(method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Broker-API-Version", "2.14")
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_live() {
        let response = router()
            .oneshot(Request::get("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready() {
        let (status, body) = send("GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_api_version_header() {
        let response = router()
            .oneshot(
                Request::get("/cluster/v2/catalog")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_empty_catalogs() {
        for uri in ["/cluster/v2/catalog", "/ns/stage/v2/catalog"] {
            let (status, body) = send("GET", uri, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"services": []}));
        }
    }

    #[tokio::test]
    async fn test_provision_requires_accepts_incomplete() {
        let body = json!({"service_id": "a1", "plan_id": "p1"});
        let (status, body) = send("PUT", "/cluster/v2/service_instances/i1", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "AsyncRequired");
    }

    #[tokio::test]
    async fn test_provision_unknown_addon() {
        let body = json!({
            "service_id": "a1",
            "plan_id": "p1",
            "context": {"platform": "kubernetes", "namespace": "stage"}
        });
        let (status, body) = send(
            "PUT",
            "/ns/stage/v2/service_instances/i1?accepts_incomplete=true",
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_deprovision_unknown_instance_is_gone() {
        let (status, body) = send(
            "DELETE",
            "/cluster/v2/service_instances/i1?accepts_incomplete=true&service_id=a1&plan_id=p1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_last_operation_unknown_instance() {
        let (status, _) = send(
            "GET",
            "/cluster/v2/service_instances/i1/last_operation?operation=op1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unbind_always_succeeds() {
        let (status, body) = send(
            "DELETE",
            "/cluster/v2/service_instances/i1/service_bindings/b1?service_id=a1&plan_id=p1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }
}
