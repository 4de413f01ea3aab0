//! Common test utilities and helpers
//!
//! Spins the broker API on an ephemeral port over in-memory storage and a
//! fake installer, and provides request helpers for the OSB routes.

#![allow(dead_code)]

use async_trait::async_trait;
use helm_broker_api::build_api_server;
use helm_broker_core::{Chart, ChartValues, Namespace, ReleaseName};
use helm_broker_service::{
    Broker, HelmClient, InstallResponse, InstallerError, SequentialIdProvider,
};
use helm_broker_storage::MemoryStorage;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

pub mod fixtures;

/// Broker API version sent by the test client
pub const API_VERSION: &str = "2.14";

/// A recorded install call
#[derive(Debug, Clone)]
pub struct InstallCall {
    pub release_name: ReleaseName,
    pub namespace: Namespace,
    pub values: ChartValues,
}

/// Installer double that records calls and fails on demand
#[derive(Default)]
pub struct FakeInstaller {
    installs: Mutex<Vec<InstallCall>>,
    deletes: Mutex<Vec<ReleaseName>>,
    install_error: Mutex<Option<String>>,
    delete_error: Mutex<Option<String>>,
    gate: Option<Semaphore>,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs and deletes block until [`FakeInstaller::release`] is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Let `n` blocked calls through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn fail_installs(&self, message: &str) {
        *self.install_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_deletes(&self, message: &str) {
        *self.delete_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn succeed(&self) {
        *self.install_error.lock().unwrap() = None;
        *self.delete_error.lock().unwrap() = None;
    }

    pub fn installs(&self) -> Vec<InstallCall> {
        self.installs.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<ReleaseName> {
        self.deletes.lock().unwrap().clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl HelmClient for FakeInstaller {
    async fn install(
        &self,
        _chart: &Chart,
        values: &ChartValues,
        release_name: &ReleaseName,
        namespace: &Namespace,
    ) -> Result<InstallResponse, InstallerError> {
        self.installs.lock().unwrap().push(InstallCall {
            release_name: release_name.clone(),
            namespace: namespace.clone(),
            values: values.clone(),
        });
        self.pass_gate().await;

        if let Some(message) = self.install_error.lock().unwrap().clone() {
            return Err(InstallerError::Rejected {
                status: 500,
                message,
            });
        }
        Ok(InstallResponse {
            release_name: release_name.clone(),
            namespace: namespace.clone(),
            status: Some("deployed".to_string()),
        })
    }

    async fn delete(&self, release_name: &ReleaseName) -> Result<(), InstallerError> {
        self.deletes.lock().unwrap().push(release_name.clone());
        self.pass_gate().await;

        if let Some(message) = self.delete_error.lock().unwrap().clone() {
            return Err(InstallerError::Transport(message));
        }
        Ok(())
    }
}

/// Test application state
pub struct TestApp {
    pub address: String,
    pub broker: Broker,
    pub storage: MemoryStorage,
    pub installer: Arc<FakeInstaller>,
    client: reqwest::Client,
}

impl TestApp {
    /// Create a new test application with the seeded catalog
    pub async fn new() -> Self {
        Self::with_installer(FakeInstaller::new()).await
    }

    pub async fn with_installer(installer: FakeInstaller) -> Self {
        let storage = MemoryStorage::new();
        fixtures::seed(&storage).await;

        let installer = Arc::new(installer);
        let broker = Broker::builder()
            .storage((&storage).into())
            .installer(installer.clone())
            .key_refs(Arc::new(fixtures::key_refs()))
            .id_provider(Arc::new(SequentialIdProvider::new()))
            .build()
            .expect("Failed to build broker");

        let app = build_api_server(broker.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let address = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to start test server");
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build client");

        Self {
            address: format!("http://{}", address),
            broker,
            storage,
            installer,
            client,
        }
    }

    /// Get base URL
    pub fn url(&self) -> &str {
        &self.address
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Wait until every background install and delete has finished
    pub async fn settle(&self) {
        self.broker.wait_for_operations().await;
    }

    /// Cluster-wide OSB path
    pub fn cluster(&self, path: &str) -> String {
        format!("{}/cluster/v2/{}", self.address, path)
    }

    /// Namespaced OSB path
    pub fn namespaced(&self, namespace: &str, path: &str) -> String {
        format!("{}/ns/{}/v2/{}", self.address, namespace, path)
    }

    pub async fn get(&self, url: &str) -> reqwest::Response {
        self.client
            .get(url)
            .header("X-Broker-API-Version", API_VERSION)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn put(&self, url: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(url)
            .header("X-Broker-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn delete(&self, url: &str) -> reqwest::Response {
        self.client
            .delete(url)
            .header("X-Broker-API-Version", API_VERSION)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// `PUT service_instances/{id}` on the cluster-wide broker
    pub async fn provision(&self, instance_id: &str, body: &Value) -> reqwest::Response {
        let url = self.cluster(&format!(
            "service_instances/{}?accepts_incomplete=true",
            instance_id
        ));
        self.put(&url, body).await
    }

    /// `DELETE service_instances/{id}` on the cluster-wide broker
    pub async fn deprovision(&self, instance_id: &str) -> reqwest::Response {
        let url = self.cluster(&format!(
            "service_instances/{}?accepts_incomplete=true&service_id={}&plan_id={}",
            instance_id,
            fixtures::REDIS_ID,
            fixtures::MICRO_PLAN_ID
        ));
        self.delete(&url).await
    }

    /// Poll `last_operation` until the operation leaves `in progress`
    pub async fn await_operation(&self, instance_id: &str, operation: &str) -> Value {
        let url = self.cluster(&format!(
            "service_instances/{}/last_operation?operation={}",
            instance_id, operation
        ));
        for _ in 0..100 {
            let response = self.get(&url).await;
            assert_status(&response, reqwest::StatusCode::OK);
            let body: Value = response.json().await.expect("Failed to parse JSON");
            if body["state"] != "in progress" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("operation {} of {} did not finish", operation, instance_id);
    }
}

/// Assert the response has the expected status
pub fn assert_status(response: &reqwest::Response, expected: reqwest::StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status for {}",
        response.url()
    );
}

/// Read the `operation` field of a 202 response
pub async fn operation_of(response: reqwest::Response) -> String {
    assert_status(&response, reqwest::StatusCode::ACCEPTED);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    body["operation"]
        .as_str()
        .expect("operation missing")
        .to_string()
}
