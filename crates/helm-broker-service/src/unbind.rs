//! Unbind service
//!
//! Bind data belongs to the instance and is shared by all of its bindings,
//! so unbinding revokes nothing. The data is removed with the instance.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::dto::UnbindRequest;
use crate::error::ServiceResult;

/// Trait for unbind operations
#[async_trait]
pub trait UnbindService: Send + Sync {
    async fn unbind(&self, request: UnbindRequest) -> ServiceResult<()>;
}

/// Default implementation of UnbindService
#[derive(Debug, Default)]
pub struct DefaultUnbindService;

impl DefaultUnbindService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UnbindService for DefaultUnbindService {
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id, binding_id = %request.binding_id))]
    async fn unbind(&self, request: UnbindRequest) -> ServiceResult<()> {
        debug!("Unbind requested, nothing to revoke");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_broker_core::{BindingId, InstanceId};

    #[tokio::test]
    async fn test_unbind_always_succeeds() {
        let svc = DefaultUnbindService::new();
        svc.unbind(UnbindRequest {
            instance_id: InstanceId::from("unknown"),
            binding_id: BindingId::from("b1"),
        })
        .await
        .unwrap();
    }
}
