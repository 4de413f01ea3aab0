//! Helpers shared by the asynchronous operations

use helm_broker_core::{InstanceId, OperationId, OperationState};
use helm_broker_storage::OperationUpdater;
use tracing::{error, info, warn};

/// How often a request re-reads state after losing the operation claim
pub(crate) const MAX_CLAIM_ATTEMPTS: usize = 3;

pub(crate) const PROVISION_SUCCEEDED: &str = "provisioning succeeded";
pub(crate) const DEPROVISION_SUCCEEDED: &str = "deprovision succeeded";

pub(crate) fn provision_failed(cause: impl std::fmt::Display) -> String {
    format!("provisioning failed on error: {}", cause)
}

pub(crate) fn deprovision_failed(cause: impl std::fmt::Display) -> String {
    format!("deprovisioning failed on error: {}", cause)
}

/// Move an operation to its final state.
///
/// Runs after the platform got its answer, so failures can only be logged.
pub(crate) async fn complete(
    updater: &dyn OperationUpdater,
    instance_id: &InstanceId,
    operation_id: &OperationId,
    state: OperationState,
    description: String,
) {
    match state {
        OperationState::Failed => warn!(
            instance_id = %instance_id,
            operation_id = %operation_id,
            "{}", description
        ),
        _ => info!(
            instance_id = %instance_id,
            operation_id = %operation_id,
            "{}", description
        ),
    }

    if let Err(err) = updater
        .update_state_desc(instance_id, operation_id, state, Some(description))
        .await
    {
        error!(
            instance_id = %instance_id,
            operation_id = %operation_id,
            error = %err,
            "Failed to record operation state {}", state
        );
    }
}
