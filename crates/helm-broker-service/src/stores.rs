//! Storage capabilities handed to the services

use helm_broker_storage::{
    AddonFinder, AddonIdGetter, BindDataGetter, BindDataInserter, BindDataRemover, ChartGetter,
    InstanceGetter, InstanceInserter, InstanceRemover, MemoryStorage, OperationCollectionGetter,
    OperationGetter, OperationInserter, OperationUpdater,
};
use std::sync::Arc;

/// One handle per storage capability.
///
/// Each service picks the handles it needs when it is constructed.
#[derive(Clone)]
pub struct BrokerStorage {
    pub addon_getter: Arc<dyn AddonIdGetter>,
    pub addon_finder: Arc<dyn AddonFinder>,
    pub chart_getter: Arc<dyn ChartGetter>,
    pub instance_inserter: Arc<dyn InstanceInserter>,
    pub instance_getter: Arc<dyn InstanceGetter>,
    pub instance_remover: Arc<dyn InstanceRemover>,
    pub operation_inserter: Arc<dyn OperationInserter>,
    pub operation_getter: Arc<dyn OperationGetter>,
    pub operation_collection: Arc<dyn OperationCollectionGetter>,
    pub operation_updater: Arc<dyn OperationUpdater>,
    pub bind_data_getter: Arc<dyn BindDataGetter>,
    pub bind_data_inserter: Arc<dyn BindDataInserter>,
    pub bind_data_remover: Arc<dyn BindDataRemover>,
}

impl From<&MemoryStorage> for BrokerStorage {
    fn from(storage: &MemoryStorage) -> Self {
        Self {
            addon_getter: storage.addons(),
            addon_finder: storage.addons(),
            chart_getter: storage.charts(),
            instance_inserter: storage.instances(),
            instance_getter: storage.instances(),
            instance_remover: storage.instances(),
            operation_inserter: storage.operations(),
            operation_getter: storage.operations(),
            operation_collection: storage.operations(),
            operation_updater: storage.operations(),
            bind_data_getter: storage.bind_data(),
            bind_data_inserter: storage.bind_data(),
            bind_data_remover: storage.bind_data(),
        }
    }
}
