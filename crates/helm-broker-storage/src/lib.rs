//! Storage layer for the Helm Broker
//!
//! This crate defines the storage collaborators the broker services depend
//! on and ships an in-memory driver:
//! - Narrow capability traits (addon lookup, operation insert, ...)
//! - Tagged storage errors with an explicit [`ErrorKind`]
//! - `MemoryStorage`, whose writes are atomic per record key
//!
//! # Example
//!
//! ```rust,no_run
//! use helm_broker_storage::{MemoryStorage, InstanceGetter};
//! use helm_broker_core::InstanceId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::new();
//! let instances = storage.instances();
//!
//! match instances.get(&InstanceId::from("i-1")).await {
//!     Ok(instance) => println!("found {}", instance.release_name),
//!     Err(err) if err.is_not_found() => println!("no such instance"),
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core domain types for convenience
pub use helm_broker_core;

// Public modules
pub mod error;
pub mod memory;
pub mod repository;

// Re-exports for convenience
pub use error::{ErrorKind, OptionalExt, StorageError, StorageResult};
pub use memory::{
    MemoryAddonStore, MemoryBindDataStore, MemoryChartStore, MemoryInstanceStore,
    MemoryOperationStore, MemoryStorage,
};
pub use repository::{
    AddonFinder, AddonIdGetter, AddonWriter, BindDataGetter, BindDataInserter, BindDataRemover,
    ChartGetter, ChartWriter, InstanceGetter, InstanceInserter, InstanceRemover,
    OperationCollectionGetter, OperationGetter, OperationInserter, OperationRemover,
    OperationUpdater,
};
