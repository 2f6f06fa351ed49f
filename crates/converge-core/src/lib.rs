// # converge-core
//
// Core library for converging remote control-plane resources toward a
// desired state.
//
// ## Architecture Overview
//
// - **RemoteApi**: Trait for one physical call to a remote API
// - **RequestExecutor**: Pagination, retry budget and payload normalization
// - **StatusPoller**: Bounded waits for server-side status transitions
// - **ConvergenceController**: Idempotent provision and dispose of one resource
// - **ResourceCache**: Optional memoization of describe listings
// - **ConvergeEngine**: Bundles the above and reports results as events
// - **ApiRegistry**: Plugin-based registry for remote API implementations
//
// ## Design Principles
//
// 1. **Single choke point**: Every remote call goes through the executor
// 2. **Describe before mutate**: Nothing is created or changed blindly
// 3. **Plugin-Based**: APIs and resource kinds live outside the core
// 4. **Library-First**: No global state; the library never reads the environment

pub mod cache;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod executor;
pub mod poller;
pub mod registry;
pub mod resource;
pub mod traits;

// Re-export core types for convenience
pub use cache::{FileResourceCache, MemoryResourceCache};
pub use config::{ApiConfig, CacheBackend, CacheConfig, EngineConfig, ExecutorConfig, PollerConfig};
pub use controller::{ConvergenceController, DisposeOutcome, ProvisionMode, ProvisionOutcome};
pub use engine::{ConvergeEngine, EngineEvent};
pub use error::{Error, Result};
pub use executor::{Items, OperationRequest, PayloadKey, RequestExecutor};
pub use poller::{PollOutcome, PollSpec, StatusPoller};
pub use registry::ApiRegistry;
pub use resource::{Attributes, Observation, Resource, Selector};
pub use traits::{ApiError, PaginationSpec, Params, RemoteApi, RemoteApiFactory, ResourceCache, ResourceKind};
