//! Core traits for the convergence engine
//!
//! This module defines the abstract interfaces the engine is built against.
//!
//! - [`RemoteApi`]: One physical call to a remote control-plane API
//! - [`ResourceKind`]: Request builders and mappings for one resource family
//! - [`ResourceCache`]: Memoized describe listings

pub mod remote_api;
pub mod resource_cache;
pub mod resource_kind;

pub use remote_api::{ApiError, PaginationSpec, Params, RemoteApi, RemoteApiFactory};
pub use resource_cache::{CachedListing, ResourceCache};
pub use resource_kind::ResourceKind;
