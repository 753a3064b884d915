// searchcore — search-indexing and query core for a distributed
// personal-cloud file platform.
//
// See DESIGN.md for the grounding ledger and SPEC_FULL.md for the full
// module-by-module specification this crate implements.

pub mod activitylog;
pub mod auth_middleware;
pub mod config;
pub mod contracts;
pub mod debounce;
pub mod dispatcher;
pub mod dsl;
pub mod engine;
pub mod errors;
pub mod kql;
pub mod metrics;
pub mod observability;
pub mod photo;
pub mod resource;
pub mod schema;

pub use activitylog::{ActivityLogConfig, ActivityLogService};
pub use config::{AppConfig, BackendKind, Cli};
pub use contracts::{GetResource, ResourceInfo, ResourceReference};
pub use debounce::SpaceDebouncer;
pub use dispatcher::{Dispatcher, Event, EventBus, EventKind};
pub use engine::{Engine, Match, SearchReference, SearchRequest, SearchResult};
pub use errors::{Error, Result};
pub use metrics::SearchMetrics;
pub use observability::{init_logging, init_logging_with_level};
pub use photo::ProfilePhotoService;
pub use resource::{Activity, Resource, ResourceId, ResourceType, SpacePath};
