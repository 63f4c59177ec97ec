//! Export catalog and refresh coordination

pub mod access;
pub mod coordinator;
pub mod metadata;
pub mod model;
pub mod query_store;
pub mod sink;
pub mod storage;

pub use access::{Visibility, can_access, visibility};
pub use coordinator::{DEFAULT_COOLDOWN, RefreshCoordinator, RefreshReport, RefreshState};
pub use metadata::MetadataStore;
pub use model::{BackendKind, CellValue, ExportDescriptor, QueryResult, Role, UPDATED_AT_FORMAT};
pub use query_store::{QueryPlan, QueryStore};
pub use sink::CsvSink;
