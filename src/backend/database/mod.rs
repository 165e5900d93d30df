//! SQLite persistence for the PBX resources
//!
//! Persistors borrow a `SqliteConnection`, usually the one behind a
//! transaction opened with [`SqliteBackend::begin`], so a whole request
//! commits or rolls back together.
//!
//! ```text
//! persistor (line.rs, extension.rs, owner.rs, ...)
//!     ├── search.rs  criteria and paging over a column map
//!     ├── fixes.rs   recompute denormalized owner fields
//!     └── schema.rs  tables, indexes and lookup rows
//! ```

pub mod config;
pub mod endpoint;
pub mod extension;
pub mod fixes;
pub mod func_key;
pub mod func_key_template;
pub mod line;
pub mod lookup;
pub mod outcall_trunk;
pub mod owner;
pub mod schema;
pub mod search;
pub mod sqlite;
pub mod tenant;
pub mod trunk;

pub use config::DatabaseBackendConfig;
pub use endpoint::EndpointPersistor;
pub use extension::ExtensionPersistor;
pub use fixes::{ExtensionFixes, LineFixes, OwnerFixes, TrunkFixes};
pub use func_key::FuncKeyPersistor;
pub use func_key_template::FuncKeyTemplatePersistor;
pub use line::LinePersistor;
pub use outcall_trunk::OutcallTrunkPersistor;
pub use owner::{ConferencePersistor, GroupPersistor, OutcallPersistor, QueuePersistor};
pub use search::{criteria, Criteria, SearchConfig, SearchParameters, SearchResult, SortOrder};
pub use sqlite::SqliteBackend;
pub use tenant::TenantPersistor;
pub use trunk::TrunkPersistor;
