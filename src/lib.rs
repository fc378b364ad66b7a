//! Asset administration backend: configured entities served through a generic
//! query builder, entity repository and resource dispatcher.

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{builtin, load_from_file, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError, StoreError};
pub use handlers::dispatch;
pub use migration::apply_migrations;
pub use response::Reply;
pub use routes::app;
pub use service::{AccountService, EntityRepository};
pub use settings::{Settings, Storage};
pub use state::AppState;
pub use store::{ensure_database_exists, Backend, MemoryBackend, PgBackend};
