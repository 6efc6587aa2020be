pub mod app;
pub mod audit;
pub mod authz;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod jwt;
pub mod models;
pub mod permissions;
pub mod routes;
pub mod store;

// Re-export commonly used items for tests
pub use app::{create_app, AppState};
pub use permissions::{PermissionService, PermissionTemplateService};
pub use store::{PermissionStore, SqlitePermissionStore};
