pub mod api;
pub mod app;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod list;
pub mod models;
pub mod resource;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod ui;
pub mod widget;

pub use api::ApiClient;
pub use app::router;
pub use config::Config;
pub use resource::{RemoteResource, ResourceSpec, ResourceState};
pub use session::{SessionEvent, SessionGuard};
pub use state::AppState;
pub use stats::Dashboard;
pub use storage::Storage;
