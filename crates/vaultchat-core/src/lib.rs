pub mod config;
pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::ChatConfig;
pub use controllers::ChatController;
pub use models::session::{SessionError, SessionEvent};
