//! Database module - SQLite persistence for user settings

mod connection;
mod settings;

pub use connection::{get_db_path, init_database, Database};
pub use settings::SettingsDb;
