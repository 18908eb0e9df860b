//! Settings database operations

use crate::db::Database;
use crate::error::Result;
use crate::types::Settings;
use rusqlite::params;

/// Settings database operations
pub struct SettingsDb;

impl SettingsDb {
    /// Load all settings from database, falling back to defaults per key
    pub fn load(db: &Database) -> Result<Settings> {
        let mut settings = Settings::default();
        let defaults = Settings::default();

        db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (key, value) = row?;
                match key.as_str() {
                    "download_path" => settings.download_path = expand_home(value),
                    "listen_port" => {
                        settings.listen_port = value.parse().unwrap_or(defaults.listen_port);
                    }
                    "enable_dht" => settings.enable_dht = value == "true",
                    "enable_lsd" => settings.enable_lsd = value == "true",
                    "enable_upnp" => settings.enable_upnp = value == "true",
                    "max_connections" => {
                        settings.max_connections =
                            value.parse().unwrap_or(defaults.max_connections);
                    }
                    "max_uploads" => {
                        settings.max_uploads = value.parse().unwrap_or(defaults.max_uploads);
                    }
                    "limit_download" => settings.limit_download = value == "true",
                    "download_limit" => {
                        settings.download_limit = value.parse().unwrap_or(defaults.download_limit);
                    }
                    "limit_upload" => settings.limit_upload = value == "true",
                    "upload_limit" => {
                        settings.upload_limit = value.parse().unwrap_or(defaults.upload_limit);
                    }
                    "user_agent" => settings.user_agent = value,
                    _ => {}
                }
            }

            Ok(())
        })?;

        Ok(settings)
    }

    /// Save a single setting
    pub fn set(db: &Database, key: &str, value: &str) -> Result<()> {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Save all settings
    pub fn save(db: &Database, settings: &Settings) -> Result<()> {
        Self::set(db, "download_path", &settings.download_path)?;
        Self::set(db, "listen_port", &settings.listen_port.to_string())?;
        Self::set(db, "enable_dht", bool_str(settings.enable_dht))?;
        Self::set(db, "enable_lsd", bool_str(settings.enable_lsd))?;
        Self::set(db, "enable_upnp", bool_str(settings.enable_upnp))?;
        Self::set(db, "max_connections", &settings.max_connections.to_string())?;
        Self::set(db, "max_uploads", &settings.max_uploads.to_string())?;
        Self::set(db, "limit_download", bool_str(settings.limit_download))?;
        Self::set(db, "download_limit", &settings.download_limit.to_string())?;
        Self::set(db, "limit_upload", bool_str(settings.limit_upload))?;
        Self::set(db, "upload_limit", &settings.upload_limit.to_string())?;
        Self::set(db, "user_agent", &settings.user_agent)?;
        Ok(())
    }

    /// Get a single setting value
    pub fn get(db: &Database, key: &str) -> Result<Option<String>> {
        db.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            );

            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(value: String) -> String {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if value == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings {
            download_path: "/srv/torrents".into(),
            listen_port: 51413,
            enable_lsd: false,
            limit_upload: true,
            upload_limit: 64,
            ..Settings::default()
        };

        SettingsDb::save(&db, &settings).unwrap();
        assert_eq!(SettingsDb::load(&db).unwrap(), settings);
        assert_eq!(SettingsDb::get(&db, "listen_port").unwrap().as_deref(), Some("51413"));
    }

    #[test]
    fn empty_store_yields_defaults_and_bad_values_fall_back() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(SettingsDb::load(&db).unwrap(), Settings::default());

        SettingsDb::set(&db, "max_connections", "lots").unwrap();
        assert_eq!(SettingsDb::load(&db).unwrap().max_connections, 200);
        assert_eq!(SettingsDb::get(&db, "missing").unwrap(), None);
    }

    #[test]
    fn home_prefix_is_expanded() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home("~/Torrents".to_string());
            assert_eq!(expanded, home.join("Torrents").to_string_lossy());
        }
        assert_eq!(expand_home("/abs".to_string()), "/abs");
    }
}
