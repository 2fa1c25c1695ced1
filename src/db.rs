use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{JobApplication, UserProfile};

pub const APPLICATIONS_KEY: &str = "job-search-dashboard";
pub const PROFILE_KEY: &str = "job-search-user-profile";

/// Local key-value store backed by a single SQLite file. Holds the
/// application list, the user profile and the gate secret as JSON/text
/// values; the store owns the in-memory copy.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    // --- Raw key-value operations ---

    pub fn get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }

    // --- Applications ---

    /// `None` when nothing was ever saved, so the caller can seed samples.
    pub fn load_applications(&self) -> Result<Option<Vec<JobApplication>>, StoreError> {
        match self.get(APPLICATIONS_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_applications(&self, apps: &[JobApplication]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(apps)?;
        self.set(APPLICATIONS_KEY, &raw)?;
        debug!(count = apps.len(), "saved applications");
        Ok(())
    }

    pub fn clear_applications(&self) -> Result<(), StoreError> {
        self.remove(APPLICATIONS_KEY)?;
        Ok(())
    }

    // --- Profile ---

    pub fn load_profile(&self) -> Result<Option<UserProfile>> {
        match self.get(PROFILE_KEY)? {
            Some(raw) => {
                let profile = serde_json::from_str(&raw).context("Stored profile is corrupt")?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let raw = serde_json::to_string(profile)?;
        self.set(PROFILE_KEY, &raw)?;
        Ok(())
    }
}

// --- Snapshot files ---

pub fn export_file_name(today: NaiveDate) -> String {
    format!("job-applications-{}.json", today.format("%Y-%m-%d"))
}

pub fn snapshot_json(apps: &[JobApplication]) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(apps)?)
}

/// Writes a snapshot produced by `snapshot_json` into `dir`.
pub fn export_to_file(snapshot: &str, dir: &Path, today: NaiveDate) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    let path = dir.join(export_file_name(today));
    std::fs::write(&path, snapshot)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "exported applications");
    Ok(path)
}

pub fn import_from_file(path: &Path) -> Result<Vec<JobApplication>, StoreError> {
    let bytes = std::fs::read(path)
        .map_err(|e| StoreError::Import(format!("Error reading file {}: {}", path.display(), e)))?;
    parse_snapshot(&bytes)
}

/// Parses the exported format, rejecting the whole file on the first
/// structural problem.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<JobApplication>, StoreError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Import(format!("Invalid JSON file: {}", e)))?;

    let items = value
        .as_array()
        .ok_or_else(|| StoreError::Import("Expected an array of applications".to_string()))?;

    let mut apps = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let app: JobApplication = serde_json::from_value(item.clone())
            .map_err(|e| StoreError::Import(format!("Record {}: {}", i, e)))?;
        if app.company.trim().is_empty() || app.role.trim().is_empty() {
            return Err(StoreError::Import(format!(
                "Record {}: company and role are required",
                i
            )));
        }
        if !seen.insert(app.id.clone()) {
            return Err(StoreError::Import(format!(
                "Record {}: duplicate id '{}'",
                i, app.id
            )));
        }
        apps.push(app);
    }
    Ok(apps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::sample_applications;
    use chrono::{TimeZone, Utc};

    fn samples() -> Vec<JobApplication> {
        let now = Utc.with_ymd_and_hms(2024, 6, 12, 9, 30, 0).unwrap();
        sample_applications(now.date_naive(), now)
    }

    #[test]
    fn test_load_applications_none_before_first_save() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_applications().unwrap().is_none());

        db.save_applications(&[]).unwrap();
        assert_eq!(db.load_applications().unwrap(), Some(vec![]));

        db.clear_applications().unwrap();
        assert!(db.load_applications().unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_collection() {
        let db = Database::open_in_memory().unwrap();
        let apps = samples();
        db.save_applications(&apps).unwrap();
        db.save_applications(&apps[..2]).unwrap();
        assert_eq!(db.load_applications().unwrap().unwrap(), apps[..2].to_vec());
    }

    #[test]
    fn test_profile_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_profile().unwrap().is_none());
        let profile = UserProfile {
            name: "Ada".to_string(),
            experience: "10 years".to_string(),
            skills: "Rust".to_string(),
            api_key: "sk-test".to_string(),
            ..Default::default()
        };
        db.save_profile(&profile).unwrap();
        assert_eq!(db.load_profile().unwrap(), Some(profile));
        let raw = db.get(PROFILE_KEY).unwrap().unwrap();
        assert!(raw.contains("\"apiKey\""));
    }

    #[test]
    fn test_open_creates_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("apptrack.db");
        {
            let db = Database::open(&path).unwrap();
            db.set("k", "v").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_export_file_name_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        let apps = samples();
        let today = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let path = export_to_file(&snapshot_json(&apps).unwrap(), dir.path(), today).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "job-applications-2024-06-12.json"
        );
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("[\n"));
        assert_eq!(import_from_file(&path).unwrap(), apps);
    }

    #[test]
    fn test_parse_snapshot_rejects_bad_input() {
        let err = parse_snapshot(b"not json").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON file"));

        let err = parse_snapshot(br#"{"id": "1"}"#).unwrap_err();
        assert!(err.to_string().contains("array"));

        let err = parse_snapshot(br#"[{"id": "1", "company": "Acme"}]"#).unwrap_err();
        assert!(matches!(err, StoreError::Import(_)));

        let err = parse_snapshot(
            br#"[{"id":"1","company":"Acme","role":"Dev","applicationDate":"2024-01-01",
                 "method":"Carrier Pigeon","stage":"Applied","priority":5,
                 "createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Record 0"));
    }

    #[test]
    fn test_parse_snapshot_rejects_duplicate_ids() {
        let mut apps = samples();
        apps[1].id = apps[0].id.clone();
        let json = snapshot_json(&apps).unwrap();
        let err = parse_snapshot(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn test_import_missing_file_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = import_from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, StoreError::Import(_)));
    }

    #[test]
    fn test_corrupt_saved_collection_is_a_serialize_error() {
        let db = Database::open_in_memory().unwrap();
        db.set(APPLICATIONS_KEY, "{not json").unwrap();
        assert!(matches!(db.load_applications(), Err(StoreError::Serialize(_))));
    }
}
