mod quota;
mod records;
mod tasks;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

/// SQLite-backed task, record and quota storage.
#[derive(Clone)]
pub struct BuildDatabase {
    db: Arc<Mutex<Connection>>,
}

impl BuildDatabase {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
                NativePlatform::restrict_dir_permissions(parent);
            }
        }

        let db = Connection::open(path)?;
        NativePlatform::restrict_file_permissions(path);
        Self::init_schema(&db)?;
        info!("Build database ready at {}", path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'waiting',
                firmware_id TEXT,
                project_id TEXT,
                parameters_json TEXT NOT NULL DEFAULT '',
                stdout TEXT NOT NULL DEFAULT '',
                stderr TEXT NOT NULL DEFAULT '',
                firmware_file_path TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS firmwares (
                firmware_id TEXT PRIMARY KEY,
                keyboard_definition_id TEXT NOT NULL,
                uid TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 0,
                qmk_firmware_version TEXT NOT NULL,
                keyboard_directory_name TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                project_id TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                qmk_firmware_version TEXT NOT NULL,
                keyboard_directory_name TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS source_files (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL UNIQUE,
                record_kind TEXT NOT NULL,
                record_id TEXT NOT NULL,
                file_kind TEXT NOT NULL,
                path TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_source_files_record
                ON source_files (record_kind, record_id, file_kind)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS user_quotas (
                uid TEXT PRIMARY KEY,
                remaining_builds INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }
}
