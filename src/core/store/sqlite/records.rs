use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};

use super::BuildDatabase;
use crate::core::error::BuildError;
use crate::core::store::RecordStore;
use crate::core::task::{BuildRecord, BuildTarget, FileKind, RecordKind, SourceFile};

impl BuildDatabase {
    /// Create the firmware record if it does not exist yet. New records start
    /// disabled. Returns `true` when a record was created.
    pub async fn ensure_firmware(
        &self,
        firmware_id: &str,
        uid: &str,
        qmk_firmware_version: &str,
    ) -> Result<bool, BuildError> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO firmwares
                (firmware_id, keyboard_definition_id, uid, enabled, qmk_firmware_version)
             VALUES (?1, ?1, ?2, 0, ?3)",
            params![firmware_id, uid, qmk_firmware_version],
        )?;
        Ok(inserted > 0)
    }

    pub async fn set_firmware_enabled(
        &self,
        firmware_id: &str,
        enabled: bool,
    ) -> Result<bool, BuildError> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE firmwares SET enabled = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE firmware_id = ?2",
            params![enabled as i32, firmware_id],
        )?;
        Ok(updated > 0)
    }

    pub async fn set_keyboard_directory_name(
        &self,
        target: &BuildTarget,
        directory_name: Option<&str>,
    ) -> Result<bool, BuildError> {
        let db = self.db.lock().await;
        let sql = match target {
            BuildTarget::Firmware(_) => {
                "UPDATE firmwares SET keyboard_directory_name = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE firmware_id = ?2"
            }
            BuildTarget::Project(_) => {
                "UPDATE projects SET keyboard_directory_name = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE project_id = ?2"
            }
        };
        let updated = db.execute(sql, params![directory_name, target.id()])?;
        Ok(updated > 0)
    }

    pub async fn insert_project(
        &self,
        project_id: &str,
        uid: &str,
        qmk_firmware_version: &str,
    ) -> Result<(), BuildError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO projects (project_id, uid, qmk_firmware_version) VALUES (?1, ?2, ?3)",
            params![project_id, uid, qmk_firmware_version],
        )?;
        Ok(())
    }

    /// Attach a new source file to a record. Returns the generated file ID.
    pub async fn insert_source_file(
        &self,
        target: &BuildTarget,
        kind: FileKind,
        path: &str,
        content: &str,
    ) -> Result<String, BuildError> {
        let file_id = uuid::Uuid::new_v4().simple().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO source_files (file_id, record_kind, record_id, file_kind, path, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file_id,
                target.kind().as_str(),
                target.id(),
                kind.as_str(),
                path,
                content
            ],
        )?;
        Ok(file_id)
    }
}

#[async_trait]
impl RecordStore for BuildDatabase {
    async fn fetch_firmware(&self, firmware_id: &str) -> Result<Option<BuildRecord>, BuildError> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                "SELECT firmware_id, uid, enabled, qmk_firmware_version, keyboard_directory_name
                 FROM firmwares WHERE firmware_id = ?1",
                params![firmware_id],
                |row| {
                    Ok(BuildRecord {
                        kind: RecordKind::Firmware,
                        id: row.get(0)?,
                        uid: row.get(1)?,
                        enabled: row.get::<_, i32>(2)? != 0,
                        qmk_firmware_version: row.get(3)?,
                        keyboard_directory_name: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn fetch_project(&self, project_id: &str) -> Result<Option<BuildRecord>, BuildError> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                "SELECT project_id, uid, qmk_firmware_version, keyboard_directory_name
                 FROM projects WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok(BuildRecord {
                        kind: RecordKind::Project,
                        id: row.get(0)?,
                        uid: row.get(1)?,
                        enabled: true,
                        qmk_firmware_version: row.get(2)?,
                        keyboard_directory_name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn fetch_files(
        &self,
        target: &BuildTarget,
        kind: FileKind,
    ) -> Result<Vec<SourceFile>, BuildError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT file_id, path, content FROM source_files
             WHERE record_kind = ?1 AND record_id = ?2 AND file_kind = ?3
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(
            params![target.kind().as_str(), target.id(), kind.as_str()],
            |row| {
                Ok(SourceFile::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }
}
