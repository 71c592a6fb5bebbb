use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::BuildDatabase;
use crate::core::error::BuildError;
use crate::core::store::TaskStore;
use crate::core::task::{
    BuildTarget, Task, TaskStatus, TaskUpdate, can_transition, predecessors,
};

fn target_from_columns(firmware_id: Option<String>, project_id: Option<String>) -> Option<BuildTarget> {
    let firmware_id = firmware_id.filter(|id| !id.is_empty());
    let project_id = project_id.filter(|id| !id.is_empty());
    match (firmware_id, project_id) {
        (Some(id), None) => Some(BuildTarget::Firmware(id)),
        (None, Some(id)) => Some(BuildTarget::Project(id)),
        _ => None,
    }
}

fn check_transition(task_id: &str, from: TaskStatus, to: TaskStatus) -> Result<(), BuildError> {
    if can_transition(from, to) {
        return Ok(());
    }
    let allowed: Vec<&str> = predecessors(to)
        .into_iter()
        .map(TaskStatus::as_str)
        .collect();
    Err(BuildError::Storage(format!(
        "task {} cannot move from {} to {} (only from: {})",
        task_id,
        from,
        to,
        allowed.join(", ")
    )))
}

/// Write `update` if the row still has status `from`. Returns whether a row
/// changed.
fn apply_update(
    db: &Connection,
    task_id: &str,
    from: TaskStatus,
    update: &TaskUpdate,
) -> Result<bool, BuildError> {
    let changed = db.execute(
        "UPDATE tasks
         SET status = ?1, stdout = ?2, stderr = ?3, firmware_file_path = ?4,
             updated_at = CURRENT_TIMESTAMP
         WHERE task_id = ?5 AND status = ?6",
        params![
            update.status.as_str(),
            update.stdout,
            update.stderr,
            update.firmware_file_path,
            task_id,
            from.as_str()
        ],
    )?;
    Ok(changed == 1)
}

impl BuildDatabase {
    pub async fn insert_task(
        &self,
        task_id: &str,
        uid: &str,
        target: &BuildTarget,
        parameters_json: &str,
    ) -> Result<(), BuildError> {
        let (firmware_id, project_id) = match target {
            BuildTarget::Firmware(id) => (Some(id.as_str()), None),
            BuildTarget::Project(id) => (None, Some(id.as_str())),
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO tasks (task_id, uid, status, firmware_id, project_id, parameters_json)
             VALUES (?1, ?2, 'waiting', ?3, ?4, ?5)",
            params![task_id, uid, firmware_id, project_id, parameters_json],
        )?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for BuildDatabase {
    async fn fetch_task(&self, task_id: &str) -> Result<Option<Task>, BuildError> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT task_id, uid, status, firmware_id, project_id, parameters_json,
                        stdout, stderr, firmware_file_path, created_at, updated_at
                 FROM tasks WHERE task_id = ?1",
                params![task_id],
                |row| {
                    Ok((
                        row.get::<_, String>(2)?,
                        Task {
                            task_id: row.get(0)?,
                            uid: row.get(1)?,
                            status: TaskStatus::Waiting,
                            target: target_from_columns(row.get(3)?, row.get(4)?),
                            parameters_json: row.get(5)?,
                            stdout: row.get(6)?,
                            stderr: row.get(7)?,
                            firmware_file_path: row.get(8)?,
                            created_at: row.get(9)?,
                            updated_at: row.get(10)?,
                        },
                    ))
                },
            )
            .optional()?;

        let Some((status, mut task)) = row else {
            return Ok(None);
        };
        task.status = TaskStatus::from_status(&status).ok_or_else(|| {
            BuildError::Storage(format!("task {} has an unknown status {:?}", task_id, status))
        })?;
        Ok(Some(task))
    }

    async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<(), BuildError> {
        let db = self.db.lock().await;
        let current: Option<String> = db
            .query_row(
                "SELECT status FROM tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;

        let current = current.ok_or_else(|| BuildError::NotFound(format!("task {}", task_id)))?;
        let current = TaskStatus::from_status(&current).ok_or_else(|| {
            BuildError::Storage(format!("task {} has an unknown status {:?}", task_id, current))
        })?;
        check_transition(task_id, current, update.status)?;
        apply_update(&db, task_id, current, update)?;
        Ok(())
    }

    async fn transition_task(
        &self,
        task_id: &str,
        expected: TaskStatus,
        update: &TaskUpdate,
    ) -> Result<bool, BuildError> {
        check_transition(task_id, expected, update.status)?;
        let db = self.db.lock().await;
        if apply_update(&db, task_id, expected, update)? {
            return Ok(true);
        }

        let exists: Option<i64> = db
            .query_row(
                "SELECT 1 FROM tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(false),
            None => Err(BuildError::NotFound(format!("task {}", task_id))),
        }
    }
}
