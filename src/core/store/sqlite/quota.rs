use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};

use super::BuildDatabase;
use crate::core::error::BuildError;
use crate::core::store::QuotaStore;

impl BuildDatabase {
    pub async fn set_remaining_builds(&self, uid: &str, remaining: i64) -> Result<(), BuildError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO user_quotas (uid, remaining_builds) VALUES (?1, ?2)
             ON CONFLICT(uid) DO UPDATE SET remaining_builds = excluded.remaining_builds,
                                            updated_at = CURRENT_TIMESTAMP",
            params![uid, remaining],
        )?;
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for BuildDatabase {
    async fn remaining_builds(&self, uid: &str) -> Result<i64, BuildError> {
        let db = self.db.lock().await;
        let remaining: Option<i64> = db
            .query_row(
                "SELECT remaining_builds FROM user_quotas WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(remaining.unwrap_or(0))
    }

    async fn decrement_if_positive(&self, uid: &str) -> Result<bool, BuildError> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE user_quotas
             SET remaining_builds = remaining_builds - 1, updated_at = CURRENT_TIMESTAMP
             WHERE uid = ?1 AND remaining_builds > 0",
            params![uid],
        )?;
        Ok(updated == 1)
    }
}
