// src/services/redis_service.rs
use crate::errors::StudioError;
use crate::models::{StudioState, new_id};
use crate::services::session;
use redis::{AsyncCommands, Client};

const SNAPSHOT_TTL_SECS: usize = 86400;

fn snapshot_key(id: &str) -> String {
    format!("snapshot:{}", id)
}

/// Short-lived server-side copies of the session document.
pub struct SnapshotStore {
    client: Client,
}

impl SnapshotStore {
    pub async fn new(redis_url: &str) -> Result<Self, StudioError> {
        let client = Client::open(redis_url).map_err(|e| StudioError::Redis(e.to_string()))?;

        // Test connection
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| StudioError::Redis(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| StudioError::Redis(e.to_string()))?;

        Ok(Self { client })
    }

    /// Stores `state` for 24 hours and returns the snapshot id.
    pub async fn save(&self, state: &StudioState) -> Result<String, StudioError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| StudioError::Redis(e.to_string()))?;

        let id = new_id();
        let value = session::export(state)?;

        conn.set_ex::<_, _, ()>(snapshot_key(&id), value, SNAPSHOT_TTL_SECS)
            .await
            .map_err(|e| StudioError::Redis(e.to_string()))?;

        Ok(id)
    }

    /// Validated the same way as a file import.
    pub async fn load(&self, id: &str) -> Result<StudioState, StudioError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| StudioError::Redis(e.to_string()))?;

        let value: Option<String> = conn
            .get(snapshot_key(id))
            .await
            .map_err(|e| StudioError::Redis(e.to_string()))?;

        let document = value.ok_or_else(|| StudioError::NotFound(format!("snapshot {}", id)))?;
        session::import(&document)
    }
}
