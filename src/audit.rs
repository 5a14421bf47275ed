//! Append-only activity trail.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::auth::ResolvedIdentity;
use crate::db::{ActivityLogCreate, ActivityLogRecord, Db};

/// Writes one activity record per handled request.
#[derive(Clone)]
pub struct ActivityLogger {
    db: Db,
}

/// Merge `operation_type` into the input summary as its `type` key.
fn tagged_input(operation_type: &str, input: Value) -> Value {
    let mut data = match input {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other);
            map
        }
    };
    data.insert("type".to_string(), Value::String(operation_type.to_string()));
    Value::Object(data)
}

impl ActivityLogger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Append one record stamped with the current UTC time.
    pub async fn record(
        &self,
        actor: &ResolvedIdentity,
        operation_type: &str,
        input: Value,
        output: Value,
    ) -> Result<()> {
        let entry = ActivityLogCreate {
            user_id: actor.user_id().map(|u| u.to_string()),
            name: actor.full_name().map(str::to_string),
            data: tagged_input(operation_type, input),
            output,
            datetime: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let query = r#"
            CREATE activity_log CONTENT {
                user_id: $user_id,
                name: $name,
                data: $data,
                output: $output,
                datetime: $datetime
            }
        "#;

        self.db
            .query(query)
            .bind(("user_id", entry.user_id))
            .bind(("name", entry.name))
            .bind(("data", entry.data))
            .bind(("output", entry.output))
            .bind(("datetime", entry.datetime))
            .await?
            .check()?;

        debug!(operation = operation_type, "Recorded activity");
        Ok(())
    }

    /// Like [`record`](Self::record), but failures are logged and dropped.
    pub async fn record_best_effort(
        &self,
        actor: &ResolvedIdentity,
        operation_type: &str,
        input: Value,
        output: Value,
    ) {
        if let Err(e) = self.record(actor, operation_type, input, output).await {
            warn!(operation = operation_type, error = %e, "Failed to record activity");
        }
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ActivityLogRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM activity_log ORDER BY datetime DESC LIMIT $limit")
            .bind(("limit", limit))
            .await?;

        let records: Vec<ActivityLogRecord> = res.take(0)?;
        Ok(records)
    }
}
