use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("DB_NAMESPACE").unwrap_or_else(|_| "brainbuddy".to_string()),
            database: env::var("DB_NAME").unwrap_or_else(|_| "brainbuddy".to_string()),
            username: env::var("DB_USERNAME").ok(),
            password: env::var("DB_PASSWORD").ok(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory database, used by tests and local development.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            ..Default::default()
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Accounts
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS user_username ON TABLE user COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_external_id ON TABLE user COLUMNS user_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email;",

        // One grade/email link per account
        "DEFINE TABLE IF NOT EXISTS student_link SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS student_link_user ON TABLE student_link COLUMNS user_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS student_link_email ON TABLE student_link COLUMNS email;",

        // Append-only activity trail
        "DEFINE TABLE IF NOT EXISTS activity_log SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS activity_log_user ON TABLE activity_log COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
