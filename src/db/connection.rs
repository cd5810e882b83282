use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
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
            url: env::var("SIM_DB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SIM_DB_NAMESPACE")
                .unwrap_or_else(|_| "simulation".to_string()),
            database: env::var("SIM_DB_DATABASE")
                .unwrap_or_else(|_| "orchestrator".to_string()),
            username: env::var("SIM_DB_USERNAME").ok(),
            password: env::var("SIM_DB_PASSWORD").ok(),
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
        // Projects embed their version history; setups and results live in
        // their own tables and are referenced by key.
        "DEFINE TABLE IF NOT EXISTS project SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS project_account ON TABLE project COLUMNS account;
         DEFINE INDEX IF NOT EXISTS project_id_account ON TABLE project COLUMNS project_id, account UNIQUE;",

        "DEFINE TABLE IF NOT EXISTS setup SCHEMALESS;",

        "DEFINE TABLE IF NOT EXISTS result SCHEMALESS;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
