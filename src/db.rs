use serde::Serialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

/// Tables whose rows carry a `user_id` owner column. Account linking moves
/// every row of each of these in a single transaction.
pub const OWNED_TABLES: &[&str] = &["forms"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: String,

    // unique: id
    // indexed: user_id
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS forms (
            id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(db_pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS forms_user_id ON forms (user_id)")
        .execute(db_pool)
        .await?;

    Ok(())
}

pub async fn create_form(db_pool: &SqlitePool, user_id: &str, title: &str) -> anyhow::Result<Form> {
    let form = Form {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        title: title.to_owned(),
        created_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
    };

    sqlx::query("INSERT INTO forms (id,user_id,title,created_at) VALUES (?,?,?,?)")
        .bind(&form.id)
        .bind(&form.user_id)
        .bind(&form.title)
        .bind(&form.created_at)
        .execute(db_pool)
        .await?;

    Ok(form)
}

pub async fn forms_owned_by(db_pool: &SqlitePool, user_id: &str) -> Result<Vec<Form>, sqlx::Error> {
    sqlx::query_as::<_, Form>("SELECT id,user_id,title,created_at FROM forms WHERE user_id=? ORDER BY id")
        .bind(user_id)
        .fetch_all(db_pool)
        .await
}

pub async fn form_by_id(db_pool: &SqlitePool, id: &str) -> Result<Option<Form>, sqlx::Error> {
    sqlx::query_as::<_, Form>("SELECT id,user_id,title,created_at FROM forms WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

/// Fresh migrated in-memory database. One connection, since each in-memory
/// connection is a separate database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
