use sqlx::AnyPool;

use crate::{Error, Result};

pub const CREATE_MEMBER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS member (
    member_id VARCHAR(10) NOT NULL,
    money BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (member_id)
)
"#;

/// Create the `member` table if it does not exist yet.
pub async fn ensure_schema(pool: &AnyPool) -> Result<()> {
    sqlx::query(CREATE_MEMBER_TABLE)
        .execute(pool)
        .await
        .map_err(|err| Error::data_access("create schema", err))?;
    tracing::debug!("member table ready");
    Ok(())
}
