use sqlx::any::AnyRow;
use sqlx::Row;

use crate::{Ambient, ConnectionProvider, Error, Executor, Member, Result};

const INSERT_MEMBER: &str = "INSERT INTO member (member_id, money) VALUES ($1, $2)";
const SELECT_MEMBER: &str = "SELECT member_id, money FROM member WHERE member_id = $1";
const UPDATE_MONEY: &str = "UPDATE member SET money = $1 WHERE member_id = $2";
const DELETE_MEMBER: &str = "DELETE FROM member WHERE member_id = $1";

/// Member gateway.
///
/// Runs every statement on the connection supplied by its provider: the one
/// bound to the current call chain by default, or an explicit [`Executor`].
/// The repository never begins, commits or releases anything itself.
#[derive(Debug, Clone, Default)]
pub struct MemberRepository<P = Ambient> {
    provider: P,
}

impl MemberRepository<Ambient> {
    pub fn new() -> Self {
        Self { provider: Ambient }
    }
}

impl MemberRepository<Executor> {
    pub fn with_executor(executor: Executor) -> Self {
        Self { provider: executor }
    }
}

impl<P: ConnectionProvider> MemberRepository<P> {
    pub fn with_provider(provider: P) -> Self {
        Self { provider }
    }

    pub async fn save(&self, member: &Member) -> Result<Member> {
        let executor = self.provider.executor()?;
        let mut conn = executor.connection().await?;

        executor
            .within_timeout(
                "save",
                sqlx::query(INSERT_MEMBER)
                    .bind(member.member_id().to_string())
                    .bind(member.money)
                    .execute(&mut *conn),
            )
            .await?
            .map_err(|err| {
                if is_unique_violation(&err) {
                    Error::ConstraintViolation {
                        member_id: member.member_id().to_string(),
                        source: err,
                    }
                } else {
                    tracing::error!(error = %err, "db error");
                    Error::data_access("save", err)
                }
            })?;

        Ok(member.clone())
    }

    pub async fn find_by_id(&self, member_id: &str) -> Result<Member> {
        let executor = self.provider.executor()?;
        let mut conn = executor.connection().await?;

        let row = executor
            .within_timeout(
                "find_by_id",
                sqlx::query(SELECT_MEMBER)
                    .bind(member_id.to_string())
                    .fetch_optional(&mut *conn),
            )
            .await?
            .map_err(|err| {
                tracing::error!(error = %err, "db error");
                Error::data_access("find_by_id", err)
            })?;

        match row {
            Some(row) => map_member(&row),
            None => Err(Error::NotFound {
                member_id: member_id.to_string(),
            }),
        }
    }

    /// Set the balance of one member, returning the number of rows affected.
    ///
    /// Anything other than exactly one affected row points at a caller bug and
    /// is logged.
    pub async fn update(&self, member_id: &str, money: i64) -> Result<u64> {
        let executor = self.provider.executor()?;
        let mut conn = executor.connection().await?;

        let result = executor
            .within_timeout(
                "update",
                sqlx::query(UPDATE_MONEY)
                    .bind(money)
                    .bind(member_id.to_string())
                    .execute(&mut *conn),
            )
            .await?
            .map_err(|err| {
                tracing::error!(error = %err, "db error");
                Error::data_access("update", err)
            })?;

        let rows_affected = result.rows_affected();
        if rows_affected == 1 {
            tracing::debug!(member_id, money, "balance updated");
        } else {
            tracing::warn!(member_id, rows_affected, "update did not affect exactly one row");
        }
        Ok(rows_affected)
    }

    /// Delete one member. Deleting an unknown id is not an error.
    pub async fn delete(&self, member_id: &str) -> Result<()> {
        let executor = self.provider.executor()?;
        let mut conn = executor.connection().await?;

        let result = executor
            .within_timeout(
                "delete",
                sqlx::query(DELETE_MEMBER)
                    .bind(member_id.to_string())
                    .execute(&mut *conn),
            )
            .await?
            .map_err(|err| {
                tracing::error!(error = %err, "db error");
                Error::data_access("delete", err)
            })?;

        tracing::debug!(member_id, rows_affected = result.rows_affected(), "member deleted");
        Ok(())
    }
}

fn map_member(row: &AnyRow) -> Result<Member> {
    let member_id: String = row
        .try_get("member_id")
        .map_err(|err| Error::data_access("map member", err))?;
    let money: i64 = row
        .try_get("money")
        .map_err(|err| Error::data_access("map member", err))?;
    Member::new(member_id, money)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            // 23505: PostgreSQL; 1555/2067: SQLite primary key / unique constraint.
            db.is_unique_violation()
                || matches!(db.code().as_deref(), Some("23505" | "1555" | "2067"))
        }
        _ => false,
    }
}
