use std::time::Duration;

use tempfile::TempDir;

use member_unit_of_work::{
    schema, DatabaseConfig, Error, Member, MemberRepository, Result, TransactionCoordinator,
};

/// A coordinator over a throwaway SQLite file.
pub struct TestDb {
    pub coordinator: TransactionCoordinator,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        Self::with_config(|config| config).await
    }

    pub async fn with_config(tweak: impl FnOnce(DatabaseConfig) -> DatabaseConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("member.db").display());
        let config = tweak(
            DatabaseConfig::new(url)
                .with_max_connections(4)
                .with_acquire_timeout(Duration::from_secs(5)),
        );

        let coordinator = TransactionCoordinator::from_config(&config)
            .await
            .expect("Failed to connect to database");
        schema::ensure_schema(coordinator.pool())
            .await
            .expect("Failed to create member table");

        Self {
            coordinator,
            _dir: dir,
        }
    }
}

/// Insert members in their own committed unit of work.
pub async fn seed(coordinator: &TransactionCoordinator, members: &[(&str, i64)]) {
    let repository = MemberRepository::new();
    coordinator
        .run_in_transaction(|| async {
            for (member_id, money) in members {
                repository.save(&Member::new(*member_id, *money)?).await?;
            }
            Ok::<_, Error>(())
        })
        .await
        .expect("Failed to seed members");
}

/// Read a balance in a fresh unit of work.
pub async fn balance_of(coordinator: &TransactionCoordinator, member_id: &str) -> Result<i64> {
    let repository = MemberRepository::new();
    coordinator
        .run_in_transaction(|| async {
            let member = repository.find_by_id(member_id).await?;
            Ok::<_, Error>(member.money)
        })
        .await
}
