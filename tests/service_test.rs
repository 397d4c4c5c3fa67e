mod common;

use member_unit_of_work::{Error, MemberService, REJECTED_MEMBER_ID};

use common::{balance_of, seed, RecordingObserver, TestDb};

pub const MEMBER_A: &str = "A";
pub const MEMBER_B: &str = "B";

#[tokio::test]
async fn test_account_transfer() {
    let db = TestDb::new().await;
    seed(&db.coordinator, &[(MEMBER_A, 10000), (MEMBER_B, 10000)]).await;
    let service = MemberService::new(&db.coordinator);

    service
        .account_transfer(MEMBER_A, MEMBER_B, 2000)
        .await
        .expect("Transfer failed");

    assert_eq!(balance_of(&db.coordinator, MEMBER_A).await.unwrap(), 8000);
    assert_eq!(balance_of(&db.coordinator, MEMBER_B).await.unwrap(), 12000);
}

#[tokio::test]
async fn test_account_transfer_rejected_destination_rolls_back() {
    let db = TestDb::new().await;
    seed(&db.coordinator, &[(MEMBER_A, 10000), (REJECTED_MEMBER_ID, 10000)]).await;
    let observer = RecordingObserver::new();
    db.coordinator.register_transaction_aware(observer.clone());
    let service = MemberService::new(&db.coordinator);

    let err = service
        .account_transfer(MEMBER_A, REJECTED_MEMBER_ID, 2000)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DomainValidation(_)));
    assert!(err.is_business_fault());
    assert_eq!(observer.rollbacks().len(), 1);
    assert!(observer.commits().is_empty());

    assert_eq!(balance_of(&db.coordinator, MEMBER_A).await.unwrap(), 10000);
    assert_eq!(
        balance_of(&db.coordinator, REJECTED_MEMBER_ID).await.unwrap(),
        10000
    );
}

#[tokio::test]
async fn test_account_transfer_without_transaction_leaves_partial_update() {
    let db = TestDb::new().await;
    seed(&db.coordinator, &[(MEMBER_A, 10000), (REJECTED_MEMBER_ID, 10000)]).await;
    let service = MemberService::new(&db.coordinator);

    let err = service
        .account_transfer_auto_commit(MEMBER_A, REJECTED_MEMBER_ID, 2000)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DomainValidation(_)));

    assert_eq!(balance_of(&db.coordinator, MEMBER_A).await.unwrap(), 8000);
    assert_eq!(
        balance_of(&db.coordinator, REJECTED_MEMBER_ID).await.unwrap(),
        10000
    );
}

#[tokio::test]
async fn test_account_transfer_from_unknown_member() {
    let db = TestDb::new().await;
    seed(&db.coordinator, &[(MEMBER_B, 10000)]).await;
    let service = MemberService::new(&db.coordinator);

    let err = service
        .account_transfer("ghost", MEMBER_B, 2000)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { ref member_id } if member_id == "ghost"));
    assert_eq!(balance_of(&db.coordinator, MEMBER_B).await.unwrap(), 10000);
}

#[tokio::test]
async fn test_account_transfer_overflow_is_rejected() {
    let db = TestDb::new().await;
    seed(&db.coordinator, &[(MEMBER_A, 10), (MEMBER_B, i64::MAX)]).await;
    let service = MemberService::new(&db.coordinator);

    let err = service
        .account_transfer(MEMBER_A, MEMBER_B, 5)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DomainValidation(_)));
    assert_eq!(balance_of(&db.coordinator, MEMBER_A).await.unwrap(), 10);
    assert_eq!(balance_of(&db.coordinator, MEMBER_B).await.unwrap(), i64::MAX);
}

#[tokio::test]
async fn test_business_logic_reused_inside_caller_transaction() {
    let db = TestDb::new().await;
    seed(&db.coordinator, &[(MEMBER_A, 10000), (MEMBER_B, 10000)]).await;
    let service = MemberService::new(&db.coordinator);

    // Two transfers committed together by the caller's own unit of work.
    db.coordinator
        .run_in_transaction(|| async {
            service.business_logic(MEMBER_A, MEMBER_B, 1000).await?;
            service.business_logic(MEMBER_B, MEMBER_A, 300).await
        })
        .await
        .unwrap();

    assert_eq!(balance_of(&db.coordinator, MEMBER_A).await.unwrap(), 9300);
    assert_eq!(balance_of(&db.coordinator, MEMBER_B).await.unwrap(), 10700);
}
