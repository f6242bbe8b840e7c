use shared::protocol::UserInfoData;

use super::*;

#[test]
fn missing_record_is_anonymous() {
    let session = SessionContext::from_user_info(None);
    assert!(session.identity().is_none());
    assert!(matches!(
        session.attributed_owner(),
        Err(CoreError::Attribution { .. })
    ));
}

#[test]
fn corrupt_or_id_less_records_are_anonymous() {
    assert_eq!(
        SessionContext::from_user_info(Some("{not json")),
        SessionContext::anonymous()
    );
    assert_eq!(
        SessionContext::from_user_info(Some(r#"{"data": {"_id": "  ", "role": "teacher"}}"#)),
        SessionContext::anonymous()
    );
}

#[test]
fn stored_identity_attributes_to_its_user() {
    let raw = r#"{"data": {"_id": "u-7", "role": "teacher", "token": "tok"}}"#;
    let session = SessionContext::from_user_info(Some(raw));

    assert_eq!(session.bearer_token(), Some("tok"));
    assert_eq!(
        session.identity().map(|identity| identity.role),
        Some(Role::Teacher)
    );
    assert_eq!(
        session.attributed_owner().expect("owner"),
        TeacherId::from("u-7")
    );
}

#[tokio::test]
async fn context_reads_the_persisted_record() {
    let store = SessionStore::new("sqlite::memory:").await.expect("db");
    assert!(SessionContext::from_store(&store).await.identity().is_none());

    store
        .save_user_info(&UserInfoRecord {
            data: UserInfoData {
                id: UserId::from("u-1"),
                role: Role::Admin,
                name: None,
                email: None,
                token: None,
            },
        })
        .await
        .expect("save");

    let session = SessionContext::from_store(&store).await;
    assert_eq!(
        session.identity().map(|identity| identity.user_id.clone()),
        Some(UserId::from("u-1"))
    );
    assert_eq!(session.bearer_token(), None);
}

#[test]
fn record_without_role_still_attributes() {
    let session = SessionContext::from_user_info(Some(r#"{"data": {"_id": "u-4"}}"#));
    assert_eq!(
        session.identity().map(|identity| identity.role),
        Some(Role::Unknown)
    );
    assert_eq!(
        session.attributed_owner().expect("owner"),
        TeacherId::from("u-4")
    );
}
