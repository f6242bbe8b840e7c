use super::*;
use shared::{
    domain::{Role, UserId},
    protocol::UserInfoData,
};

fn sample_record() -> UserInfoRecord {
    UserInfoRecord {
        data: UserInfoData {
            id: UserId::from("u-1"),
            role: Role::Admin,
            name: Some("Ana".into()),
            email: None,
            token: Some("tok".into()),
        },
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let store = SessionStore::new("sqlite::memory:").await.expect("db");
    store.health_check().await.expect("health check");
}

#[tokio::test]
async fn missing_session_loads_as_none() {
    let store = SessionStore::new("sqlite::memory:").await.expect("db");
    assert!(store.load_user_info().await.expect("load").is_none());
}

#[tokio::test]
async fn saves_and_clears_user_info() {
    let store = SessionStore::new("sqlite::memory:").await.expect("db");
    store.save_user_info(&sample_record()).await.expect("save");

    let raw = store.load_user_info().await.expect("load").expect("present");
    let parsed: UserInfoRecord = serde_json::from_str(&raw).expect("json");
    assert_eq!(parsed, sample_record());

    assert!(store.clear_session().await.expect("clear"));
    assert!(store.load_user_info().await.expect("load").is_none());
    assert!(!store.clear_session().await.expect("second clear"));
}

#[tokio::test]
async fn put_raw_overwrites_existing_value() {
    let store = SessionStore::new("sqlite::memory:").await.expect("db");
    store.put_raw("userInfo", "{").await.expect("corrupt write");
    store.put_raw("userInfo", "{}").await.expect("overwrite");
    assert_eq!(
        store.load_raw("userInfo").await.expect("load").as_deref(),
        Some("{}")
    );
}

#[tokio::test]
async fn session_survives_reopen_of_file_database() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("session.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let store = SessionStore::new(&database_url).await.expect("db");
        store.save_user_info(&sample_record()).await.expect("save");
        store.pool().close().await;
    }

    assert!(db_path.exists(), "database file should exist: {}", db_path.display());
    let reopened = SessionStore::new(&database_url).await.expect("reopen");
    assert!(reopened.load_user_info().await.expect("load").is_some());
}

#[test]
fn memory_url_has_no_filesystem_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/session.db?mode=rwc"),
        Some(PathBuf::from("./data/session.db"))
    );
}
