use super::*;

#[tokio::test]
async fn empty_vault_loads_nothing() {
    let vault = Vault::new("sqlite::memory:").await.expect("db");
    let loaded = vault.load_credentials().await.expect("load");
    assert!(loaded.is_none());
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let vault = Vault::new("sqlite::memory:").await.expect("db");
    vault.health_check().await.expect("health check");
}

#[tokio::test]
async fn saves_and_loads_credentials() {
    let vault = Vault::new("sqlite::memory:").await.expect("db");
    vault
        .save_credentials("t1", r#"{"user_id":1}"#)
        .await
        .expect("save");

    let loaded = vault
        .load_credentials()
        .await
        .expect("load")
        .expect("stored row");
    assert_eq!(loaded.auth_token, "t1");
    assert_eq!(loaded.profile_json, r#"{"user_id":1}"#);
}

#[tokio::test]
async fn second_save_replaces_the_single_slot() {
    let vault = Vault::new("sqlite::memory:").await.expect("db");
    vault.save_credentials("t1", "{}").await.expect("save");
    vault.save_credentials("t2", r#"{"v":2}"#).await.expect("save");

    let loaded = vault
        .load_credentials()
        .await
        .expect("load")
        .expect("stored row");
    assert_eq!(loaded.auth_token, "t2");
    assert_eq!(loaded.profile_json, r#"{"v":2}"#);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials")
        .fetch_one(vault.pool())
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn clear_removes_the_stored_row() {
    let vault = Vault::new("sqlite::memory:").await.expect("db");
    vault.save_credentials("t1", "{}").await.expect("save");
    vault.clear_credentials().await.expect("clear");
    assert!(vault.load_credentials().await.expect("load").is_none());

    // clearing an empty vault is a no-op
    vault.clear_credentials().await.expect("clear again");
}

#[tokio::test]
async fn profile_update_touches_only_existing_row() {
    let vault = Vault::new("sqlite::memory:").await.expect("db");
    assert_eq!(vault.update_profile_json("{}").await.expect("update"), 0);

    vault.save_credentials("t1", "{}").await.expect("save");
    assert_eq!(
        vault
            .update_profile_json(r#"{"username":"alice"}"#)
            .await
            .expect("update"),
        1
    );

    let loaded = vault
        .load_credentials()
        .await
        .expect("load")
        .expect("stored row");
    assert_eq!(loaded.auth_token, "t1");
    assert_eq!(loaded.profile_json, r#"{"username":"alice"}"#);
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("temp dir");
    let db_path = temp_root.path().join("nested").join("vault.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let vault = Vault::new(&database_url).await.expect("db");
    vault.save_credentials("t1", "{}").await.expect("save");
    drop(vault);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn credentials_survive_reopening_the_vault() {
    let temp_root = tempfile::tempdir().expect("temp dir");
    let db_path = temp_root.path().join("vault.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let vault = Vault::new(&database_url).await.expect("db");
        vault
            .save_credentials("t1", r#"{"username":"alice"}"#)
            .await
            .expect("save");
    }

    let reopened = Vault::new(&database_url).await.expect("db reopen");
    let loaded = reopened
        .load_credentials()
        .await
        .expect("load")
        .expect("stored row");
    assert_eq!(loaded.auth_token, "t1");
    assert_eq!(loaded.profile_json, r#"{"username":"alice"}"#);
}
