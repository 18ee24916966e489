
use fixtures::*;
use resterx_storage::{Backend, Collection, Scope, StorageError, SyncBatch};
use std::sync::Arc;

#[tokio::test]
async fn test_collection_round_trip() {
    let backend = sqlite_backend().await;
    let mut collection = room_collection("Users", "room01");
    collection.requests = vec!["r2".into(), "r1".into()];

    let saved = backend.save_collection(collection).await.unwrap();
    let id = saved.id.clone().unwrap();
    assert!(!id.is_empty());
    assert!(saved.created_at.is_some());
    assert_eq!(saved.created_at, saved.updated_at);

    let found = backend.get_collection(&id).await.unwrap();
    assert_eq!(found, saved);
    assert_eq!(found.requests, vec!["r2".to_string(), "r1".to_string()]);
}

#[tokio::test]
async fn test_save_with_id_replaces_and_keeps_created_at() {
    let backend = sqlite_backend().await;
    let saved = backend
        .save_environment(workspace_environment("staging", "ws1"))
        .await
        .unwrap();

    let mut changed = saved.clone();
    changed.name = "production".into();
    changed.variables.clear();
    changed.is_active = false;
    changed.created_at = None;
    let replaced = backend.save_environment(changed).await.unwrap();

    assert_eq!(replaced.id, saved.id);
    assert_eq!(replaced.created_at, saved.created_at);
    assert!(replaced.updated_at >= replaced.created_at);

    let found = backend
        .get_environment(saved.id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(found.name, "production");
    assert!(found.variables.is_empty());
    assert!(!found.is_active);
    assert_eq!(found.scope, Some(Scope::Workspace("ws1".into())));
}

#[tokio::test]
async fn test_missing_record_is_not_found() {
    let backend = sqlite_backend().await;
    let err = backend.get_request("nope").await.unwrap_err();
    assert_eq!(err, StorageError::not_found("request", "nope"));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let backend = sqlite_backend().await;
    let saved = backend
        .save_collection(room_collection("Orders", "room01"))
        .await
        .unwrap();
    let id = saved.id.unwrap();

    backend.delete_collection(&id).await.unwrap();
    backend.delete_collection(&id).await.unwrap();
    backend.delete_history("never-existed").await.unwrap();
    assert!(matches!(
        backend.get_collection(&id).await,
        Err(StorageError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_empty_map_columns_decode_as_empty() {
    let backend = sqlite_backend().await;
    sqlx::query(
        "INSERT INTO storage_requests (id, collection_id, name, method, url, headers, \
         query_params, auth_data, created_at, updated_at) \
         VALUES ('legacy1', 'c1', 'Legacy', 'GET', 'https://example.com', '', '', '', 1700000000000, 1700000000000)",
    )
    .execute(backend.pool())
    .await
    .unwrap();

    let request = backend.get_request("legacy1").await.unwrap();
    assert!(request.headers.is_empty());
    assert!(request.query_params.is_empty());
    assert!(request.auth_data.is_empty());
    assert_eq!(request.body, "");
}

#[tokio::test]
async fn test_listing_by_room_and_collection() {
    let backend = sqlite_backend().await;
    let users = backend
        .save_collection(room_collection("Users", "room01"))
        .await
        .unwrap();
    backend
        .save_collection(room_collection("Billing", "room02"))
        .await
        .unwrap();
    backend
        .save_collection(Collection {
            name: "Personal".into(),
            scope: Some(Scope::Workspace("ws1".into())),
            ..Default::default()
        })
        .await
        .unwrap();

    let in_room = backend.get_collections_by_room("room01").await.unwrap();
    assert_eq!(in_room.len(), 1);
    assert_eq!(in_room[0].name, "Users");
    assert_eq!(backend.get_all_collections().await.unwrap().len(), 3);
    assert!(backend
        .get_collections_by_room("ws1")
        .await
        .unwrap()
        .is_empty());

    let users_id = users.id.unwrap();
    backend
        .save_request(request_in(&users_id, "Create user"))
        .await
        .unwrap();
    backend
        .save_request(request_in(&users_id, "Delete user"))
        .await
        .unwrap();
    backend
        .save_request(request_in("other", "Unrelated"))
        .await
        .unwrap();

    let requests = backend.get_requests_by_collection(&users_id).await.unwrap();
    let names: Vec<_> = requests.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Create user", "Delete user"]);
    assert_eq!(requests[0].auth_type, "bearer");
    assert_eq!(backend.get_all_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_invalid_records_are_rejected() {
    let backend = sqlite_backend().await;
    let err = backend
        .save_collection(Collection::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));

    let mut request = request_in("c1", "Broken");
    request.url = "  ".into();
    assert!(matches!(
        backend.save_request(request).await,
        Err(StorageError::Validation(_))
    ));

    let mut collection = room_collection("Users", "room01");
    collection.id = Some("not a valid id".into());
    assert!(matches!(
        backend.save_collection(collection).await,
        Err(StorageError::Validation(_))
    ));
}

#[tokio::test]
async fn test_history_newest_first_with_limit() {
    let backend = sqlite_backend().await;
    backend
        .save_history(history_at("room01", "https://a.example.com", 30))
        .await
        .unwrap();
    backend
        .save_history(history_at("room01", "https://b.example.com", 20))
        .await
        .unwrap();
    backend
        .save_history(history_at("room01", "https://c.example.com", 10))
        .await
        .unwrap();
    backend
        .save_history(history_at("room02", "https://other.example.com", 1))
        .await
        .unwrap();

    let latest = backend.get_history_by_room("room01", Some(2)).await.unwrap();
    let urls: Vec<_> = latest.iter().map(|h| h.url.as_str()).collect();
    assert_eq!(urls, vec!["https://c.example.com", "https://b.example.com"]);

    let defaulted = backend.get_history_by_room("room01", Some(0)).await.unwrap();
    assert_eq!(defaulted.len(), 3);
    let all = backend.get_all_history(None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].url, "https://other.example.com");
}

#[tokio::test]
async fn test_history_is_insert_only() {
    let backend = sqlite_backend().await;
    let saved = backend
        .save_history(history_at("room01", "https://a.example.com", 1))
        .await
        .unwrap();

    let mut again = saved.clone();
    again.status_code = 500;
    let err = backend.save_history(again).await.unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));

    let stored = backend.get_all_history(None).await.unwrap();
    assert_eq!(stored, vec![saved]);
}

#[tokio::test]
async fn test_room_save_assigns_numeric_id_and_rejects_taken_room_id() {
    let backend = sqlite_backend().await;
    let first = backend.save_room(room_record("a1b2c3d4e5f6", 3)).await.unwrap();
    let second = backend.save_room(room_record("0a0b0c0d0e0f", 3)).await.unwrap();
    assert!(first.room.id.is_some());
    assert_ne!(first.room.id, second.room.id);

    let err = backend
        .save_room(room_record("a1b2c3d4e5f6", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));

    let mut upgraded = first.clone();
    upgraded.room.device_limit = 10;
    backend.save_room(upgraded).await.unwrap();
    let found = backend.get_room("a1b2c3d4e5f6").await.unwrap();
    assert_eq!(found.room.device_limit, 10);
    assert_eq!(found.room.created_at, first.room.created_at);
    assert_eq!(found.password_hash, first.password_hash);
}

#[tokio::test]
async fn test_device_admission_respects_limit() {
    let backend = sqlite_backend().await;
    backend.save_room(room_record("room01", 2)).await.unwrap();

    let a = backend.admit_device(admission("room01", "A", 2)).await.unwrap();
    assert!(a.newly_registered);
    assert_eq!(a.device.device_name, "Device A");
    backend.admit_device(admission("room01", "B", 2)).await.unwrap();

    let err = backend
        .admit_device(admission("room01", "C", 2))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::CapacityExceeded {
            room_id: "room01".into(),
            limit: 2
        }
    );

    let mut rejoin = admission("room01", "A", 2);
    rejoin.device_name = Some("Laptop".into());
    let again = backend.admit_device(rejoin).await.unwrap();
    assert!(!again.newly_registered);
    assert_eq!(again.device.device_name, "Laptop");
    assert_eq!(again.device.created_at, a.device.created_at);

    let devices = backend.get_room_devices("room01").await.unwrap();
    assert_eq!(devices.len(), 2);
}

#[tokio::test]
async fn test_removed_device_frees_a_slot() {
    let backend = sqlite_backend().await;
    backend.save_room(room_record("room01", 1)).await.unwrap();
    backend.admit_device(admission("room01", "A", 1)).await.unwrap();

    backend.remove_device("room01", "A").await.unwrap();
    backend.remove_device("room01", "A").await.unwrap();

    let b = backend.admit_device(admission("room01", "B", 1)).await.unwrap();
    assert!(b.newly_registered);
}

#[tokio::test]
async fn test_concurrent_admissions_never_exceed_limit() {
    let backend = Arc::new(sqlite_backend().await);
    backend.save_room(room_record("room01", 2)).await.unwrap();

    let joins = (0..6).map(|i| {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            backend
                .admit_device(admission("room01", &format!("device-{}", i), 2))
                .await
        })
    });
    let results = futures::future::join_all(joins).await;

    let admitted = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(admitted, 2);
    assert_eq!(backend.get_room_devices("room01").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_room_cascades() {
    let backend = sqlite_backend().await;
    backend.save_room(room_record("room01", 3)).await.unwrap();
    backend.save_room(room_record("room02", 3)).await.unwrap();
    backend.admit_device(admission("room01", "A", 3)).await.unwrap();
    backend.admit_device(admission("room01", "B", 3)).await.unwrap();
    backend.admit_device(admission("room02", "A", 3)).await.unwrap();

    let collection = backend
        .save_collection(room_collection("Users", "room01"))
        .await
        .unwrap();
    let request = backend
        .save_request(request_in(collection.id.as_deref().unwrap(), "List"))
        .await
        .unwrap();
    let mut env = workspace_environment("dev", "unused");
    env.scope = Some(Scope::room("room01"));
    backend.save_environment(env).await.unwrap();
    let kept = backend
        .save_collection(room_collection("Kept", "room02"))
        .await
        .unwrap();

    backend.delete_room("room01").await.unwrap();

    assert!(backend.get_room_devices("room01").await.unwrap().is_empty());
    assert!(backend
        .get_collections_by_room("room01")
        .await
        .unwrap()
        .is_empty());
    assert!(backend
        .get_environments_by_room("room01")
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        backend.get_request(request.id.as_deref().unwrap()).await,
        Err(StorageError::NotFound { .. })
    ));
    assert!(matches!(
        backend.get_room("room01").await,
        Err(StorageError::NotFound { .. })
    ));

    assert_eq!(backend.get_room_devices("room02").await.unwrap().len(), 1);
    assert_eq!(
        backend
            .get_collection(kept.id.as_deref().unwrap())
            .await
            .unwrap()
            .name,
        "Kept"
    );
}

#[tokio::test]
async fn test_sync_batch_is_all_or_nothing() {
    let backend = sqlite_backend().await;
    let mut broken = room_collection("Second", "room01");
    broken.id = Some("bad id!".into());

    let batch = SyncBatch {
        collections: vec![
            room_collection("First", "room01"),
            broken,
            room_collection("Third", "room01"),
        ],
        environments: vec![workspace_environment("dev", "ws1")],
        requests: vec![request_in("c1", "Ping")],
    };

    let err = backend.apply_sync_batch(batch).await.unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));
    assert!(backend.get_all_collections().await.unwrap().is_empty());
    assert!(backend.get_all_environments().await.unwrap().is_empty());
    assert!(backend.get_all_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_batch_inserts_and_replaces() {
    let backend = sqlite_backend().await;
    let existing = backend
        .save_collection(room_collection("Old name", "room01"))
        .await
        .unwrap();

    let mut renamed = existing.clone();
    renamed.name = "New name".into();
    let batch = SyncBatch {
        collections: vec![renamed, room_collection("Fresh", "room01")],
        environments: vec![],
        requests: vec![request_in(existing.id.as_deref().unwrap(), "Get")],
    };

    let stored = backend.apply_sync_batch(batch).await.unwrap();
    assert_eq!(stored.collections.len(), 2);
    assert_eq!(stored.collections[0].id, existing.id);
    assert!(stored.collections[1].id.is_some());
    assert!(stored.requests[0].id.is_some());

    let in_room = backend.get_collections_by_room("room01").await.unwrap();
    let names: Vec<_> = in_room.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["New name", "Fresh"]);
}

#[tokio::test]
async fn test_delete_missing_room_is_not_found() {
    let backend = sqlite_backend().await;
    backend
        .save_collection(room_collection("Orphan", "ghost1"))
        .await
        .unwrap();

    assert!(matches!(
        backend.delete_room("ghost1").await,
        Err(StorageError::NotFound { entity: "room", .. })
    ));
    // The cascade rolled back with the missing room.
    assert_eq!(
        backend.get_collections_by_room("ghost1").await.unwrap().len(),
        1
    );
}
