
use fixtures::*;
use resterx_rooms::RoomError;
use resterx_storage::{Backend, Scope, SyncBatch};

#[tokio::test]
async fn test_sync_scopes_everything_to_the_room() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Sync", None)).await.unwrap().room;

    let mut foreign = environment("Staging");
    foreign.scope = Some(Scope::Workspace("ws-1".into()));
    let batch = SyncBatch {
        collections: vec![collection(Some("col-users"), "Users")],
        environments: vec![foreign],
        requests: vec![request("col-users", "list"), request("col-users", "create")],
    };
    let applied = h.sync.sync_room_data(&room.room_id, batch).await.unwrap();
    assert_eq!(applied.len(), 4);
    assert!(applied.requests.iter().all(|r| r.id.is_some()));

    let data = h.sync.get_room_data(&room.room_id).await.unwrap();
    assert_eq!(data.collections.len(), 1);
    assert_eq!(data.environments.len(), 1);
    assert_eq!(
        data.environments[0].scope,
        Some(Scope::room(&room.room_id))
    );
    let mut names: Vec<_> = data.requests.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["create", "list"]);
}

#[tokio::test]
async fn test_sync_batch_is_all_or_nothing() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Atomic", None)).await.unwrap().room;

    let batch = SyncBatch {
        collections: vec![
            collection(None, "First"),
            collection(Some("bad id!"), "Second"),
            collection(None, "Third"),
        ],
        environments: vec![environment("Dev")],
        requests: vec![request("col-x", "ping")],
    };
    assert!(h.sync.sync_room_data(&room.room_id, batch).await.is_err());

    assert!(h.storage.get_all_collections().await.unwrap().is_empty());
    assert!(h.storage.get_all_environments().await.unwrap().is_empty());
    assert!(h.storage.get_all_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_replaces_existing_entities() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Replace", None)).await.unwrap().room;

    let first = SyncBatch {
        collections: vec![collection(Some("col-a"), "Before")],
        ..Default::default()
    };
    h.sync.sync_room_data(&room.room_id, first).await.unwrap();

    let second = SyncBatch {
        collections: vec![collection(Some("col-a"), "After")],
        ..Default::default()
    };
    h.sync.sync_room_data(&room.room_id, second).await.unwrap();

    let data = h.sync.get_room_data(&room.room_id).await.unwrap();
    assert_eq!(data.collections.len(), 1);
    assert_eq!(data.collections[0].name, "After");
}

#[tokio::test]
async fn test_sync_into_unknown_room_fails() {
    let h = harness().await;
    let batch = SyncBatch {
        collections: vec![collection(None, "Orphan")],
        ..Default::default()
    };
    assert!(matches!(
        h.sync.sync_room_data("missing00000", batch).await,
        Err(RoomError::NotFound(_))
    ));
    assert!(h.storage.get_all_collections().await.unwrap().is_empty());
}
