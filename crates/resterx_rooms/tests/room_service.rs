
use fixtures::*;
use resterx_rooms::{JoinRoomRequest, RoomError, RoomTokenService, SubscriptionUpgraded};
use resterx_storage::{Backend, RoomType, Scope};

#[tokio::test]
async fn test_create_room_defaults() {
    let h = harness().await;
    let session = h.rooms.create_room(new_room("Team", None)).await.unwrap();

    assert_eq!(session.room.device_limit, 3);
    assert_eq!(session.room.room_type, RoomType::Free);
    assert!(session.room.is_active);
    assert!(session.room.id.is_some());
    assert!(session.device.is_none());

    let claims = h.tokens.decode_token(&session.token).unwrap();
    assert_eq!(claims.room_id, session.room.room_id);

    let body = serde_json::to_value(&session.room).unwrap();
    assert!(body.get("password").is_none());
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_create_room_rejects_unknown_type() {
    let h = harness().await;
    let mut req = new_room("Team", Some(5));
    req.room_type = Some("gold".into());
    assert!(matches!(
        h.rooms.create_room(req).await,
        Err(RoomError::Validation(_))
    ));
}

#[tokio::test]
async fn test_device_capacity() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Pair", Some(2))).await.unwrap().room;

    h.rooms.join_room(join(&room.room_id, "A")).await.unwrap();
    h.rooms.join_room(join(&room.room_id, "B")).await.unwrap();

    let err = h.rooms.join_room(join(&room.room_id, "C")).await.unwrap_err();
    assert_eq!(
        err,
        RoomError::CapacityExceeded {
            room_id: room.room_id.clone(),
            limit: 2
        }
    );

    let again = h.rooms.join_room(join(&room.room_id, "A")).await.unwrap();
    assert_eq!(again.device.unwrap().device_id, "A");
    assert_eq!(h.rooms.get_room_devices(&room.room_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_join_names_devices() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Names", None)).await.unwrap().room;

    let session = h
        .rooms
        .join_room(join(&room.room_id, "0123456789abcdef"))
        .await
        .unwrap();
    assert_eq!(session.device.unwrap().device_name, "Device 01234567");

    let renamed = h
        .rooms
        .join_room(JoinRoomRequest {
            device_name: Some("Work laptop".into()),
            ..join(&room.room_id, "0123456789abcdef")
        })
        .await
        .unwrap();
    assert_eq!(renamed.device.unwrap().device_name, "Work laptop");
}

#[tokio::test]
async fn test_join_rejects_bad_password_and_unknown_room() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Locked", None)).await.unwrap().room;

    let err = h
        .rooms
        .join_room(JoinRoomRequest {
            password: "wrong-password".into(),
            ..join(&room.room_id, "A")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::Auth(_)));

    let err = h.rooms.join_room(join("nosuchroom01", "A")).await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}

#[tokio::test]
async fn test_join_rejects_inactive_room() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Paused", None)).await.unwrap().room;

    let mut record = h.storage.get_room(&room.room_id).await.unwrap();
    record.room.is_active = false;
    h.storage.save_room(record).await.unwrap();

    let err = h.rooms.join_room(join(&room.room_id, "A")).await.unwrap_err();
    assert!(matches!(err, RoomError::Auth(_)));
}

#[tokio::test]
async fn test_validate_room_token() {
    let h = harness().await;
    let session = h.rooms.create_room(new_room("Tokens", None)).await.unwrap();

    let room = h.rooms.validate_room_token(&session.token).await.unwrap();
    assert_eq!(room.room_id, session.room.room_id);

    assert!(matches!(
        h.rooms.validate_room_token("not-a-jwt").await,
        Err(RoomError::Auth(_))
    ));
}

#[tokio::test]
async fn test_token_of_deactivated_room_is_rejected() {
    let h = harness().await;
    let session = h.rooms.create_room(new_room("Closing", None)).await.unwrap();

    let mut record = h.storage.get_room(&session.room.room_id).await.unwrap();
    record.room.is_active = false;
    h.storage.save_room(record).await.unwrap();

    assert!(matches!(
        h.rooms.validate_room_token(&session.token).await,
        Err(RoomError::Auth(_))
    ));
}

#[tokio::test]
async fn test_removed_device_frees_a_slot() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Solo", Some(1))).await.unwrap().room;

    h.rooms.join_room(join(&room.room_id, "A")).await.unwrap();
    assert!(h.rooms.join_room(join(&room.room_id, "B")).await.is_err());

    h.rooms.remove_device(&room.room_id, "A").await.unwrap();
    h.rooms.remove_device(&room.room_id, "A").await.unwrap();
    h.rooms.join_room(join(&room.room_id, "B")).await.unwrap();
}

#[tokio::test]
async fn test_delete_room_cascades() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Doomed", None)).await.unwrap().room;
    h.rooms.join_room(join(&room.room_id, "A")).await.unwrap();
    h.rooms.join_room(join(&room.room_id, "B")).await.unwrap();

    let mut owned = collection(None, "Owned");
    owned.scope = Some(Scope::room(&room.room_id));
    h.storage.save_collection(owned).await.unwrap();

    let err = h
        .rooms
        .delete_room(&room.room_id, "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::Auth(_)));
    assert_eq!(h.rooms.get_room_devices(&room.room_id).await.unwrap().len(), 2);

    h.rooms.delete_room(&room.room_id, PASSWORD).await.unwrap();

    assert!(h.rooms.get_room_devices(&room.room_id).await.unwrap().is_empty());
    assert!(h
        .storage
        .get_collections_by_room(&room.room_id)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        h.rooms.get_room_by_room_id(&room.room_id).await,
        Err(RoomError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_subscription_upgrade_changes_limits() {
    let h = harness().await;
    let room = h.rooms.create_room(new_room("Growing", None)).await.unwrap().room;

    let upgraded = h
        .rooms
        .apply_subscription_upgrade(SubscriptionUpgraded {
            room_id: room.room_id.clone(),
            plan: "pro".into(),
        })
        .await
        .unwrap();
    assert_eq!(upgraded.room_type, RoomType::Premium);
    assert_eq!(upgraded.device_limit, 10);
    assert_eq!(upgraded.id, room.id);

    // The password hash survives the rewrite.
    h.rooms.join_room(join(&room.room_id, "A")).await.unwrap();

    let err = h
        .rooms
        .apply_subscription_upgrade(SubscriptionUpgraded {
            room_id: room.room_id.clone(),
            plan: "platinum".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::Validation(_)));
    assert_eq!(
        h.rooms.get_room_by_room_id(&room.room_id).await.unwrap().device_limit,
        10
    );
}
