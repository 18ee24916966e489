//! Collaboration rooms for resterx
//!
//! [`RoomService`] creates password-protected rooms, admits devices up to the
//! room's limit and hands out room tokens. [`SyncCoordinator`] moves a room's
//! collections, environments and requests in and out of storage.

pub mod error;
pub mod password;
pub mod service;
pub mod sync;
pub mod token;

pub use error::RoomError;
pub use service::{
    generate_room_id, CreateRoomRequest, JoinRoomRequest, Plan, RoomService, RoomSession,
    SubscriptionUpgraded, DEFAULT_DEVICE_LIMIT,
};
pub use sync::{RoomData, SyncCoordinator};
pub use token::{JwtTokenService, RoomClaims, RoomTokenService, ROOM_ROLE};
