//! The access gate: every read or write against a room passes through
//! `allowed`, and `unlock` is the only way a session earns entry to a
//! locked room it is not already entitled to.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sotto_common::room::RoomId;
use tracing::warn;
use uuid::Uuid;

use crate::rooms::{unlocks::SessionUnlockStore, LockConfig};

/// Why an unlock attempt was refused. The two variants map to distinct
/// client-facing messages; a wrong password must not read the same as
/// "this room has no password for you".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockDenied {
    WrongPassword,
    AccessDenied,
}

/// The actor's standing toward a room, independent of any password.
fn has_standing(lock: &LockConfig, user_id: i64, is_admin: bool) -> bool {
    if is_admin {
        return true;
    }

    let user_id = user_id.to_string();
    lock.allowed_user_ids.iter().any(|allowed| *allowed == user_id)
}

/// Whether the actor may enter the room right now.
///
/// Unlocked rooms admit everyone. Locked rooms admit admins, allow-listed
/// users, and sessions that have already unlocked the room.
pub async fn allowed(
    room: RoomId,
    lock: &LockConfig,
    user_id: i64,
    is_admin: bool,
    session_id: Uuid,
    unlocks: &SessionUnlockStore,
) -> bool {
    if !lock.is_locked {
        return true;
    }

    if has_standing(lock, user_id, is_admin) {
        return true;
    }

    unlocks.has_unlocked(session_id, room).await
}

/// Attempt to unlock a room for the session.
///
/// Admins and allow-listed users succeed without a password. Otherwise the
/// supplied password is checked against the room's hash; rooms with no
/// password hash cannot be unlocked this way at all.
pub async fn unlock(
    room: RoomId,
    lock: &LockConfig,
    user_id: i64,
    is_admin: bool,
    session_id: Uuid,
    supplied_password: Option<&str>,
    unlocks: &SessionUnlockStore,
) -> Result<(), UnlockDenied> {
    if has_standing(lock, user_id, is_admin) {
        unlocks.add_unlocked(session_id, room).await;
        return Ok(());
    }

    let Some(hash) = lock.password_hash.as_deref() else {
        return Err(UnlockDenied::AccessDenied);
    };

    let supplied = supplied_password.unwrap_or_default();
    if verify_lock_password(supplied, hash) {
        unlocks.add_unlocked(session_id, room).await;
        Ok(())
    } else {
        Err(UnlockDenied::WrongPassword)
    }
}

/// Hash a room password into a PHC string for storage.
pub fn hash_lock_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|error| anyhow::anyhow!("failed to hash room password: {error}"))?;

    Ok(hash.to_string())
}

/// Verify a supplied password against a stored PHC string.
///
/// A hash that fails to parse denies entry rather than erroring; a
/// corrupted column must never open the room.
pub fn verify_lock_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(%error, "stored room password hash is malformed");
            return false;
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => true,
        Err(argon2::password_hash::Error::Password) => false,
        Err(error) => {
            warn!(%error, "room password verification failed");
            false
        }
    }
}
