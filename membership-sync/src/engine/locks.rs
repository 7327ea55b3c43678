//! Per-user serialization.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::ids::UserId;

/// Hands out one async lock per user. Entries disappear once no guard or
/// waiter holds them.
#[derive(Debug, Default)]
pub(crate) struct UserLocks {
    locks: Mutex<HashMap<UserId, Weak<AsyncMutex<()>>>>,
}

impl UserLocks {
    /// Waits for exclusive access to `user`.
    pub(crate) async fn acquire(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            if let Some(lock) = locks.get(user).and_then(Weak::upgrade) {
                lock
            } else {
                let lock = Arc::new(AsyncMutex::new(()));
                locks.insert(user.clone(), Arc::downgrade(&lock));
                lock
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = Arc::new(UserLocks::default());
        let user = UserId::new("42").unwrap();

        let guard = locks.acquire(&user).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let user = user.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::default();
        let _first = locks.acquire(&UserId::new("1").unwrap()).await;
        let _second = locks.acquire(&UserId::new("2").unwrap()).await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = UserLocks::default();
        drop(locks.acquire(&UserId::new("1").unwrap()).await);
        drop(locks.acquire(&UserId::new("2").unwrap()).await);
        assert_eq!(locks.tracked(), 1);
    }
}
