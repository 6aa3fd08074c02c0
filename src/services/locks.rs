use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-group serialization point for mutating commands.
///
/// A handler acquires the group's lock before the read-modify-write and
/// holds it until the resulting events are published, so the event stream of
/// a group observes commits in order. Commands on different groups never
/// contend.
#[derive(Default)]
pub struct GroupLocks {
    inner: std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, group_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap();
            map.entry(group_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry for a deleted group.
    pub fn forget(&self, group_id: Uuid) {
        self.inner.lock().unwrap().remove(&group_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn serializes_same_group() {
        let locks = Arc::new(GroupLocks::new());
        let group = Uuid::new_v4();
        let in_section = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(group).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst);
                assert_eq!(now, 0, "two tasks inside the same group section");
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_groups_do_not_block() {
        let locks = GroupLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let _ga = locks.acquire(a).await;
        // Would deadlock if groups shared a lock.
        let _gb = locks.acquire(b).await;
    }
}
