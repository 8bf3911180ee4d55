use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Ключ сериализации проверки конфликтов: место и день.
pub type SlotKey = (i64, NaiveDate);

// после этого числа ключей простаивающие мьютексы выбрасываются
const PRUNE_THRESHOLD: usize = 1024;

/// Асинхронные мьютексы на `(seat_id, date)`.
///
/// Чтение существующих броней и запись новой выполняются под замком,
/// так что два запроса на одно место и день не проходят проверку одновременно.
#[derive(Clone, Default)]
pub struct SlotLocks {
    inner: Arc<DashMap<SlotKey, Arc<Mutex<()>>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: SlotKey) -> OwnedMutexGuard<()> {
        self.prune();
        let mutex = self.inner.entry(key).or_default().clone();
        mutex.lock_owned().await
    }

    /// Захватывает несколько ключей в порядке возрастания, без дублей.
    pub async fn lock_all(&self, mut keys: Vec<SlotKey>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn prune(&self) {
        if self.inner.len() > PRUNE_THRESHOLD {
            // strong_count == 1: мьютекс держит только карта, никто не ждёт
            self.inner.retain(|_, m| Arc::strong_count(m) > 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(seat: i64) -> SlotKey {
        (seat, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = SlotLocks::new();
        let guard = locks.lock(key(1)).await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock(key(1)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = SlotLocks::new();
        let _a = locks.lock(key(1)).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock(key(2)))
            .await
            .expect("independent key must not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn lock_all_dedups_keys() {
        let locks = SlotLocks::new();
        let guards = locks.lock_all(vec![key(2), key(1), key(2)]).await;
        assert_eq!(guards.len(), 2);
    }
}
