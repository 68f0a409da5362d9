use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use super::{LedgerError, QuotaLedger, remaining_for};

/// In-process ledger with the same conditional-increment semantics as the
/// Postgres one. Entries are `(max_generations, generations_used)`.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    subs: Mutex<HashMap<Uuid, (Option<u32>, u32)>>,
    fail_lookups: AtomicBool,
    consume_calls: Mutex<Vec<Uuid>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: Uuid, max: Option<u32>, used: u32) {
        self.subs.lock().unwrap().insert(user_id, (max, used));
    }

    pub fn used(&self, user_id: Uuid) -> Option<u32> {
        self.subs.lock().unwrap().get(&user_id).map(|(_, used)| *used)
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn consume_calls(&self) -> usize {
        self.consume_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl QuotaLedger for MemoryLedger {
    async fn remaining(&self, user_id: Uuid) -> Result<Option<u32>, LedgerError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(LedgerError::Database(sqlx::Error::PoolTimedOut));
        }
        let subs = self.subs.lock().unwrap();
        let (max, used) = subs
            .get(&user_id)
            .ok_or(LedgerError::SubscriptionNotFound(user_id))?;
        Ok(remaining_for(max.map(|m| m as i32), *used as i32))
    }

    async fn consume(&self, user_id: Uuid) -> bool {
        self.consume_calls.lock().unwrap().push(user_id);
        let mut subs = self.subs.lock().unwrap();
        match subs.get_mut(&user_id) {
            Some((max, used)) if max.is_none_or(|m| *used < m) => {
                *used += 1;
                true
            }
            _ => false,
        }
    }
}
