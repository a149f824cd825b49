use dashmap::DashMap;

/// Why a token id is in the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    /// The holder logged out.
    Logout,
    /// Revoked by an operator or a privilege change.
    Revoked,
}

/// One revocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revocation {
    pub revoked_at: i64,
    pub reason: RevocationReason,
}

/// Process-wide set of revoked token ids, mapped to their revocation time.
///
/// Read on every authorization, written only on logout, so it is a sharded
/// concurrent map rather than one lock.  An entry only has to outlive the
/// longest token it could refer to: after `retention` seconds the token is
/// expired anyway and [`prune`](Self::prune) drops it.
#[derive(Debug)]
pub struct RevocationSet {
    entries: DashMap<String, Revocation>,
    retention: i64,
}

impl RevocationSet {
    /// `retention` should be the maximum token lifetime plus clock skew.
    pub fn new(retention: i64) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// Record `token_id` as revoked at `now`.  Revoking twice keeps the
    /// first record.  Returns whether this call inserted it.
    pub fn revoke(&self, token_id: &str, now: i64, reason: RevocationReason) -> bool {
        let mut inserted = false;
        self.entries.entry(token_id.to_owned()).or_insert_with(|| {
            inserted = true;
            Revocation {
                revoked_at: now,
                reason,
            }
        });
        inserted
    }

    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.entries.contains_key(token_id)
    }

    pub fn get(&self, token_id: &str) -> Option<Revocation> {
        self.entries.get(token_id).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retention(&self) -> i64 {
        self.retention
    }

    /// Drop entries older than the retention window; returns how many went.
    pub fn prune(&self, now: i64) -> usize {
        let before = self.entries.len();
        let retention = self.retention;
        self.entries
            .retain(|_, r| r.revoked_at.saturating_add(retention) >= now);
        let pruned = before.saturating_sub(self.entries.len());
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.entries.len(), "pruned revocations");
        }
        pruned
    }

    /// Copy of every entry, for flushing to a shared store at teardown.
    pub fn snapshot(&self) -> Vec<(String, Revocation)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Merge previously persisted entries back in.
    pub fn restore(&self, entries: impl IntoIterator<Item = (String, Revocation)>) {
        for (token_id, revocation) in entries {
            self.entries.entry(token_id).or_insert(revocation);
        }
    }
}
