use std::collections::{HashMap, HashSet};

use chrono::{Local, Utc};
use lixi_types::api::{Content, CreateEnvelope};
use lixi_types::models::{DEFAULT_SENDER, Envelope, EnvelopeKind};
use rand::Rng;
use tracing::{info, warn};

use crate::error::{OpenRejected, PersistError};
use crate::snapshot::SnapshotFile;

/// Inclusive range for amounts the server picks itself.
pub const RANDOM_AMOUNT_MIN: i64 = 10;
pub const RANDOM_AMOUNT_MAX: i64 = 499;

const CREATED_AT_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

/// Hands out ids biased towards the current time in milliseconds, but never
/// repeats: each id is strictly greater than the previous one. Returns `None`
/// once `u64::MAX` has been handed out.
#[derive(Debug)]
struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    fn seeded(last: u64) -> Self {
        Self { last }
    }

    fn next(&mut self) -> Option<u64> {
        let following = self.last.checked_add(1)?;
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let id = now.max(following);
        self.last = id;
        Some(id)
    }
}

/// Smallest id for which `taken` is false.
fn lowest_free_id(taken: impl Fn(u64) -> bool) -> u64 {
    // A ledger cannot hold 2^64 envelopes, so a free id always exists.
    (0..=u64::MAX).find(|&id| !taken(id)).unwrap_or_default()
}

/// The authoritative ledger.
///
/// Every accepted mutation is written through to the snapshot file before
/// the call returns. Write failures are logged; the in-memory state stays
/// authoritative either way.
pub struct EnvelopeStore {
    envelopes: Vec<Envelope>,
    /// id -> position in `envelopes`
    index: HashMap<u64, usize>,
    ids: IdGenerator,
    file: SnapshotFile,
}

impl EnvelopeStore {
    /// Open the store backed by `snapshot`, loading whatever it holds.
    pub async fn load(snapshot: SnapshotFile) -> Self {
        let envelopes = snapshot.load().await;
        Self::from_envelopes(envelopes, snapshot)
    }

    /// Build a store from an existing ledger. Duplicate ids (possible in
    /// snapshots written by older servers) are reassigned.
    pub fn from_envelopes(envelopes: Vec<Envelope>, snapshot: SnapshotFile) -> Self {
        let max_id = envelopes.iter().map(|e| e.id).max().unwrap_or(0);
        let mut store = Self {
            envelopes: Vec::with_capacity(envelopes.len()),
            index: HashMap::with_capacity(envelopes.len()),
            ids: IdGenerator::seeded(max_id),
            file: snapshot,
        };

        let mut taken: HashSet<u64> = envelopes.iter().map(|e| e.id).collect();
        for mut envelope in envelopes {
            if store.index.contains_key(&envelope.id) {
                let fresh = store.ids.next().unwrap_or_else(|| {
                    warn!("Envelope id space exhausted, reusing a free low id");
                    lowest_free_id(|id| taken.contains(&id))
                });
                warn!("Duplicate envelope id {} reassigned to {}", envelope.id, fresh);
                taken.insert(fresh);
                envelope.id = fresh;
            }
            store.push(envelope);
        }

        store
    }

    fn next_id(&mut self) -> u64 {
        match self.ids.next() {
            Some(id) => id,
            None => {
                let id = lowest_free_id(|id| self.index.contains_key(&id));
                warn!("Envelope id space exhausted, reusing free id {}", id);
                id
            }
        }
    }

    fn push(&mut self, envelope: Envelope) {
        self.index.insert(envelope.id, self.envelopes.len());
        self.envelopes.push(envelope);
    }

    /// Mint a new envelope from `req`, append it and persist.
    pub async fn create(&mut self, req: CreateEnvelope) -> Envelope {
        let sender = req
            .sender
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SENDER.to_string());

        let (amount, wish) = match req.kind {
            EnvelopeKind::Money => (Some(resolve_amount(req.content.as_ref())), None),
            EnvelopeKind::Wish => (None, Some(req.content.map(Content::into_text).unwrap_or_default())),
        };

        let envelope = Envelope {
            id: self.next_id(),
            kind: req.kind,
            amount,
            wish,
            sender,
            opened: false,
            opened_by: None,
            received_amount: None,
            received_wish: None,
            created_at: Local::now().format(CREATED_AT_FORMAT).to_string(),
        };

        info!("{} created {:?} envelope {}", envelope.sender, envelope.kind, envelope.id);
        self.push(envelope.clone());
        self.persist().await;
        envelope
    }

    /// Claim envelope `id` for `opener`. Rejections leave the store and the
    /// snapshot untouched.
    pub async fn open(&mut self, id: u64, opener: &str) -> Result<Envelope, OpenRejected> {
        let pos = *self.index.get(&id).ok_or(OpenRejected::NotFound(id))?;
        let envelope = &mut self.envelopes[pos];

        if envelope.opened {
            return Err(OpenRejected::AlreadyOpened(id));
        }
        if envelope.sender == opener {
            return Err(OpenRejected::OwnEnvelope(id));
        }

        envelope.mark_opened(opener.to_string());
        let opened = envelope.clone();

        info!("{} opened envelope {} from {}", opener, id, opened.sender);
        self.persist().await;
        Ok(opened)
    }

    /// The full ledger in insertion order.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.envelopes.clone()
    }

    pub fn get(&self, id: u64) -> Option<&Envelope> {
        self.index.get(&id).map(|&pos| &self.envelopes[pos])
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Write the current ledger to disk.
    pub async fn flush(&self) -> Result<(), PersistError> {
        self.file.save(&self.envelopes).await
    }

    async fn persist(&self) {
        if let Err(e) = self.flush().await {
            warn!("Snapshot write failed, continuing in memory: {}", e);
        }
    }
}

/// Positive integer content is taken as-is; anything else gets a random
/// amount.
fn resolve_amount(content: Option<&Content>) -> i64 {
    content
        .and_then(Content::as_amount)
        .filter(|&amount| amount > 0)
        .unwrap_or_else(|| rand::rng().random_range(RANDOM_AMOUNT_MIN..=RANDOM_AMOUNT_MAX))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    async fn temp_store() -> (tempfile::TempDir, EnvelopeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvelopeStore::load(SnapshotFile::new(dir.path().join("envelopes.json"))).await;
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_money_with_amount() {
        let (_dir, mut store) = temp_store().await;
        let env = store.create(CreateEnvelope::money(Some("Alice"), Some("100000"))).await;

        assert_eq!(env.kind, EnvelopeKind::Money);
        assert_eq!(env.amount, Some(100000));
        assert_eq!(env.wish, None);
        assert!(!env.opened);
        assert_eq!(env.opened_by, None);
        assert_eq!(env.received_amount, None);
    }

    #[tokio::test]
    async fn test_create_money_random_fallback() {
        let (_dir, mut store) = temp_store().await;
        for content in [Some("abc"), Some("0"), Some("-20"), Some(""), None] {
            let env = store.create(CreateEnvelope::money(None, content)).await;
            let amount = env.amount.unwrap();
            assert!(
                (RANDOM_AMOUNT_MIN..=RANDOM_AMOUNT_MAX).contains(&amount),
                "{content:?} produced {amount}"
            );
        }
    }

    #[tokio::test]
    async fn test_create_wish() {
        let (_dir, mut store) = temp_store().await;
        let env = store
            .create(CreateEnvelope::wish(Some("Alice"), Some("Happy New Year")))
            .await;

        assert_eq!(env.wish.as_deref(), Some("Happy New Year"));
        assert_eq!(env.amount, None);
        assert_eq!(env.sender, "Alice");

        let empty = store.create(CreateEnvelope::wish(None, None)).await;
        assert_eq!(empty.wish.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_default_sender() {
        let (_dir, mut store) = temp_store().await;
        let env = store.create(CreateEnvelope::money(None, Some("5"))).await;
        assert_eq!(env.sender, DEFAULT_SENDER);

        let env = store.create(CreateEnvelope::money(Some(""), Some("5"))).await;
        assert_eq!(env.sender, DEFAULT_SENDER);
    }

    #[tokio::test]
    async fn test_ids_unique_and_content_exclusive() {
        let (_dir, mut store) = temp_store().await;
        let mut seen = HashSet::new();

        for i in 0..200 {
            let req = if i % 3 == 0 {
                CreateEnvelope::wish(Some("Alice"), Some("chúc mừng"))
            } else {
                CreateEnvelope::money(Some("Bob"), Some("x"))
            };
            let env = store.create(req).await;
            assert!(seen.insert(env.id), "duplicate id {}", env.id);
            match env.kind {
                EnvelopeKind::Money => assert!(env.amount.is_some() && env.wish.is_none()),
                EnvelopeKind::Wish => assert!(env.wish.is_some() && env.amount.is_none()),
            }
        }

        let ids: Vec<u64> = store.snapshot().iter().map(|e| e.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_open_rules() {
        let (_dir, mut store) = temp_store().await;
        let env = store
            .create(CreateEnvelope::wish(Some("Alice"), Some("Happy New Year")))
            .await;

        assert_eq!(store.open(env.id, "Alice").await, Err(OpenRejected::OwnEnvelope(env.id)));
        assert!(!store.get(env.id).unwrap().opened);

        let opened = store.open(env.id, "Bob").await.unwrap();
        assert!(opened.opened);
        assert_eq!(opened.opened_by.as_deref(), Some("Bob"));
        assert_eq!(opened.received_wish.as_deref(), Some("Happy New Year"));

        assert_eq!(store.open(env.id, "Carol").await, Err(OpenRejected::AlreadyOpened(env.id)));
        assert_eq!(store.get(env.id).unwrap().opened_by.as_deref(), Some("Bob"));

        assert_eq!(store.open(12345, "Bob").await, Err(OpenRejected::NotFound(12345)));
    }

    #[tokio::test]
    async fn test_open_money_copies_amount() {
        let (_dir, mut store) = temp_store().await;
        let env = store.create(CreateEnvelope::money(Some("Alice"), Some("250"))).await;
        let opened = store.open(env.id, "Bob").await.unwrap();
        assert_eq!(opened.received_amount, Some(250));
        assert_eq!(opened.received_wish, None);
    }

    #[tokio::test]
    async fn test_rejected_open_does_not_write() {
        let (dir, mut store) = temp_store().await;
        let path = dir.path().join("envelopes.json");
        let env = store.create(CreateEnvelope::money(Some("Alice"), Some("1"))).await;

        let before = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(store.open(env.id, "Alice").await.is_err());
        assert!(!path.exists());

        std::fs::write(&path, &before).unwrap();
        store.open(env.id, "Bob").await.unwrap();
        assert_ne!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_mutations_survive_reload() {
        let (dir, mut store) = temp_store().await;
        let a = store.create(CreateEnvelope::money(Some("Alice"), Some("100"))).await;
        let b = store.create(CreateEnvelope::wish(Some("Bob"), Some("Vạn sự như ý"))).await;
        store.open(a.id, "Bob").await.unwrap();

        let reloaded =
            EnvelopeStore::load(SnapshotFile::new(dir.path().join("envelopes.json"))).await;
        assert_eq!(reloaded.snapshot(), store.snapshot());
        assert!(reloaded.get(a.id).unwrap().opened);
        assert!(!reloaded.get(b.id).unwrap().opened);
    }

    #[tokio::test]
    async fn test_new_ids_follow_loaded_ones() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("envelopes.json"));
        let far_future = u64::MAX / 2;

        let mut store = EnvelopeStore::from_envelopes(Vec::new(), snapshot.clone());
        let mut seed = store.create(CreateEnvelope::money(None, Some("1"))).await;
        seed.id = far_future;

        let mut store = EnvelopeStore::from_envelopes(vec![seed], snapshot);
        let next = store.create(CreateEnvelope::money(None, Some("1"))).await;
        assert_eq!(next.id, far_future + 1);
    }

    #[tokio::test]
    async fn test_ids_after_max_loaded_id() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("envelopes.json"));

        let mut store = EnvelopeStore::from_envelopes(Vec::new(), snapshot.clone());
        let mut seed = store.create(CreateEnvelope::money(Some("Alice"), Some("1"))).await;
        seed.id = u64::MAX;

        let mut store = EnvelopeStore::from_envelopes(vec![seed], snapshot);
        let a = store.create(CreateEnvelope::money(None, Some("1"))).await;
        let b = store.create(CreateEnvelope::wish(None, Some("An khang"))).await;

        let ids: HashSet<u64> = store.snapshot().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&u64::MAX));
        assert_eq!((a.id, b.id), (0, 1));
        assert_eq!(store.get(u64::MAX).unwrap().sender, "Alice");
    }

    #[tokio::test]
    async fn test_duplicate_max_ids_reassigned() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("envelopes.json"));

        let mut store = EnvelopeStore::from_envelopes(Vec::new(), snapshot.clone());
        let mut first = store.create(CreateEnvelope::money(Some("Alice"), Some("1"))).await;
        let mut clash = store.create(CreateEnvelope::money(Some("Bob"), Some("2"))).await;
        let mut low = store.create(CreateEnvelope::money(Some("Carol"), Some("3"))).await;
        first.id = u64::MAX;
        clash.id = u64::MAX;
        low.id = 0;

        // Id 0 appears later in the ledger, so the repair must skip it.
        let store = EnvelopeStore::from_envelopes(vec![first, clash, low], snapshot);
        let ids: Vec<u64> = store.snapshot().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![u64::MAX, 1, 0]);
        assert_eq!(store.get(1).unwrap().sender, "Bob");
    }

    #[tokio::test]
    async fn test_duplicate_ids_reassigned() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("envelopes.json"));

        let mut store = EnvelopeStore::from_envelopes(Vec::new(), snapshot.clone());
        let first = store.create(CreateEnvelope::money(Some("Alice"), Some("1"))).await;
        let mut clash = store.create(CreateEnvelope::money(Some("Bob"), Some("2"))).await;
        clash.id = first.id;

        let store = EnvelopeStore::from_envelopes(vec![first.clone(), clash], snapshot);
        assert_eq!(store.len(), 2);
        let ids: HashSet<u64> = store.snapshot().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.get(first.id).unwrap().sender, "Alice");
    }
}
