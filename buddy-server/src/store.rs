use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use buddy_common::non_api_structs::UserData;
use buddy_common::UserId;
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use crate::error::{CoreResult, StorageError};

/// An unordered pair of distinct users, kept as (lower id, higher id) so each
/// friendship has exactly one storage key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }
    pub fn low(&self) -> UserId {
        self.low
    }
    pub fn high(&self) -> UserId {
        self.high
    }
    /// The endpoint opposite `id`, if `id` is one of the two.
    pub fn other(&self, id: UserId) -> Option<UserId> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
    fn to_bytes(self) -> Vec<u8> {
        let mut bytes = id_key(self.low);
        bytes.extend_from_slice(&self.high.0.to_be_bytes());
        bytes
    }
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        PairKey::new(decode_id(&bytes[..8])?, decode_id(&bytes[8..])?)
    }
}

fn id_key(id: UserId) -> Vec<u8> {
    id.0.to_be_bytes().to_vec()
}

fn decode_id(bytes: &[u8]) -> Option<UserId> {
    Some(UserId(u64::from_be_bytes(bytes.try_into().ok()?)))
}

#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    PutUser(UserData),
    PutFriendship(PairKey),
    PutQuiz(UserId, Value),
}

/// Writes that a backend must commit all together or not at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch(Vec<Write>);

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, write: Write) {
        self.0.push(write);
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn writes(&self) -> &[Write] {
        &self.0
    }
}

impl From<Write> for WriteBatch {
    fn from(write: Write) -> Self {
        Self(vec![write])
    }
}

/// Durable (or not) home of the directory and the friendship graph.
///
/// Readers must only ever observe whole batches: `apply` is the single write
/// path and commits atomically.
pub trait Backend: Send + Sync {
    fn user(&self, id: UserId) -> Result<Option<UserData>, StorageError>;
    fn user_id_by_name(&self, username: &str) -> Result<Option<UserId>, StorageError>;
    /// Every registered id, ascending.
    fn user_ids(&self) -> Result<Vec<UserId>, StorageError>;
    fn has_friendship(&self, pair: PairKey) -> Result<bool, StorageError>;
    fn neighbors(&self, id: UserId) -> Result<BTreeSet<UserId>, StorageError>;
    fn quiz(&self, id: UserId) -> Result<Option<Value>, StorageError>;
    fn allocate_id(&self) -> Result<UserId, StorageError>;
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError>;
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserData>,
    usernames: HashMap<String, UserId>,
    friendships: BTreeSet<PairKey>,
    quizzes: HashMap<UserId, Value>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
    last_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn user(&self, id: UserId) -> Result<Option<UserData>, StorageError> {
        Ok(self.tables.read()?.users.get(&id).cloned())
    }
    fn user_id_by_name(&self, username: &str) -> Result<Option<UserId>, StorageError> {
        Ok(self.tables.read()?.usernames.get(username).copied())
    }
    fn user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        Ok(self.tables.read()?.users.keys().copied().collect())
    }
    fn has_friendship(&self, pair: PairKey) -> Result<bool, StorageError> {
        Ok(self.tables.read()?.friendships.contains(&pair))
    }
    fn neighbors(&self, id: UserId) -> Result<BTreeSet<UserId>, StorageError> {
        Ok(self.tables.read()?.friendships.iter().filter_map(|pair| pair.other(id)).collect())
    }
    fn quiz(&self, id: UserId) -> Result<Option<Value>, StorageError> {
        Ok(self.tables.read()?.quizzes.get(&id).cloned())
    }
    fn allocate_id(&self) -> Result<UserId, StorageError> {
        Ok(UserId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1))
    }
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut tables = self.tables.write()?;
        for write in batch.0 {
            match write {
                Write::PutUser(user) => {
                    tables.usernames.insert(user.username.clone(), user.id);
                    tables.users.insert(user.id, user);
                }
                Write::PutFriendship(pair) => {
                    tables.friendships.insert(pair);
                }
                Write::PutQuiz(id, responses) => {
                    tables.quizzes.insert(id, responses);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SledBackend {
    db: Db,
    users: Tree,
    usernames: Tree,
    friendships: Tree,
    quizzes: Tree,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }
    /// A store that is deleted when dropped.
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }
    fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            users: db.open_tree("users")?,
            usernames: db.open_tree("usernames")?,
            friendships: db.open_tree("friendships")?,
            quizzes: db.open_tree("quizzes")?,
            db,
        })
    }
}

impl Backend for SledBackend {
    fn user(&self, id: UserId) -> Result<Option<UserData>, StorageError> {
        match self.users.get(id_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
    fn user_id_by_name(&self, username: &str) -> Result<Option<UserId>, StorageError> {
        match self.usernames.get(username.as_bytes())? {
            Some(bytes) => Ok(Some(decode_id(&bytes).ok_or_else(|| StorageError(format!("corrupt id for {username}")))?)),
            None => Ok(None),
        }
    }
    fn user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        self.users
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                decode_id(&key).ok_or_else(|| StorageError(String::from("corrupt user key")))
            })
            .collect()
    }
    fn has_friendship(&self, pair: PairKey) -> Result<bool, StorageError> {
        Ok(self.friendships.contains_key(pair.to_bytes())?)
    }
    fn neighbors(&self, id: UserId) -> Result<BTreeSet<UserId>, StorageError> {
        let mut neighbors = BTreeSet::new();
        for key in self.friendships.iter().keys() {
            let key = key?;
            let pair = PairKey::from_bytes(&key).ok_or_else(|| StorageError(String::from("corrupt friendship key")))?;
            if let Some(other) = pair.other(id) {
                neighbors.insert(other);
            }
        }
        Ok(neighbors)
    }
    fn quiz(&self, id: UserId) -> Result<Option<Value>, StorageError> {
        match self.quizzes.get(id_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
    fn allocate_id(&self) -> Result<UserId, StorageError> {
        // generate_id starts at zero; keep ids positive like the memory backend.
        Ok(UserId(self.db.generate_id()? + 1))
    }
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        (&self.users, &self.usernames, &self.friendships, &self.quizzes)
            .transaction(|(users, usernames, friendships, quizzes)| {
                for write in batch.writes() {
                    match write {
                        Write::PutUser(user) => {
                            let bytes = serde_json::to_vec(user)
                                .map_err(|err| ConflictableTransactionError::Abort(StorageError::from(err)))?;
                            users.insert(id_key(user.id), bytes)?;
                            usernames.insert(user.username.as_bytes(), id_key(user.id))?;
                        }
                        Write::PutFriendship(pair) => {
                            friendships.insert(pair.to_bytes(), Vec::<u8>::new())?;
                        }
                        Write::PutQuiz(id, responses) => {
                            let bytes = serde_json::to_vec(responses)
                                .map_err(|err| ConflictableTransactionError::Abort(StorageError::from(err)))?;
                            quizzes.insert(id_key(*id), bytes)?;
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => StorageError::from(err),
            })?;
        self.db.flush()?;
        Ok(())
    }
}

/// The user directory and friendship graph over an injectable backend.
///
/// Every check-then-write operation holds `writer` for its whole duration, so
/// username claims and pair creations are serialized. Reads never take it.
pub struct Store {
    backend: Box<dyn Backend>,
    writer: Mutex<()>,
}

impl Store {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            writer: Mutex::new(()),
        }
    }
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
    pub(crate) fn write_guard(&self) -> CoreResult<MutexGuard<'_, ()>> {
        Ok(self.writer.lock()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_common::non_api_structs::AttributeSets;

    fn user(id: u64, name: &str) -> UserData {
        UserData {
            id: UserId(id),
            username: name.to_string(),
            credential_hash: String::from("hash"),
            attributes: AttributeSets::default(),
        }
    }

    #[test]
    fn pair_key_is_canonical() {
        let ab = PairKey::new(UserId(1), UserId(2)).unwrap();
        let ba = PairKey::new(UserId(2), UserId(1)).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.low(), UserId(1));
        assert_eq!(ab.high(), UserId(2));
        assert_eq!(ab.other(UserId(2)), Some(UserId(1)));
        assert_eq!(ab.other(UserId(3)), None);
        assert!(PairKey::new(UserId(4), UserId(4)).is_none());
        assert_eq!(PairKey::from_bytes(&ab.to_bytes()), Some(ab));
    }

    fn exercise(backend: &dyn Backend) {
        let a = backend.allocate_id().unwrap();
        let b = backend.allocate_id().unwrap();
        assert_ne!(a, b);
        let mut batch = WriteBatch::new();
        batch.push(Write::PutUser(user(a.0, "alice")));
        batch.push(Write::PutUser(user(b.0, "bob")));
        batch.push(Write::PutFriendship(PairKey::new(b, a).unwrap()));
        backend.apply(batch).unwrap();

        assert_eq!(backend.user_id_by_name("alice").unwrap(), Some(a));
        assert_eq!(backend.user_id_by_name("Alice").unwrap(), None);
        assert_eq!(backend.user(b).unwrap().unwrap().username, "bob");
        assert_eq!(backend.user_ids().unwrap(), {
            let mut ids = vec![a, b];
            ids.sort();
            ids
        });
        assert!(backend.has_friendship(PairKey::new(a, b).unwrap()).unwrap());
        assert_eq!(backend.neighbors(a).unwrap(), BTreeSet::from([b]));
        assert_eq!(backend.neighbors(b).unwrap(), BTreeSet::from([a]));

        backend.apply(Write::PutQuiz(a, serde_json::json!({"q1": "yes"})).into()).unwrap();
        assert_eq!(backend.quiz(a).unwrap(), Some(serde_json::json!({"q1": "yes"})));
        assert_eq!(backend.quiz(b).unwrap(), None);
    }

    #[test]
    fn memory_backend_roundtrip() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn sled_backend_roundtrip() {
        exercise(&SledBackend::temporary().unwrap());
    }
}
