use std::collections::BTreeSet;

use buddy_common::UserId;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::store::{PairKey, Store, Write};

impl Store {
    /// Creates the friendship between `a` and `b`. A single canonical pair
    /// record backs both directions, so no reader can see half an edge.
    pub fn add_friendship(&self, a: UserId, b: UserId) -> CoreResult<()> {
        let _writer = self.write_guard()?;
        let first = self.lookup_by_id(a)?;
        let second = self.lookup_by_id(b)?;
        let pair = PairKey::new(a, b).ok_or(CoreError::SelfFriendship)?;
        if self.backend().has_friendship(pair)? {
            return Err(CoreError::DuplicateFriendship(first.username, second.username));
        }
        self.backend().apply(Write::PutFriendship(pair).into())?;
        info!(%a, %b, "friendship created");
        Ok(())
    }

    pub fn neighbors(&self, id: UserId) -> CoreResult<BTreeSet<UserId>> {
        self.lookup_by_id(id)?;
        Ok(self.backend().neighbors(id)?)
    }

    pub fn are_friends(&self, a: UserId, b: UserId) -> CoreResult<bool> {
        match PairKey::new(a, b) {
            Some(pair) => Ok(self.backend().has_friendship(pair)?),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use buddy_common::non_api_structs::AttributeSets;

    use super::*;

    fn store_with(names: &[&str]) -> (Store, Vec<UserId>) {
        let store = Store::in_memory();
        let ids = names
            .iter()
            .map(|name| store.register(name, "h".into(), AttributeSets::default()).unwrap())
            .collect();
        (store, ids)
    }

    #[test]
    fn friendship_is_symmetric() {
        let (store, ids) = store_with(&["alice", "bob"]);
        let (alice, bob) = (ids[0], ids[1]);
        store.add_friendship(alice, bob).unwrap();
        assert_eq!(store.neighbors(alice).unwrap(), BTreeSet::from([bob]));
        assert_eq!(store.neighbors(bob).unwrap(), BTreeSet::from([alice]));
        assert!(store.are_friends(bob, alice).unwrap());
    }

    #[test]
    fn duplicate_is_rejected_in_either_direction() {
        let (store, ids) = store_with(&["alice", "bob"]);
        let (alice, bob) = (ids[0], ids[1]);
        store.add_friendship(alice, bob).unwrap();
        assert_eq!(
            store.add_friendship(bob, alice),
            Err(CoreError::DuplicateFriendship("bob".into(), "alice".into()))
        );
        assert!(matches!(store.add_friendship(alice, bob), Err(CoreError::DuplicateFriendship(..))));
        assert_eq!(store.neighbors(alice).unwrap().len(), 1);
    }

    #[test]
    fn self_friendship_is_rejected() {
        let (store, ids) = store_with(&["alice"]);
        assert_eq!(store.add_friendship(ids[0], ids[0]), Err(CoreError::SelfFriendship));
        assert!(store.neighbors(ids[0]).unwrap().is_empty());
        assert!(!store.are_friends(ids[0], ids[0]).unwrap());
    }

    #[test]
    fn unknown_endpoints_are_rejected() {
        let (store, ids) = store_with(&["alice"]);
        assert!(matches!(store.add_friendship(ids[0], UserId(77)), Err(CoreError::UserNotFound(_))));
        assert!(matches!(store.add_friendship(UserId(77), ids[0]), Err(CoreError::UserNotFound(_))));
        assert!(matches!(store.add_friendship(UserId(77), UserId(77)), Err(CoreError::UserNotFound(_))));
        assert!(matches!(store.neighbors(UserId(77)), Err(CoreError::UserNotFound(_))));
    }

    #[test]
    fn symmetry_holds_across_a_small_graph() {
        let (store, ids) = store_with(&["a", "b", "c", "d", "e"]);
        for (x, y) in [(0, 1), (1, 2), (3, 1), (4, 0), (2, 4)] {
            store.add_friendship(ids[x], ids[y]).unwrap();
        }
        for &x in &ids {
            for &y in &ids {
                let x_has_y = store.neighbors(x).unwrap().contains(&y);
                let y_has_x = store.neighbors(y).unwrap().contains(&x);
                assert_eq!(x_has_y, y_has_x);
            }
        }
    }

    #[test]
    fn concurrent_adds_create_one_edge() {
        let (store, ids) = store_with(&["alice", "bob"]);
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                let (a, b) = if i % 2 == 0 { (ids[0], ids[1]) } else { (ids[1], ids[0]) };
                thread::spawn(move || {
                    barrier.wait();
                    store.add_friendship(a, b)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CoreError::DuplicateFriendship(..))));
    }
}
