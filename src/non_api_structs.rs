use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::{AttributeLists, UserId};

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct AttributeSets {
    pub courses: BTreeSet<String>,
    pub hobbies: BTreeSet<String>,
    pub community: BTreeSet<String>,
}

impl AttributeSets {
    /// Trims every entry, drops the empty ones and deduplicates.
    pub fn from_lists(lists: &AttributeLists) -> Self {
        Self {
            courses: normalize(&lists.courses),
            hobbies: normalize(&lists.hobbies),
            community: normalize(&lists.community),
        }
    }
}

fn normalize(list: &[String]) -> BTreeSet<String> {
    list.iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// The stored user record. Only the server ever sees `credential_hash`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct UserData {
    pub id: UserId,
    pub username: String,
    pub credential_hash: String,
    pub attributes: AttributeSets,
}
