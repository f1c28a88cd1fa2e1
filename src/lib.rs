pub mod non_api_structs;

use std::collections::BTreeSet;
use serde::{Deserialize, Deserializer, Serialize};
use crate::non_api_structs::{AttributeSets, UserData};

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct Url(pub String);

impl Url {
    pub fn join(&self, path: &str) -> String {
        self.0.trim_end_matches('/').to_string() + path
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone, Debug, Serialize, Deserialize, Default)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attributes as they arrive on the wire. Each field takes either a list of
/// strings or one comma-separated string.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct AttributeLists {
    #[serde(default, deserialize_with = "list_or_joined")]
    pub courses: Vec<String>,
    #[serde(default, deserialize_with = "list_or_joined")]
    pub hobbies: Vec<String>,
    #[serde(default, deserialize_with = "list_or_joined")]
    pub community: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrJoined {
    List(Vec<String>),
    Joined(String),
}

fn list_or_joined<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<ListOrJoined>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ListOrJoined::List(list)) => list,
        Some(ListOrJoined::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
    })
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub attributes: AttributeLists,
}

/// One element of an import feed. Same shape as a registration; the password
/// is still plaintext here and gets hashed before it reaches the store.
pub type RawUserRecord = RegisterRequest;

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct FriendRequest {
    pub username: String,
    pub friend_username: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct AttributeUpdate {
    pub username: String,
    #[serde(flatten)]
    pub attributes: AttributeLists,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct QuizSubmission {
    pub username: String,
    pub responses: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct RankRequest {
    pub username: String,
    pub k: usize,
    /// Usernames to rank against. Everyone else in the directory when absent.
    #[serde(default)]
    pub candidates: Option<Vec<String>>,
}

/// A user as shown to callers: never carries credential material.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub courses: BTreeSet<String>,
    pub hobbies: BTreeSet<String>,
    pub community: BTreeSet<String>,
}

impl From<&UserData> for UserSummary {
    fn from(user: &UserData) -> Self {
        let AttributeSets { courses, hobbies, community } = user.attributes.clone();
        Self {
            id: user.id,
            username: user.username.clone(),
            courses,
            hobbies,
            community,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct ImportReport {
    pub created: usize,
    pub skipped: usize,
    pub skipped_usernames: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct MatchEntry {
    pub user_id: UserId,
    pub username: String,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct MatchResult(pub Vec<MatchEntry>);

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_accept_lists_and_joined_strings() {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"username":"testuser","password":"pw","courses":"CSC108,CSC148","hobbies":["Reading","Swimming"]}"#,
        ).unwrap();
        assert_eq!(request.attributes.courses, vec!["CSC108", "CSC148"]);
        assert_eq!(request.attributes.hobbies, vec!["Reading", "Swimming"]);
        assert!(request.attributes.community.is_empty());
    }

    #[test]
    fn url_join_tolerates_trailing_slash() {
        assert_eq!(Url(String::from("http://localhost:8000/")).join("/rank"), "http://localhost:8000/rank");
        assert_eq!(Url(String::from("http://localhost:8000")).join("/rank"), "http://localhost:8000/rank");
    }

    #[test]
    fn null_attribute_is_empty() {
        let lists: AttributeLists = serde_json::from_str(r#"{"courses":null}"#).unwrap();
        assert!(lists.courses.is_empty());
    }
}
