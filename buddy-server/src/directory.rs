use buddy_common::non_api_structs::{AttributeSets, UserData};
use buddy_common::UserId;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::store::{Store, Write};

/// Usernames must carry at least one non-whitespace character.
pub(crate) fn check_username(username: &str) -> CoreResult<()> {
    if username.trim().is_empty() {
        return Err(CoreError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

impl Store {
    /// Claims `username` and stores a new user. Usernames are matched exactly.
    pub fn register(&self, username: &str, credential_hash: String, attributes: AttributeSets) -> CoreResult<UserId> {
        check_username(username)?;
        let _writer = self.write_guard()?;
        if self.backend().user_id_by_name(username)?.is_some() {
            debug!(username, "registration refused, username taken");
            return Err(CoreError::DuplicateUsername(username.to_string()));
        }
        let id = self.backend().allocate_id()?;
        self.backend().apply(Write::PutUser(UserData {
            id,
            username: username.to_string(),
            credential_hash,
            attributes,
        }).into())?;
        info!(%id, username, "registered user");
        Ok(id)
    }

    pub fn lookup_by_username(&self, username: &str) -> CoreResult<UserData> {
        let id = self.backend()
            .user_id_by_name(username)?
            .ok_or_else(|| CoreError::UserNotFound(username.to_string()))?;
        self.lookup_by_id(id)
    }

    pub fn lookup_by_id(&self, id: UserId) -> CoreResult<UserData> {
        self.backend()
            .user(id)?
            .ok_or_else(|| CoreError::UserNotFound(id.to_string()))
    }

    /// Replaces a user's attribute sets, leaving identity and credentials untouched.
    pub fn update_attributes(&self, id: UserId, attributes: AttributeSets) -> CoreResult<UserData> {
        let _writer = self.write_guard()?;
        let mut user = self.lookup_by_id(id)?;
        user.attributes = attributes;
        self.backend().apply(Write::PutUser(user.clone()).into())?;
        debug!(%id, "updated attributes");
        Ok(user)
    }

    pub fn user_ids(&self) -> CoreResult<Vec<UserId>> {
        Ok(self.backend().user_ids()?)
    }

    /// Stores the latest quiz answers of a user, replacing earlier ones.
    pub fn submit_quiz(&self, id: UserId, responses: serde_json::Value) -> CoreResult<()> {
        let _writer = self.write_guard()?;
        self.lookup_by_id(id)?;
        self.backend().apply(Write::PutQuiz(id, responses).into())?;
        Ok(())
    }

    pub fn quiz(&self, id: UserId) -> CoreResult<Option<serde_json::Value>> {
        self.lookup_by_id(id)?;
        Ok(self.backend().quiz(id)?)
    }
}
