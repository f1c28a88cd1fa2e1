use std::collections::HashSet;
use std::path::Path;

use buddy_common::non_api_structs::{AttributeSets, UserData};
use buddy_common::{AttributeLists, ImportReport, RawUserRecord};
use tracing::{info, warn};

use crate::directory::check_username;
use crate::error::{CoreError, CoreResult};
use crate::store::{Store, Write, WriteBatch};

/// A candidate user whose credential has already been hashed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportRecord {
    pub username: String,
    pub credential_hash: String,
    pub attributes: AttributeLists,
}

impl Store {
    /// Creates every record whose username is still free, in input order, as
    /// one atomic batch. Usernames already stored, or seen earlier in the same
    /// batch, are skipped and reported.
    pub fn import_batch(&self, records: Vec<ImportRecord>) -> CoreResult<ImportReport> {
        let _writer = self.write_guard()?;
        let mut report = ImportReport::default();
        let mut claimed = HashSet::new();
        let mut batch = WriteBatch::new();
        for record in records {
            check_username(&record.username).map_err(abort)?;
            let taken = self.backend().user_id_by_name(&record.username).map_err(abort)?.is_some();
            if taken || !claimed.insert(record.username.clone()) {
                report.skipped += 1;
                report.skipped_usernames.push(record.username);
                continue;
            }
            let id = self.backend().allocate_id().map_err(abort)?;
            batch.push(Write::PutUser(UserData {
                id,
                attributes: AttributeSets::from_lists(&record.attributes),
                username: record.username,
                credential_hash: record.credential_hash,
            }));
            report.created += 1;
        }
        if !batch.is_empty() {
            self.backend().apply(batch).map_err(abort)?;
        }
        info!(created = report.created, skipped = report.skipped, "imported batch");
        Ok(report)
    }
}

fn abort(err: impl std::fmt::Display) -> CoreError {
    warn!(error = %err, "import aborted");
    CoreError::ImportAborted(err.to_string())
}

/// Parses a source feed: a JSON array of user records. Anything malformed
/// rejects the whole feed.
pub fn parse_feed(bytes: &[u8]) -> CoreResult<Vec<RawUserRecord>> {
    serde_json::from_slice(bytes).map_err(abort)
}

pub fn read_feed(path: impl AsRef<Path>) -> CoreResult<Vec<RawUserRecord>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| abort(format!("{}: {err}", path.display())))?;
    parse_feed(&bytes)
}
