//! Storage keys for session records.
//!
//! Template: `<prefix>:<tenant_id>:<node_id>`.  Neither id may be empty or
//! contain `:`, so a storage key always splits back into exactly one
//! session key.

use ar_domain::error::{Error, Result};
use ar_domain::SessionKey;

/// Key under which `key`'s record lives in the TTL store.
pub fn storage_key(prefix: &str, key: &SessionKey) -> String {
    format!("{prefix}:{}:{}", key.tenant_id, key.node_id)
}

/// Reject keys that cannot be stored unambiguously.
pub fn validate_session_key(key: &SessionKey) -> Result<()> {
    for (field, value) in [("tenant_id", &key.tenant_id), ("node_id", &key.node_id)] {
        if value.is_empty() {
            return Err(Error::InvalidRequest(format!("{field} must not be empty")));
        }
        if value.contains(':') {
            return Err(Error::InvalidRequest(format!(
                "{field} \"{value}\" must not contain ':'"
            )));
        }
    }
    Ok(())
}
