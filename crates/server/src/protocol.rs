// Realtime protocol version negotiation.
//
// Clients name the protocol version (e.g. "hearth-chat.v1") when creating a
// realtime session. Unsupported versions are rejected with UPGRADE_REQUIRED
// and the list of versions the server accepts.

use hearth_common::protocol::ws::{CURRENT_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
use serde_json::json;

use crate::error::{ErrorCode, ServerError};

pub fn is_supported(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// Validates a client-supplied protocol version. Unsupported versions map to
/// `UPGRADE_REQUIRED` with `details.supported_versions`.
pub fn require_supported(version: &str) -> Result<(), ServerError> {
    if is_supported(version) {
        Ok(())
    } else {
        Err(ServerError::new(
            ErrorCode::UpgradeRequired,
            format!("unsupported protocol version: {version}"),
        )
        .with_details(json!({
            "requested_version": version,
            "supported_versions": SUPPORTED_PROTOCOL_VERSIONS,
            "current_version": CURRENT_PROTOCOL_VERSION,
        })))
    }
}
