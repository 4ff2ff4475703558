//! The remote authority that has the final say on every claim.
//!
//! No client ships here. The host app provides one over whatever transport
//! it uses; the engine only needs the two calls below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{ActionKind, ClueId, Position};

/// The authority's answer to a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityResponse {
    pub accepted: bool,

    #[serde(default)]
    pub clue_ref: Option<ClueId>,

    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl AuthorityResponse {
    pub fn accepted(clue_ref: Option<ClueId>) -> Self {
        Self {
            accepted: true,
            clue_ref,
            rejection_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            clue_ref: None,
            rejection_reason: Some(reason.into()),
        }
    }
}

/// The request never got a definite answer. Always worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("authority unreachable: {0}")]
    Unreachable(String),

    #[error("authority did not answer in time")]
    TimedOut,

    #[error("authority unavailable (status {0})")]
    Unavailable(u16),
}

#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Claims a visit. `position` is the fix captured when the player was
    /// on site, which may be long before this call during replay.
    async fn submit_visit(
        &self,
        location_id: &str,
        kind: ActionKind,
        position: Option<&Position>,
    ) -> Result<AuthorityResponse, TransportError>;

    async fn submit_code_match(
        &self,
        location_id: &str,
        code: &str,
    ) -> Result<AuthorityResponse, TransportError>;
}
