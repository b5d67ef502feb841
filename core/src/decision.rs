//! Entry/exit decision engine.
//!
//! Strict alternation per identity: no log or a last `EXIT` means the next
//! scan is an `ENTRY`; a last `ENTRY` means the next scan is an `EXIT`. Time
//! between scans plays no part.

use crate::error::StoreError;
use crate::persistence::LogRepository;
use crate::types::{EventKind, IdentityId};

/// Next event kind given the most recent logged kind.
#[must_use]
pub const fn next_event_kind(most_recent: Option<EventKind>) -> EventKind {
    match most_recent {
        None | Some(EventKind::Exit) => EventKind::Entry,
        Some(EventKind::Entry) => EventKind::Exit,
    }
}

/// Next event kind for an identity, read from its log. Pure read.
///
/// # Errors
///
/// Returns [`StoreError`] if the log cannot be queried.
pub async fn next_event_kind_for(
    logs: &dyn LogRepository,
    identity_id: IdentityId,
) -> Result<EventKind, StoreError> {
    let last = logs.find_most_recent_log(identity_id).await?;
    Ok(next_event_kind(last.map(|record| record.kind)))
}
