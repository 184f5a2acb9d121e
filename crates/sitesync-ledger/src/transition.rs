use chrono::{DateTime, Utc};
use sitesync_types::IssuerEntryId;

use crate::error::{LedgerError, LedgerResult};
use crate::row::{LedgerRow, SyncStatus};

/// What an agent reported back for one (site, entry) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The issuer accepted the registration.
    Applied { issuer_entry_id: IssuerEntryId },
    /// The issuer call failed.
    ApplyFailed { error: String },
    /// The registration was removed from the issuer.
    Revoked,
    /// Removing the registration failed.
    RevokeFailed { error: String },
}

impl Outcome {
    /// A success must name the issuer's entry id; without one the report is
    /// rejected and no row is touched.
    pub fn from_sync_report(
        success: bool,
        issuer_entry_id: Option<IssuerEntryId>,
        error: Option<String>,
    ) -> LedgerResult<Self> {
        match (success, issuer_entry_id) {
            (true, Some(issuer_entry_id)) => Ok(Self::Applied { issuer_entry_id }),
            (true, None) => Err(LedgerError::InvalidReport(
                "success reported without an issuer entry id".into(),
            )),
            (false, _) => Ok(Self::ApplyFailed {
                error: error.unwrap_or_else(|| "unspecified error".into()),
            }),
        }
    }

    pub fn from_deletion_report(success: bool, error: Option<String>) -> Self {
        if success {
            Self::Revoked
        } else {
            Self::RevokeFailed {
                error: error.unwrap_or_else(|| "unspecified error".into()),
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::ApplyFailed { .. } => "apply_failed",
            Self::Revoked => "revoked",
            Self::RevokeFailed { .. } => "revoke_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Revoked)
    }
}

/// Result of planning a transition: what to commit for the row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Replace the row with this content.
    Update(LedgerRow),
    /// Delete the row.
    Remove,
    /// The row already reflects the outcome.
    Unchanged,
}

/// Compute the next state of `row` after `outcome`, stamped at `at`.
///
/// Pure: nothing is written. Sync outcomes are only valid outside
/// `deleting`; deletion outcomes only inside it. Anything else is a
/// [`LedgerError::StaleReport`], since the row has moved on to a newer intent.
pub fn plan_transition(
    row: &LedgerRow,
    outcome: &Outcome,
    at: DateTime<Utc>,
) -> LedgerResult<Effect> {
    let stale = || LedgerError::StaleReport {
        status: row.sync_status,
        outcome: outcome.name(),
    };

    let mut next = row.clone();
    match (row.sync_status, outcome) {
        (SyncStatus::Deleting, Outcome::Applied { .. } | Outcome::ApplyFailed { .. }) => {
            return Err(stale());
        }
        (SyncStatus::Synced, Outcome::Applied { issuer_entry_id })
            if row.issuer_entry_id.as_ref() == Some(issuer_entry_id) =>
        {
            return Ok(Effect::Unchanged);
        }
        (_, Outcome::Applied { issuer_entry_id }) => {
            next.sync_status = SyncStatus::Synced;
            next.issuer_entry_id = Some(issuer_entry_id.clone());
            next.sync_error = None;
        }
        (_, Outcome::ApplyFailed { error }) => {
            next.sync_status = SyncStatus::Failed;
            next.sync_error = Some(error.clone());
        }
        (SyncStatus::Deleting, Outcome::Revoked) => return Ok(Effect::Remove),
        (SyncStatus::Deleting, Outcome::RevokeFailed { error }) => {
            next.sync_error = Some(error.clone());
        }
        (_, Outcome::Revoked | Outcome::RevokeFailed { .. }) => return Err(stale()),
    }

    next.last_sync_at = Some(at);
    next.version = row.version + 1;
    Ok(Effect::Update(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::LedgerKey;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn row(status: SyncStatus, issuer: Option<&str>) -> LedgerRow {
        let mut row = LedgerRow::pending(LedgerKey::new("site-a", "e1"), at(0), 1);
        row.sync_status = status;
        row.issuer_entry_id = issuer.map(IssuerEntryId::from);
        row
    }

    fn applied(id: &str) -> Outcome {
        Outcome::Applied {
            issuer_entry_id: IssuerEntryId::from(id),
        }
    }

    fn updated(effect: Effect) -> LedgerRow {
        match effect {
            Effect::Update(row) => row,
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn pending_to_synced_sets_issuer_id() {
        let next = updated(plan_transition(&row(SyncStatus::Pending, None), &applied("x1"), at(5)).unwrap());
        assert_eq!(next.sync_status, SyncStatus::Synced);
        assert_eq!(next.issuer_entry_id, Some(IssuerEntryId::from("x1")));
        assert_eq!(next.last_sync_at, Some(at(5)));
        assert_eq!(next.sync_error, None);
        assert_eq!(next.version, 2);
    }

    #[test]
    fn failure_preserves_issuer_id() {
        let outcome = Outcome::ApplyFailed { error: "timeout".into() };
        let next = updated(plan_transition(&row(SyncStatus::Synced, Some("x1")), &outcome, at(5)).unwrap());
        assert_eq!(next.sync_status, SyncStatus::Failed);
        assert_eq!(next.sync_error.as_deref(), Some("timeout"));
        assert_eq!(next.issuer_entry_id, Some(IssuerEntryId::from("x1")));
    }

    #[test]
    fn failed_to_synced_clears_error() {
        let mut failed = row(SyncStatus::Failed, None);
        failed.sync_error = Some("timeout".into());
        let next = updated(plan_transition(&failed, &applied("x2"), at(9)).unwrap());
        assert_eq!(next.sync_status, SyncStatus::Synced);
        assert_eq!(next.sync_error, None);
        assert_eq!(next.issuer_entry_id, Some(IssuerEntryId::from("x2")));
    }

    #[test]
    fn repeated_success_is_unchanged() {
        let synced = row(SyncStatus::Synced, Some("x1"));
        assert_eq!(plan_transition(&synced, &applied("x1"), at(9)).unwrap(), Effect::Unchanged);
    }

    #[test]
    fn success_with_new_issuer_id_overwrites() {
        let synced = row(SyncStatus::Synced, Some("x1"));
        let next = updated(plan_transition(&synced, &applied("x9"), at(9)).unwrap());
        assert_eq!(next.issuer_entry_id, Some(IssuerEntryId::from("x9")));
    }

    #[test]
    fn revoked_removes_deleting_row() {
        let deleting = row(SyncStatus::Deleting, Some("x1"));
        assert_eq!(plan_transition(&deleting, &Outcome::Revoked, at(1)).unwrap(), Effect::Remove);
    }

    #[test]
    fn revoke_failure_keeps_row_deleting() {
        let deleting = row(SyncStatus::Deleting, Some("x1"));
        let outcome = Outcome::RevokeFailed { error: "unavailable".into() };
        let next = updated(plan_transition(&deleting, &outcome, at(3)).unwrap());
        assert_eq!(next.sync_status, SyncStatus::Deleting);
        assert_eq!(next.sync_error.as_deref(), Some("unavailable"));
        assert_eq!(next.issuer_entry_id, Some(IssuerEntryId::from("x1")));
    }

    #[test]
    fn sync_reports_on_deleting_rows_are_stale() {
        let deleting = row(SyncStatus::Deleting, Some("x1"));
        let err = plan_transition(&deleting, &applied("x2"), at(1)).unwrap_err();
        assert!(matches!(err, LedgerError::StaleReport { status: SyncStatus::Deleting, .. }));
    }

    #[test]
    fn deletion_reports_outside_deleting_are_stale() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            let err = plan_transition(&row(status, Some("x1")), &Outcome::Revoked, at(1)).unwrap_err();
            assert_eq!(err.kind(), sitesync_types::ErrorKind::ConcurrencyConflict);
        }
    }

    #[test]
    fn outcome_from_reports() {
        assert_eq!(
            Outcome::from_sync_report(true, Some("x".into()), None).unwrap(),
            applied("x")
        );
        let err = Outcome::from_sync_report(true, None, None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport(_)));
        assert_eq!(err.kind(), sitesync_types::ErrorKind::Validation);
        assert_eq!(
            Outcome::from_sync_report(false, None, Some("boom".into())).unwrap(),
            Outcome::ApplyFailed { error: "boom".into() }
        );
        assert_eq!(Outcome::from_deletion_report(true, None), Outcome::Revoked);
    }
}
