//! Renewal detection and the periodic reminder sweep.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Datelike, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::catalog::ProgramCatalog;
use super::domain::{HouseholdId, HouseholdRecord, RenewalInterval};
use super::repository::{
    HouseholdRepository, NotificationStatus, Notifier, RenewalNotice, RepositoryError,
};

pub const RENEWAL_NOTICE_TEMPLATE: &str = "renewal_due";

/// Attempts made to store a reminder timestamp before giving up on the write.
const NOTICE_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalPolicy {
    /// Minimum whole months between two reminders to the same household.
    pub notification_buffer_months: u32,
    /// Offer "Renew Now" during the calendar year a renewal falls due.
    pub calendar_year_renewal: bool,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            notification_buffer_months: 1,
            calendar_year_renewal: true,
        }
    }
}

impl RenewalPolicy {
    /// Never-notified households are always eligible for a reminder.
    pub fn notification_allowed(
        &self,
        last_notified: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match last_notified {
            None => true,
            Some(last) => last
                .checked_add_months(Months::new(self.notification_buffer_months))
                .map(|window_end| now > window_end)
                .unwrap_or(false),
        }
    }
}

pub fn renewal_due_at(
    last_completed_at: DateTime<Utc>,
    interval: RenewalInterval,
) -> Option<DateTime<Utc>> {
    interval.after(last_completed_at)
}

/// A household needs to renew once the shortest active renewal interval has
/// elapsed since its last completed application. Households that never
/// completed an application, and catalogs with only lifetime programs, never
/// need renewal.
pub fn needs_renewal(
    last_completed_at: Option<DateTime<Utc>>,
    interval: Option<RenewalInterval>,
    now: DateTime<Utc>,
) -> bool {
    match (last_completed_at, interval) {
        (Some(completed), Some(interval)) => renewal_due_at(completed, interval)
            .map(|due| now >= due)
            .unwrap_or(false),
        _ => false,
    }
}

pub fn renew_now_enabled(
    policy: &RenewalPolicy,
    last_completed_at: Option<DateTime<Utc>>,
    interval: Option<RenewalInterval>,
    now: DateTime<Utc>,
) -> bool {
    if !policy.calendar_year_renewal {
        return false;
    }
    match (last_completed_at, interval) {
        (Some(completed), Some(interval)) => {
            i64::from(now.year()) == i64::from(completed.year()) + i64::from(interval.years())
        }
        _ => false,
    }
}

/// Counters describing one sweep, logged and returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub not_due: usize,
    pub buffered: usize,
    pub notified: Vec<HouseholdId>,
    pub delivery_failures: Vec<HouseholdId>,
    /// Notices delivered whose timestamp could not be stored.
    pub write_failures: Vec<HouseholdId>,
}

pub struct RenewalScheduler<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    policy: RenewalPolicy,
    sweep_lock: Mutex<()>,
}

/// Outcome of stamping a household before its reminder goes out.
enum NoticeClaim {
    /// Stored with the new timestamp; carries the timestamp it replaced.
    Claimed(HouseholdRecord, Option<DateTime<Utc>>),
    /// A concurrent sweep already reminded this household within the buffer.
    AlreadyNotified,
}

impl<R, N> RenewalScheduler<R, N>
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, policy: RenewalPolicy) -> Self {
        Self {
            repository,
            notifier,
            policy,
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    /// Scan every completed, non-archived household and remind the ones due
    /// for renewal. Sweeps on one scheduler never overlap. The timestamp is
    /// stored before the reminder is sent, so sweeps from other processes see
    /// the household as buffered. A failed delivery restores the previous
    /// timestamp and the next sweep tries again.
    pub fn sweep(
        &self,
        catalog: &ProgramCatalog,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, RepositoryError> {
        let _running = self.sweep_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let interval = catalog.shortest_renewal_interval();
        let mut report = SweepReport::default();

        for record in self.repository.list()? {
            if record.is_archived || record.last_completed_at.is_none() {
                continue;
            }
            report.scanned += 1;

            if !needs_renewal(record.last_completed_at, interval, now) {
                report.not_due += 1;
                continue;
            }

            if !self
                .policy
                .notification_allowed(record.last_action_notification_at, now)
            {
                debug!(household = %record.id, "renewal reminder still within buffer");
                report.buffered += 1;
                continue;
            }

            let (claimed, previous) = match self.claim_notice(record, now) {
                Ok(NoticeClaim::Claimed(stored, previous)) => (stored, previous),
                Ok(NoticeClaim::AlreadyNotified) => {
                    report.buffered += 1;
                    continue;
                }
                Err((id, error)) => {
                    warn!(household = %id, %error, "failed to record renewal reminder");
                    report.write_failures.push(id);
                    continue;
                }
            };

            let notice = renewal_notice(&claimed, interval);
            if let Err(error) = self.notifier.notify(notice) {
                warn!(household = %claimed.id, %error, "renewal reminder not delivered");
                if let Err(error) = self.release_notice(&claimed.id, now, previous) {
                    warn!(household = %claimed.id, %error, "failed to reset renewal reminder timestamp");
                }
                report.delivery_failures.push(claimed.id);
                continue;
            }

            info!(household = %claimed.id, "renewal reminder sent");
            report.notified.push(claimed.id);
        }

        info!(
            scanned = report.scanned,
            notified = report.notified.len(),
            buffered = report.buffered,
            not_due = report.not_due,
            failures = report.delivery_failures.len(),
            "renewal sweep finished"
        );
        Ok(report)
    }

    pub fn notification_statuses(&self) -> Result<Vec<NotificationStatus>, RepositoryError> {
        Ok(self
            .repository
            .list()?
            .iter()
            .filter(|record| !record.is_archived && record.last_completed_at.is_some())
            .map(NotificationStatus::from)
            .collect())
    }

    fn claim_notice(
        &self,
        mut record: HouseholdRecord,
        now: DateTime<Utc>,
    ) -> Result<NoticeClaim, (HouseholdId, RepositoryError)> {
        let id = record.id.clone();
        let mut attempt = 1;
        loop {
            let previous = record.last_action_notification_at;
            record.last_action_notification_at = Some(now);
            match self.repository.commit(record) {
                Ok(stored) => return Ok(NoticeClaim::Claimed(stored, previous)),
                Err(RepositoryError::StaleRevision { .. }) if attempt < NOTICE_WRITE_ATTEMPTS => {
                    attempt += 1;
                    record = self.refetch(&id)?;
                    if !self
                        .policy
                        .notification_allowed(record.last_action_notification_at, now)
                    {
                        debug!(household = %id, "renewal reminder recorded by a concurrent sweep");
                        return Ok(NoticeClaim::AlreadyNotified);
                    }
                }
                Err(error) => return Err((id, error)),
            }
        }
    }

    fn release_notice(
        &self,
        id: &HouseholdId,
        now: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut attempt = 1;
        loop {
            let mut record = self.refetch(id).map_err(|(_, error)| error)?;
            if record.last_action_notification_at != Some(now) {
                return Ok(());
            }
            record.last_action_notification_at = previous;
            match self.repository.commit(record) {
                Ok(_) => return Ok(()),
                Err(RepositoryError::StaleRevision { .. }) if attempt < NOTICE_WRITE_ATTEMPTS => {
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn refetch(&self, id: &HouseholdId) -> Result<HouseholdRecord, (HouseholdId, RepositoryError)> {
        match self.repository.fetch(id) {
            Ok(Some(fresh)) => Ok(fresh),
            Ok(None) => Err((id.clone(), RepositoryError::NotFound)),
            Err(error) => Err((id.clone(), error)),
        }
    }
}

fn renewal_notice(record: &HouseholdRecord, interval: Option<RenewalInterval>) -> RenewalNotice {
    let mut details = BTreeMap::new();
    if let Some(due) = record
        .last_completed_at
        .zip(interval)
        .and_then(|(completed, interval)| renewal_due_at(completed, interval))
    {
        details.insert("renewal_due_on".to_string(), due.date_naive().to_string());
    }

    RenewalNotice {
        template: RENEWAL_NOTICE_TEMPLATE.to_string(),
        household_id: record.id.clone(),
        recipient: record.contact.email.clone(),
        details,
    }
}
