//! Actor identity and the audit-stamping hook run by the store before a commit.

use crate::core::{GymError, GymResult};
use crate::record::AuditStamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Identity stamped when no request is in flight (startup seeding, maintenance jobs).
pub const SYSTEM_ACTOR: &str = "Seed Data";
/// Identity stamped for a request that carries no authenticated user.
pub const ANONYMOUS_ACTOR: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Supervisor,
    Staff,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Supervisor => "Supervisor",
            Self::Staff => "Staff",
            Self::Client => "Client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "supervisor" => Ok(Self::Supervisor),
            "staff" => Ok(Self::Staff),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorIdentity {
    User(String),
    Anonymous,
    System,
}

/// The acting user for one request, passed explicitly into every service and
/// store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    identity: ActorIdentity,
    roles: BTreeSet<Role>,
    email: Option<String>,
}

impl ActorContext {
    pub fn system() -> Self {
        Self {
            identity: ActorIdentity::System,
            roles: BTreeSet::from([Role::Admin]),
            email: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            identity: ActorIdentity::Anonymous,
            roles: BTreeSet::new(),
            email: None,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            identity: ActorIdentity::User(name.into()),
            roles: BTreeSet::new(),
            email: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// The name written into audit stamps.
    pub fn name(&self) -> &str {
        match &self.identity {
            ActorIdentity::User(name) => name,
            ActorIdentity::Anonymous => ANONYMOUS_ACTOR,
            ActorIdentity::System => SYSTEM_ACTOR,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.identity, ActorIdentity::Anonymous)
    }

    pub fn is_in_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn require_authenticated(&self) -> GymResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(GymError::forbidden("authentication required"))
        }
    }

    pub fn require_any_role(&self, roles: &[Role]) -> GymResult<()> {
        self.require_authenticated()?;
        if roles.iter().any(|role| self.is_in_role(*role)) {
            return Ok(());
        }
        let wanted = roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(",");
        Err(GymError::forbidden(format!(
            "'{}' is not in any of the roles {wanted}",
            self.name()
        )))
    }
}

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock with microsecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let delta = by.num_microseconds().unwrap_or(i64::MAX);
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.micros.load(Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Modified,
    Deleted,
}

/// One record participating in a write batch, as seen by the stamper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntry {
    pub state: EntryState,
    /// Stamp currently persisted for the row. `None` for additions.
    pub original: Option<AuditStamp>,
    /// Stamp the entry will be written with. Whatever the caller put here
    /// for `created_*` is overwritten.
    pub audit: Option<AuditStamp>,
}

impl TrackedEntry {
    pub fn added() -> Self {
        Self {
            state: EntryState::Added,
            original: None,
            audit: None,
        }
    }

    pub fn modified(original: Option<AuditStamp>) -> Self {
        Self {
            state: EntryState::Modified,
            audit: original.clone(),
            original,
        }
    }

    pub fn deleted(original: Option<AuditStamp>) -> Self {
        Self {
            state: EntryState::Deleted,
            audit: original.clone(),
            original,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditStamper {
    clock: Arc<dyn Clock>,
}

impl Default for AuditStamper {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AuditStamper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Stamps every added or modified entry using one clock read, which is
    /// returned so callers can log it.
    pub fn stamp_batch(&self, actor: &ActorContext, entries: &mut [TrackedEntry]) -> DateTime<Utc> {
        let now = self.clock.now();
        let who = actor.name();

        for entry in entries.iter_mut() {
            match entry.state {
                EntryState::Added => {
                    entry.audit = Some(AuditStamp {
                        created_by: who.to_string(),
                        created_on: now,
                        updated_by: who.to_string(),
                        updated_on: now,
                    });
                }
                EntryState::Modified => {
                    let (created_by, created_on) = match &entry.original {
                        Some(original) => (original.created_by.clone(), original.created_on),
                        None => (who.to_string(), now),
                    };
                    entry.audit = Some(AuditStamp {
                        created_by,
                        created_on,
                        updated_by: who.to_string(),
                        updated_on: now,
                    });
                }
                EntryState::Deleted => {}
            }
        }

        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 6, 5, 53, 22).unwrap()))
    }

    #[test]
    fn added_entries_mirror_created_into_updated() {
        let stamper = AuditStamper::new(clock());
        let mut entries = vec![TrackedEntry::added()];
        let now = stamper.stamp_batch(&ActorContext::user("admin@gym.com"), &mut entries);

        let stamp = entries[0].audit.as_ref().unwrap();
        assert_eq!(stamp.created_by, "admin@gym.com");
        assert_eq!(stamp.created_on, now);
        assert_eq!(stamp.updated_by, stamp.created_by);
        assert_eq!(stamp.updated_on, stamp.created_on);
    }

    #[test]
    fn modified_entries_keep_original_created_pair_even_if_tampered() {
        let clock = clock();
        let stamper = AuditStamper::new(clock.clone());
        let mut created = vec![TrackedEntry::added()];
        stamper.stamp_batch(&ActorContext::system(), &mut created);
        let original = created.remove(0).audit;

        clock.advance(chrono::Duration::minutes(5));
        let mut entry = TrackedEntry::modified(original.clone());
        if let Some(stamp) = entry.audit.as_mut() {
            stamp.created_by = "mallory".to_string();
        }
        let mut entries = vec![entry];
        stamper.stamp_batch(&ActorContext::user("staff@gym.com"), &mut entries);

        let original = original.unwrap();
        let stamp = entries[0].audit.as_ref().unwrap();
        assert_eq!(stamp.created_by, SYSTEM_ACTOR);
        assert_eq!(stamp.created_on, original.created_on);
        assert_eq!(stamp.updated_by, "staff@gym.com");
        assert!(stamp.updated_on > original.updated_on);
    }

    #[test]
    fn batch_shares_one_timestamp_and_skips_deletes() {
        let stamper = AuditStamper::new(clock());
        let mut earlier = vec![TrackedEntry::added()];
        stamper.stamp_batch(&ActorContext::user("alice"), &mut earlier);
        let persisted = earlier.remove(0).audit;

        let mut entries = vec![
            TrackedEntry::added(),
            TrackedEntry::added(),
            TrackedEntry::deleted(persisted.clone()),
        ];
        stamper.stamp_batch(&ActorContext::anonymous(), &mut entries);

        let first = entries[0].audit.as_ref().unwrap();
        let second = entries[1].audit.as_ref().unwrap();
        assert_eq!(first.created_on, second.created_on);
        assert_eq!(first.created_by, ANONYMOUS_ACTOR);
        assert_eq!(entries[2].audit, persisted);
        assert_eq!(entries[2].audit.as_ref().unwrap().updated_by, "alice");
    }

    #[test]
    fn role_checks() {
        let staff = ActorContext::user("s@gym.com").with_role(Role::Staff);
        assert!(staff.require_any_role(&[Role::Admin, Role::Staff]).is_ok());
        assert!(staff.require_any_role(&[Role::Admin]).is_err());
        assert!(ActorContext::anonymous().require_authenticated().is_err());
        assert_eq!("SUPERVISOR".parse::<Role>().unwrap(), Role::Supervisor);
    }
}
