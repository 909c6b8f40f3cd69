//! Liveness state machine.
//!
//! Every mutation of a monitor is expressed as a [`Command`] and planned by
//! the pure function [`plan`], which sees the monitor's current state and its
//! open incident (if any) and returns the complete set of writes as a
//! [`Plan`]. Stores apply a plan in a single atomic unit per monitor, holding
//! the monitor's row lock from the read that fed [`plan`] until commit. That
//! keeps the "open an incident only on the transition into DOWN" decision and
//! the status write inside one read-modify-write.
//!
//! ```text
//! PENDING --(ping/start)--> HEALTHY / RUNNING
//! HEALTHY|RUNNING --(deadline passed, within grace)--> LATE
//! HEALTHY|RUNNING|LATE --(grace expired)--> DOWN [+ incident]
//! LATE|DOWN|RUNNING --(heartbeat)--> HEALTHY
//! any --(pause)--> PAUSED --(resume)--> PENDING
//! PAUSED --(ping)--> acknowledged, unchanged
//! ```

use chrono::{DateTime, TimeDelta, Utc};

use super::{
    Archival, Incident, IncidentId, Monitor, MonitorPatch, MonitorStatus, Ping, PingId, PingKind,
    PingSource,
};
use crate::error::WatchError;

/// A requested mutation of one monitor.
#[derive(Debug, Clone)]
pub enum Command {
    /// Inbound heartbeat or start signal.
    Ping {
        /// Signal kind.
        kind: PingKind,
        /// Caller metadata.
        source: PingSource,
        /// Resolve the open incident when a heartbeat arrives.
        resolve_incident: bool,
    },
    /// Deadline check performed by the sweeper.
    Sweep,
    /// User pause.
    Pause,
    /// User resume.
    Resume,
    /// Soft delete with a retention window.
    Archive {
        /// How long the archived monitor is kept before purge.
        retention: TimeDelta,
    },
    /// Undo an archive before purge.
    Restore,
    /// Settings change.
    Reconfigure(MonitorPatch),
}

/// What a command did, reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Heartbeat accepted; carries the new deadline.
    Pinged {
        /// New deadline.
        next_expected_at: DateTime<Utc>,
    },
    /// Start accepted.
    Started {
        /// Recorded start time.
        started_at: DateTime<Utc>,
    },
    /// Ping swallowed because the monitor is paused.
    PausedIgnored,
    /// Nothing to do.
    Unchanged,
    /// Deadline passed, still within grace.
    MarkedLate,
    /// Grace expired. `opened` is `None` when an incident was already open.
    MarkedDown {
        /// Newly opened incident.
        opened: Option<IncidentId>,
    },
    /// Monitor paused.
    Paused,
    /// Monitor resumed into pending.
    Resumed,
    /// Monitor archived.
    Archived {
        /// End of the retention window.
        delete_after: DateTime<Utc>,
    },
    /// Monitor restored from the archive.
    Restored,
    /// Settings updated.
    Reconfigured,
}

/// The full set of writes produced by one command.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Status before the command.
    pub previous_status: MonitorStatus,
    /// Replacement monitor record, when anything changed.
    pub monitor: Option<Monitor>,
    /// Ping to append.
    pub ping: Option<Ping>,
    /// Incident to insert.
    pub open_incident: Option<Incident>,
    /// Incident a transition into DOWN alerts under: the one being opened,
    /// or the one still open from an earlier outage.
    pub alert_incident: Option<Incident>,
    /// Open incident to resolve at the command's timestamp.
    pub resolve_incident: Option<IncidentId>,
    /// Result reported to the caller.
    pub outcome: Outcome,
}

impl Plan {
    fn unchanged(monitor: &Monitor, outcome: Outcome) -> Self {
        Self {
            previous_status: monitor.status,
            monitor: None,
            ping: None,
            open_incident: None,
            alert_incident: None,
            resolve_incident: None,
            outcome,
        }
    }

    fn update(monitor: &Monitor, next: Monitor, outcome: Outcome) -> Self {
        Self {
            previous_status: monitor.status,
            monitor: Some(next),
            ping: None,
            open_incident: None,
            alert_incident: None,
            resolve_incident: None,
            outcome,
        }
    }

    /// Returns `true` if applying the plan writes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.monitor.is_none()
            && self.ping.is_none()
            && self.open_incident.is_none()
            && self.resolve_incident.is_none()
    }
}

/// Plans `command` against the current state of `monitor`.
///
/// `open_incident` must be the monitor's unresolved incident as read inside
/// the same atomic unit the plan will be applied in.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] when pinging an archived monitor,
/// [`WatchError::InvalidState`] for user commands that do not apply to the
/// current state, and [`WatchError::InvalidRequest`] for invalid settings.
pub fn plan(
    monitor: &Monitor,
    open_incident: Option<&Incident>,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<Plan, WatchError> {
    match command {
        Command::Ping {
            kind,
            source,
            resolve_incident,
        } => plan_ping(monitor, open_incident, *kind, source, *resolve_incident, now),
        Command::Sweep => Ok(plan_sweep(monitor, open_incident, now)),
        Command::Pause => plan_pause(monitor, now),
        Command::Resume => plan_resume(monitor, now),
        Command::Archive { retention } => plan_archive(monitor, *retention, now),
        Command::Restore => plan_restore(monitor, now),
        Command::Reconfigure(patch) => {
            if monitor.is_archived() {
                return Err(WatchError::InvalidState(
                    "archived monitors cannot be reconfigured".to_string(),
                ));
            }
            let next = patch.apply_to(monitor, now)?;
            Ok(Plan::update(monitor, next, Outcome::Reconfigured))
        }
    }
}

fn plan_ping(
    monitor: &Monitor,
    open_incident: Option<&Incident>,
    kind: PingKind,
    source: &PingSource,
    resolve_incident: bool,
    now: DateTime<Utc>,
) -> Result<Plan, WatchError> {
    if monitor.is_archived() {
        return Err(WatchError::MonitorNotFound(monitor.slug.to_string()));
    }
    if monitor.status == MonitorStatus::Paused {
        return Ok(Plan::unchanged(monitor, Outcome::PausedIgnored));
    }

    let mut next = monitor.clone();
    next.updated_at = now;
    let mut resolve = None;
    let outcome = match kind {
        PingKind::Heartbeat => {
            let deadline = now + monitor.schedule.interval();
            next.status = MonitorStatus::Healthy;
            next.last_ping_at = Some(now);
            next.next_expected_at = Some(deadline);
            if resolve_incident {
                resolve = open_incident.map(|incident| incident.id);
            }
            Outcome::Pinged {
                next_expected_at: deadline,
            }
        }
        PingKind::Start => {
            next.status = MonitorStatus::Running;
            next.last_started_at = Some(now);
            if next.next_expected_at.is_none() {
                next.next_expected_at = Some(now + monitor.schedule.interval());
            }
            Outcome::Started { started_at: now }
        }
    };

    let mut plan = Plan::update(monitor, next, outcome);
    plan.ping = Some(Ping {
        id: PingId::new(),
        monitor_id: monitor.id,
        kind,
        received_at: now,
        source: source.clone(),
    });
    plan.resolve_incident = resolve;
    Ok(plan)
}

fn plan_sweep(monitor: &Monitor, open_incident: Option<&Incident>, now: DateTime<Utc>) -> Plan {
    if !monitor.is_sweep_candidate(now) {
        return Plan::unchanged(monitor, Outcome::Unchanged);
    }
    let Some(grace_end) = monitor.grace_end() else {
        return Plan::unchanged(monitor, Outcome::Unchanged);
    };

    if now < grace_end {
        if monitor.status == MonitorStatus::Late {
            return Plan::unchanged(monitor, Outcome::Unchanged);
        }
        let mut next = monitor.clone();
        next.status = MonitorStatus::Late;
        next.updated_at = now;
        return Plan::update(monitor, next, Outcome::MarkedLate);
    }

    let mut next = monitor.clone();
    next.status = MonitorStatus::Down;
    next.updated_at = now;
    let incident = match open_incident {
        Some(_) => None,
        None => Some(Incident::open(monitor.id, now)),
    };
    let mut plan = Plan::update(
        monitor,
        next,
        Outcome::MarkedDown {
            opened: incident.as_ref().map(|i| i.id),
        },
    );
    plan.alert_incident = incident.clone().or_else(|| open_incident.cloned());
    plan.open_incident = incident;
    plan
}

fn plan_pause(monitor: &Monitor, now: DateTime<Utc>) -> Result<Plan, WatchError> {
    if monitor.is_archived() {
        return Err(WatchError::InvalidState(
            "archived monitors cannot be paused".to_string(),
        ));
    }
    if monitor.status == MonitorStatus::Paused {
        return Ok(Plan::unchanged(monitor, Outcome::Unchanged));
    }
    let mut next = monitor.clone();
    next.status = MonitorStatus::Paused;
    next.updated_at = now;
    Ok(Plan::update(monitor, next, Outcome::Paused))
}

fn plan_resume(monitor: &Monitor, now: DateTime<Utc>) -> Result<Plan, WatchError> {
    if monitor.status != MonitorStatus::Paused {
        return Err(WatchError::InvalidState(format!(
            "monitor is {}, not paused",
            monitor.status
        )));
    }
    let mut next = monitor.clone();
    next.status = MonitorStatus::Pending;
    next.next_expected_at = None;
    next.updated_at = now;
    Ok(Plan::update(monitor, next, Outcome::Resumed))
}

fn plan_archive(
    monitor: &Monitor,
    retention: TimeDelta,
    now: DateTime<Utc>,
) -> Result<Plan, WatchError> {
    if monitor.is_archived() {
        return Err(WatchError::InvalidState("monitor is already archived".to_string()));
    }
    let delete_after = now + retention;
    let mut next = monitor.clone();
    next.archival = Archival::Archived {
        archived_at: now,
        delete_after,
    };
    next.updated_at = now;
    Ok(Plan::update(monitor, next, Outcome::Archived { delete_after }))
}

fn plan_restore(monitor: &Monitor, now: DateTime<Utc>) -> Result<Plan, WatchError> {
    if !monitor.is_archived() {
        return Err(WatchError::InvalidState("monitor is not archived".to_string()));
    }
    let mut next = monitor.clone();
    next.archival = Archival::Active;
    next.updated_at = now;
    Ok(Plan::update(monitor, next, Outcome::Restored))
}
