// crates/permission-gate-core/src/runtime/observer.rs
// ============================================================================
// Module: Permission Observability
// Description: Structured decision and mutation events with pluggable sinks.
// Purpose: Emit JSON-line logs without hard dependencies on a logging stack.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The evaluator, scope expander, and service report decisions, expansions,
//! and committed mutations to an injected [`PermissionObserver`]. Sinks
//! serialize events as one JSON object per line; a failed write is dropped
//! and never affects the decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::ActionKind;
use crate::core::DecisionReason;
use crate::core::EvaluationRequest;
use crate::core::EvaluationResult;
use crate::core::InstrumentKey;
use crate::core::ResourceKind;
use crate::core::RestrictionId;
use crate::core::RestrictionNotice;
use crate::core::RuleId;
use crate::core::UserId;
use crate::core::WinningRecord;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Decision event payload.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Identity that asked.
    pub actor: UserId,
    /// Owner narrowing, when supplied.
    pub owner: Option<UserId>,
    /// Resource class.
    pub resource: ResourceKind,
    /// Requested action.
    pub action: ActionKind,
    /// Instrument, when supplied.
    pub instrument: Option<InstrumentKey>,
    /// Decision outcome.
    pub allowed: bool,
    /// Deciding tier.
    pub reason: DecisionReason,
    /// Rule or restriction that decided.
    pub winning_record: Option<WinningRecord>,
    /// Non-blocking restriction notices.
    pub warnings: Vec<RestrictionNotice>,
    /// Whether the result came from the evaluation cache.
    pub cache_hit: bool,
}

impl DecisionEvent {
    /// Builds the event for one evaluated request.
    #[must_use]
    pub fn from_decision(
        request: &EvaluationRequest,
        result: &EvaluationResult,
        cache_hit: bool,
    ) -> Self {
        Self {
            event: "permission_decision",
            timestamp_ms: result.evaluated_at.as_unix_millis(),
            actor: request.actor,
            owner: request.owner,
            resource: request.resource,
            action: request.action,
            instrument: request.instrument.clone(),
            allowed: result.allowed,
            reason: result.reason,
            winning_record: result.winning_record,
            warnings: result.warnings.clone(),
            cache_hit,
        }
    }
}

/// Intent shape handed to the scope expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Data-sharing audience.
    DataSharing,
    /// Trading grant.
    TradingGrant,
    /// Restriction set.
    Restriction,
}

/// Expansion event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Intent shape.
    pub intent: IntentKind,
    /// Grantor or restricted user the intent is about.
    pub subject: UserId,
    /// Identity the rows will be attributed to.
    pub written_by: UserId,
    /// Rule rows planned.
    pub rules: usize,
    /// Restriction rows planned.
    pub restrictions: usize,
}

/// Committed mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Single rule insert.
    InsertRule,
    /// Single restriction insert.
    InsertRestriction,
    /// Data-sharing expansion.
    GrantDataSharing,
    /// Trading-action expansion.
    GrantTrading,
    /// Restriction expansion.
    RestrictTrading,
    /// Rule revocation.
    RevokeRule,
    /// Restriction revocation.
    RevokeRestriction,
}

/// Mutation event payload.
#[derive(Debug, Clone, Serialize)]
pub struct MutationEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Identity that made the change.
    pub caller: UserId,
    /// Mutation kind.
    pub kind: MutationKind,
    /// Rules written or revoked.
    pub rule_ids: Vec<RuleId>,
    /// Restrictions written or revoked.
    pub restriction_ids: Vec<RestrictionId>,
    /// Audit rows written in the same transaction.
    pub audit_entries: usize,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Observer for permission decisions and mutations.
pub trait PermissionObserver: Send + Sync {
    /// Records a decision.
    fn on_decision(&self, event: &DecisionEvent);

    /// Records a planned expansion, before validation or commit.
    fn on_expansion(&self, _event: &ExpansionEvent) {}

    /// Records a committed mutation.
    fn on_mutation(&self, _event: &MutationEvent) {}
}

/// Observer that logs JSON lines to stderr.
pub struct StderrJsonObserver;

impl PermissionObserver for StderrJsonObserver {
    fn on_decision(&self, event: &DecisionEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn on_expansion(&self, event: &ExpansionEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn on_mutation(&self, event: &MutationEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Observer that appends JSON lines to a file.
pub struct FileJsonObserver {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileJsonObserver {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Writes one serialized event line.
    fn write_line<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl PermissionObserver for FileJsonObserver {
    fn on_decision(&self, event: &DecisionEvent) {
        self.write_line(event);
    }

    fn on_expansion(&self, event: &ExpansionEvent) {
        self.write_line(event);
    }

    fn on_mutation(&self, event: &MutationEvent) {
        self.write_line(event);
    }
}

/// No-op observer.
pub struct NoopObserver;

impl PermissionObserver for NoopObserver {
    fn on_decision(&self, _event: &DecisionEvent) {}
}
