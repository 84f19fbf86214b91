//! Plait Error Types with Error Codes
//!
//! Error code ranges:
//! - PLAIT-000-009: Workflow errors
//! - PLAIT-010-019: Registry errors
//! - PLAIT-020-029: Argument/response contract errors
//! - PLAIT-030-039: Action execution errors
//! - PLAIT-040-049: Timeout/cancellation errors
//! - PLAIT-050-059: Predicate errors
//! - PLAIT-060-069: Dependency errors
//! - PLAIT-070-079: Path/template errors
//! - PLAIT-080-089: Unsupported-feature errors
//! - PLAIT-090-099: Aggregation/serialization errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlaitError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
#[diagnostic(url(docsrs))]
pub enum PlaitError {
    // ═══════════════════════════════════════════
    // WORKFLOW ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-001] Workflow execution failed: {source}")]
    #[diagnostic(
        code(plait::workflow_failed),
        help("Inspect the wrapped error for the failing statement")
    )]
    WorkflowFailed {
        #[source]
        source: Box<PlaitError>,
    },

    // ═══════════════════════════════════════════
    // REGISTRY ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-010] Action metadata has an empty activity name")]
    #[diagnostic(
        code(plait::activity_name_empty),
        help("Set metadata.activity before registering")
    )]
    ActivityNameEmpty,

    #[error("[PLAIT-011] Action '{key}' is already registered")]
    #[diagnostic(
        code(plait::already_registered),
        help("Registration keys are unique; pick a different namespace or activity name")
    )]
    AlreadyRegistered { key: String },

    #[error(
        "[PLAIT-012] Action is not registered (namespace: '{namespace}', activity: '{activity}')"
    )]
    #[diagnostic(
        code(plait::not_registered),
        help("Register the action before executing the workflow")
    )]
    NotRegistered { namespace: String, activity: String },

    // ═══════════════════════════════════════════
    // ARGUMENT / RESPONSE CONTRACT (020-029)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-020] Invalid arguments: {reason}")]
    #[diagnostic(
        code(plait::bad_arguments),
        help("Check the argument shape against the action's declared argument type")
    )]
    BadArguments { reason: String },

    #[error("[PLAIT-021] Missing required arguments: {}", .keys.join(", "))]
    #[diagnostic(
        code(plait::missing_arguments),
        help("Provide every key listed in required_argument_keys")
    )]
    MissingArguments { keys: Vec<String> },

    #[error("[PLAIT-022] Argument is not coercible to {expected} (got {actual})")]
    #[diagnostic(
        code(plait::type_mismatch),
        help("Pass a value that deserializes into the action's declared input type")
    )]
    TypeMismatch { expected: String, actual: String },

    #[error("[PLAIT-023] Missing required response fields: {} (raw: {raw})", .missing.join(", "))]
    #[diagnostic(
        code(plait::bad_response),
        help("The action must return every response field marked required")
    )]
    BadResponse { missing: Vec<String>, raw: String },

    // ═══════════════════════════════════════════
    // ACTION EXECUTION (030-039)
    // ═══════════════════════════════════════════
    /// Domain failure reported by a registered action.
    #[error("[PLAIT-030] Action error: {0}")]
    #[diagnostic(code(plait::action_error))]
    Action(String),

    #[error("[PLAIT-031] Action '{key}' failed: {source}")]
    #[diagnostic(
        code(plait::action_failed),
        help("The wrapped error is the last attempt's failure after retries")
    )]
    ActionFailed {
        key: String,
        #[source]
        source: Box<PlaitError>,
    },

    // ═══════════════════════════════════════════
    // TIMEOUT / CANCELLATION (040-049)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-040] Operation '{operation}' timed out after {duration_ms}ms")]
    #[diagnostic(
        code(plait::timeout),
        help("Increase the activity timeout or speed up the action")
    )]
    Timeout { operation: String, duration_ms: u64 },

    #[error("[PLAIT-041] Operation '{operation}' was cancelled")]
    #[diagnostic(code(plait::cancelled))]
    Cancelled { operation: String },

    // ═══════════════════════════════════════════
    // PREDICATE ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-050] Predicate '{expression}' failed: {reason}")]
    #[diagnostic(
        code(plait::predicate_failed),
        help("Check the `when` expression syntax: comparisons, && || !, parentheses")
    )]
    PredicateFailed { expression: String, reason: String },

    #[error("[PLAIT-051] Predicate '{expression}' evaluated to {value_type}, expected bool")]
    #[diagnostic(
        code(plait::predicate_not_bool),
        help("A `when` expression must produce true or false")
    )]
    PredicateNotBool {
        expression: String,
        value_type: String,
    },

    // ═══════════════════════════════════════════
    // DEPENDENCY ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-060] Dependency of '{id}' failed: {source}")]
    #[diagnostic(
        code(plait::dependency_failed),
        help("A pre-run statement or activity errored before the guarded step")
    )]
    DependencyFailed {
        id: String,
        #[source]
        source: Box<PlaitError>,
    },

    // ═══════════════════════════════════════════
    // PATH / TEMPLATE ERRORS (070-079)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-070] Invalid path '{path}': {reason}")]
    #[diagnostic(
        code(plait::invalid_path),
        help("Use dotted paths like a.b.c or a[0].b")
    )]
    InvalidPath { path: String, reason: String },

    // ═══════════════════════════════════════════
    // UNSUPPORTED FEATURES (080-089)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-080] Feature not implemented: {feature}. {suggestion}")]
    #[diagnostic(code(plait::not_implemented))]
    NotImplemented {
        feature: String,
        suggestion: String,
    },

    // ═══════════════════════════════════════════
    // AGGREGATION / SERIALIZATION (090-099)
    // ═══════════════════════════════════════════
    #[error("[PLAIT-090] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[PLAIT-091] Parallel child {index} failed: {source}")]
    #[diagnostic(code(plait::child_failed))]
    ChildFailed {
        index: usize,
        #[source]
        source: Box<PlaitError>,
    },

    #[error("[PLAIT-092] {0}")]
    #[diagnostic(
        code(plait::multiple_failures),
        help("Every entry is one failed parallel child")
    )]
    Multi(MultiError),

    #[error("[PLAIT-093] Worker panicked: {reason}")]
    #[diagnostic(code(plait::worker_panic))]
    WorkerPanic { reason: String },
}

impl PlaitError {
    /// Get the error code (e.g., "PLAIT-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkflowFailed { .. } => "PLAIT-001",
            Self::ActivityNameEmpty => "PLAIT-010",
            Self::AlreadyRegistered { .. } => "PLAIT-011",
            Self::NotRegistered { .. } => "PLAIT-012",
            Self::BadArguments { .. } => "PLAIT-020",
            Self::MissingArguments { .. } => "PLAIT-021",
            Self::TypeMismatch { .. } => "PLAIT-022",
            Self::BadResponse { .. } => "PLAIT-023",
            Self::Action(_) => "PLAIT-030",
            Self::ActionFailed { .. } => "PLAIT-031",
            Self::Timeout { .. } => "PLAIT-040",
            Self::Cancelled { .. } => "PLAIT-041",
            Self::PredicateFailed { .. } => "PLAIT-050",
            Self::PredicateNotBool { .. } => "PLAIT-051",
            Self::DependencyFailed { .. } => "PLAIT-060",
            Self::InvalidPath { .. } => "PLAIT-070",
            Self::NotImplemented { .. } => "PLAIT-080",
            Self::JsonError(_) => "PLAIT-090",
            Self::ChildFailed { .. } => "PLAIT-091",
            Self::Multi(_) => "PLAIT-092",
            Self::WorkerPanic { .. } => "PLAIT-093",
        }
    }

    /// Check if this error is (or wraps) a timeout.
    ///
    /// Used by lifecycle hooks to pick the `timeout` hook over `error`.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::WorkflowFailed { source }
            | Self::ActionFailed { source, .. }
            | Self::DependencyFailed { source, .. }
            | Self::ChildFailed { source, .. } => source.is_timeout(),
            Self::Multi(multi) => multi.iter().any(|e| e.is_timeout()),
            _ => false,
        }
    }

    /// Check if this error is (or wraps) a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::WorkflowFailed { source }
            | Self::ActionFailed { source, .. }
            | Self::DependencyFailed { source, .. }
            | Self::ChildFailed { source, .. } => source.is_cancelled(),
            Self::Multi(multi) => multi.iter().any(|e| e.is_cancelled()),
            _ => false,
        }
    }

    /// Check if error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Action(_) | Self::ActionFailed { .. } | Self::Timeout { .. }
        )
    }
}

impl FixSuggestion for PlaitError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            PlaitError::WorkflowFailed { .. } => {
                Some("Inspect the wrapped error for the failing statement")
            }
            PlaitError::ActivityNameEmpty => Some("Set metadata.activity before registering"),
            PlaitError::AlreadyRegistered { .. } => {
                Some("Registration keys are unique; pick a different namespace or activity name")
            }
            PlaitError::NotRegistered { .. } => {
                Some("Register the action before executing the workflow")
            }
            PlaitError::BadArguments { .. } => {
                Some("Check the argument shape against the action's declared argument type")
            }
            PlaitError::MissingArguments { .. } => {
                Some("Provide every key listed in required_argument_keys")
            }
            PlaitError::TypeMismatch { .. } => {
                Some("Pass a value that deserializes into the action's declared input type")
            }
            PlaitError::BadResponse { .. } => {
                Some("The action must return every response field marked required")
            }
            PlaitError::Action(_) => Some("Check the action's own error message"),
            PlaitError::ActionFailed { .. } => {
                Some("The wrapped error is the last attempt's failure after retries")
            }
            PlaitError::Timeout { .. } => {
                Some("Increase the activity timeout or speed up the action")
            }
            PlaitError::Cancelled { .. } => {
                Some("The ambient context or an enclosing scope was cancelled")
            }
            PlaitError::PredicateFailed { .. } => {
                Some("Check the `when` expression syntax: comparisons, && || !, parentheses")
            }
            PlaitError::PredicateNotBool { .. } => {
                Some("A `when` expression must produce true or false")
            }
            PlaitError::DependencyFailed { .. } => {
                Some("A pre-run statement or activity errored before the guarded step")
            }
            PlaitError::InvalidPath { .. } => Some("Use dotted paths like a.b.c or a[0].b"),
            PlaitError::NotImplemented { .. } => {
                Some("This feature is planned for a future release")
            }
            PlaitError::JsonError(_) => Some("Check JSON syntax"),
            PlaitError::ChildFailed { .. } => Some("Inspect the wrapped child error"),
            PlaitError::Multi(_) => Some("Every entry is one failed parallel child"),
            PlaitError::WorkerPanic { .. } => {
                Some("A spawned statement panicked; check the action implementations")
            }
        }
    }
}

// ═══════════════════════════════════════════
// MULTI-ERROR AGGREGATION
// ═══════════════════════════════════════════

/// Accumulates child failures from a parallel fan-out.
///
/// Callers see every failure, not only the first one.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<PlaitError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: PlaitError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaitError> {
        self.errors.iter()
    }

    /// Collapse into a single result: empty → Ok, otherwise Err(Multi).
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PlaitError::Multi(self))
        }
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failure(s): ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}
