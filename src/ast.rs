//! Plan types - the static description of a workflow
//!
//! A workflow is a tree of [`Statement`]s, each holding at most one
//! [`Activity`], one sequence, and one parallel block, guarded by a
//! [`Control`]. These types are pure configuration; execution lives in
//! [`crate::runtime`]. Everything derives serde so an external loader can
//! feed YAML or JSON trees.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::binding::Binding;

// ═══════════════════════════════════════════
// ACTIVITY
// ═══════════════════════════════════════════

/// Retry policy for an activity's action invocation.
///
/// `maximum_attempts` counts retries, so 0 still runs the action once.
/// The backoff doubles per attempt starting from `initial_interval`
/// (default 50ms), parsed from strings like "50ms", "2s", "1m".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub maximum_attempts: u32,
    #[serde(
        deserialize_with = "de_opt_duration",
        serialize_with = "ser_opt_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_interval: Option<Duration>,
}

/// Reference to a registered action by its composite key parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityRef {
    pub namespace: String,
    pub activity: String,
}

/// Pre-runs an activity needs before its action is invoked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependsOn {
    /// A sequence of statements executed against the shaped input.
    Statements(Vec<Statement>),
    /// References to registered actions. Parsed but not executable yet;
    /// running an activity with this shape reports not-implemented.
    Actions(Vec<ActivityRef>),
}

// serde_yaml's enum deserialization only accepts YAML `!Tag` syntax, not the
// externally-tagged map shape (`statements: [...]` / `actions: [...]`) that
// this format and its tests use. Deserialize through a plain map-shaped
// helper instead, which serde_yaml handles like any other struct.
impl<'de> Deserialize<'de> for DependsOn {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "snake_case")]
        struct DependsOnHelper {
            statements: Option<Vec<Statement>>,
            actions: Option<Vec<ActivityRef>>,
        }

        let helper = DependsOnHelper::deserialize(deserializer)?;
        match (helper.statements, helper.actions) {
            (Some(statements), None) => Ok(DependsOn::Statements(statements)),
            (None, Some(actions)) => Ok(DependsOn::Actions(actions)),
            _ => Err(serde::de::Error::custom(
                "depends_on must have exactly one of `statements` or `actions`",
            )),
        }
    }
}

/// Lifecycle transition points around an action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookEvent {
    Start,
    Complete,
    Success,
    Error,
    Timeout,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::Start => write!(f, "start"),
            HookEvent::Complete => write!(f, "complete"),
            HookEvent::Success => write!(f, "success"),
            HookEvent::Error => write!(f, "error"),
            HookEvent::Timeout => write!(f, "timeout"),
        }
    }
}

/// Optional sub-actions fired at lifecycle transitions.
///
/// Hooks are best-effort observers: their results and errors never alter
/// the wrapped action's outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifecycleHooks(pub HashMap<HookEvent, Activity>);

impl LifecycleHooks {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, event: HookEvent) -> Option<&Activity> {
        self.0.get(&event)
    }
}

/// A single workflow node wrapping one action invocation with argument
/// shaping, dependencies, caching, hooks, retry, timeout, and response
/// mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    /// Optional identifier; scopes inputs and outputs under this key.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Name of the registered action to invoke.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub activity: String,

    /// Defaults that overwrite the input unconditionally (dotted paths).
    #[serde(skip_serializing_if = "Binding::is_empty")]
    pub args_force: Binding,

    /// Defaults that only fill paths the input does not resolve.
    #[serde(skip_serializing_if = "Binding::is_empty")]
    pub args_fallback: Binding,

    /// Template rewriting the effective payload, e.g. `"{{id}}"`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub arguments: String,

    /// Post-shaping map applied to the result via JSON-path force-set.
    #[serde(skip_serializing_if = "Binding::is_empty")]
    pub responses: Binding,

    #[serde(skip_serializing_if = "LifecycleHooks::is_empty")]
    pub hooks: LifecycleHooks,

    /// Per-node timeout in seconds; 0 means no scoped deadline.
    #[serde(skip_serializing_if = "is_zero")]
    pub timeout: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,

    /// Reuse the cached response for identical payloads until the TTL
    /// elapses.
    #[serde(skip_serializing_if = "is_false")]
    pub cached: bool,

    pub retry_policy: RetryPolicy,
}

impl Activity {
    /// Label used in errors and logs: the id when set, else the key.
    pub fn display_id(&self) -> String {
        if self.id.is_empty() {
            crate::action::action_key(&self.namespace, &self.activity)
        } else {
            self.id.clone()
        }
    }
}

// ═══════════════════════════════════════════
// CONTROL
// ═══════════════════════════════════════════

/// What a composite does when this child errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Stop and surface the error.
    #[default]
    #[serde(alias = "")]
    Propagate,
    /// Log the error and continue with the pre-failure binding.
    Ignore,
}

/// Whether the enclosing composite returns right after this child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExit {
    #[default]
    #[serde(alias = "")]
    Continue,
    /// Return immediately on success; the remaining tail runs detached.
    Exit,
}

/// The three sub-node kinds a statement can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Activity,
    Sequence,
    Parallel,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Activity => write!(f, "activity"),
            NodeKind::Sequence => write!(f, "sequence"),
            NodeKind::Parallel => write!(f, "parallel"),
        }
    }
}

/// Per-statement guard: predicate, error policy, exit policy, and
/// execution-order preference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Control {
    /// Predicate expression; empty means always execute.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub when: String,

    /// Activities executed before `when` evaluates, merging their deltas
    /// into the predicate's view.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Activity>,

    pub onerror: OnError,

    pub onexit: OnExit,

    /// Reserved; parsed but without runtime semantics.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub wait: String,

    /// Preference order over the populated sub-node kinds.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub execution_order: Vec<NodeKind>,
}

impl Control {
    pub fn ignores_errors(&self) -> bool {
        self.onerror == OnError::Ignore
    }

    pub fn exits_after(&self) -> bool {
        self.onexit == OnExit::Exit
    }
}

// ═══════════════════════════════════════════
// STATEMENT / WORKFLOW
// ═══════════════════════════════════════════

/// Union node: at most one activity, one sequence, one parallel block,
/// guarded by a control. A statement with no sub-node is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Statement {
    pub control: Control,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<Statement>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<Vec<Statement>>,
}

/// Top-level plan: fallback variables, a root statement, and a final
/// response overlay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Workflow {
    /// Fallback-merged into the caller-supplied input.
    #[serde(skip_serializing_if = "Binding::is_empty")]
    pub variables: Binding,

    pub root: Statement,

    /// Force-overlaid onto the root's final delta via JSON-path set.
    #[serde(skip_serializing_if = "Binding::is_empty")]
    pub responses: Binding,
}

// ═══════════════════════════════════════════
// DURATION (DE)SERIALIZATION
// ═══════════════════════════════════════════

/// Parse a duration string like "50ms", "30s", "5m", "1h". A bare number
/// is taken as seconds.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let s = duration_str.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60));
    }
    if let Some(hours) = s.strip_suffix('h') {
        return hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600));
    }

    s.parse::<u64>().ok().map(Duration::from_secs)
}

fn de_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_duration(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{}'", s))),
    }
}

fn ser_opt_duration<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(d) => serializer.serialize_str(&format!("{}ms", d.as_millis())),
        None => serializer.serialize_none(),
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}
