//! Hub event name constants.
//!
//! Events are published in-process to subscribed listeners and fanned out as
//! [`Notification`](crate::Notification)s to external observers.

/// All hub event names, grouped by component.
pub struct Events;

impl Events {
    // ── Dispatcher ──────────────────────────────────────────────────────
    pub const COMMAND_EXECUTED: &str = "command/executed";

    // ── Registry ────────────────────────────────────────────────────────
    pub const SERVER_STATUS_CHANGED: &str = "server/statusChanged";

    // ── Orchestrator ────────────────────────────────────────────────────
    pub const WORKFLOW_COMPLETED: &str = "workflow/completed";

    // ── Autonomous loop ─────────────────────────────────────────────────
    pub const AUTONOMOUS_TICK: &str = "autonomous/tick";

    pub const ALL: [EventName; 4] = [
        Self::COMMAND_EXECUTED,
        Self::SERVER_STATUS_CHANGED,
        Self::WORKFLOW_COMPLETED,
        Self::AUTONOMOUS_TICK,
    ];
}

/// Type alias for event names.
pub type EventName = &'static str;
