use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Hard ceilings for one retrieval session. Each is independent; breaching
/// any one of them is terminal for the session.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetLimits {
    pub max_tool_calls: u64,
    pub max_loaded_messages: u64,
    pub max_result_chars: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_tool_calls: 3,
            max_loaded_messages: 40,
            max_result_chars: 12_000,
        }
    }
}

/// Session lifecycle. Exhausted and Cancelled are both terminal until an
/// explicit [`BudgetGuard::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    Idle,
    Active,
    Exhausted,
    Cancelled,
}

/// Point-in-time usage, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetUsage {
    pub state: BudgetState,
    pub tool_calls: u64,
    pub loaded_messages: u64,
    pub result_chars: u64,
    pub limits: BudgetLimits,
}

/// Monotonic resource counters shared across concurrent dimension work.
///
/// Message capacity is handed out through [`try_reserve_messages`], an atomic
/// test-and-decrement, so parallel dimensions cannot overshoot the ceiling.
/// Counters only move forward until [`clear`].
///
/// [`try_reserve_messages`]: BudgetGuard::try_reserve_messages
/// [`clear`]: BudgetGuard::clear
pub struct BudgetGuard {
    limits: BudgetLimits,
    tool_calls: AtomicU64,
    loaded_messages: AtomicU64,
    result_chars: AtomicU64,
    cancelled: AtomicBool,
}

impl BudgetGuard {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            tool_calls: AtomicU64::new(0),
            loaded_messages: AtomicU64::new(0),
            result_chars: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    pub fn state(&self) -> BudgetState {
        if self.cancelled.load(Ordering::SeqCst) {
            return BudgetState::Cancelled;
        }
        let calls = self.tool_calls.load(Ordering::SeqCst);
        let messages = self.loaded_messages.load(Ordering::SeqCst);
        let chars = self.result_chars.load(Ordering::SeqCst);
        if calls >= self.limits.max_tool_calls
            || messages >= self.limits.max_loaded_messages
            || chars >= self.limits.max_result_chars
        {
            return BudgetState::Exhausted;
        }
        if calls == 0 && messages == 0 && chars == 0 {
            BudgetState::Idle
        } else {
            BudgetState::Active
        }
    }

    /// Whether another retrieval operation may start.
    pub fn can_proceed(&self) -> bool {
        matches!(self.state(), BudgetState::Idle | BudgetState::Active)
    }

    /// Count one tool invocation against the session.
    pub fn record_tool_call(&self) {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Count characters emitted in a tool result.
    pub fn record_result_chars(&self, chars: u64) {
        self.result_chars.fetch_add(chars, Ordering::SeqCst);
    }

    /// Atomically reserve up to `wanted` messages from the remaining budget.
    /// Returns how many were actually granted, possibly zero. CAS loop, not
    /// check-then-act, so concurrent callers never collectively overshoot.
    pub fn try_reserve_messages(&self, wanted: u64) -> u64 {
        if wanted == 0 || !self.can_proceed() {
            return 0;
        }
        loop {
            let current = self.loaded_messages.load(Ordering::SeqCst);
            let remaining = self.limits.max_loaded_messages.saturating_sub(current);
            let grant = wanted.min(remaining);
            if grant == 0 {
                return 0;
            }
            match self.loaded_messages.compare_exchange(
                current,
                current + grant,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return grant,
                Err(_) => continue,
            }
        }
    }

    /// Return unused reservation. Only the delta between what was reserved
    /// and what was actually emitted should come back.
    pub fn release_messages(&self, unused: u64) {
        if unused > 0 {
            self.loaded_messages.fetch_sub(unused, Ordering::SeqCst);
        }
    }

    pub fn remaining_messages(&self) -> u64 {
        self.limits
            .max_loaded_messages
            .saturating_sub(self.loaded_messages.load(Ordering::SeqCst))
    }

    /// Abort the session. Distinct from exhaustion: the caller stopped, the
    /// ceilings did not.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Reset all counters and return to Idle.
    pub fn clear(&self) {
        self.tool_calls.store(0, Ordering::SeqCst);
        self.loaded_messages.store(0, Ordering::SeqCst);
        self.result_chars.store(0, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn usage(&self) -> BudgetUsage {
        BudgetUsage {
            state: self.state(),
            tool_calls: self.tool_calls.load(Ordering::SeqCst),
            loaded_messages: self.loaded_messages.load(Ordering::SeqCst),
            result_chars: self.result_chars.load(Ordering::SeqCst),
            limits: self.limits.clone(),
        }
    }

    /// Human-readable note naming every tripped ceiling, so callers can
    /// present partial results honestly. `None` while the session can still
    /// proceed.
    pub fn gap_annotation(&self) -> Option<String> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some("evidence collection cancelled before completion".to_string());
        }
        let mut tripped = Vec::new();
        if self.tool_calls.load(Ordering::SeqCst) >= self.limits.max_tool_calls {
            tripped.push(format!(
                "tool call limit reached ({} calls)",
                self.limits.max_tool_calls
            ));
        }
        if self.loaded_messages.load(Ordering::SeqCst) >= self.limits.max_loaded_messages {
            tripped.push(format!(
                "message limit reached ({} messages)",
                self.limits.max_loaded_messages
            ));
        }
        if self.result_chars.load(Ordering::SeqCst) >= self.limits.max_result_chars {
            tripped.push(format!(
                "result size limit reached ({} chars)",
                self.limits.max_result_chars
            ));
        }
        if tripped.is_empty() {
            None
        } else {
            Some(format!(
                "evidence collection truncated: {}. Partial results shown; unretrieved dimensions are listed in the coverage plan.",
                tripped.join("; ")
            ))
        }
    }
}

/// Per-session budget guards, keyed by caller-supplied session id.
#[derive(Default)]
pub struct BudgetRegistry {
    limits: BudgetLimits,
    sessions: Mutex<HashMap<String, Arc<BudgetGuard>>>,
}

impl BudgetRegistry {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch or create the guard for a session.
    pub fn guard_for(&self, session_id: &str) -> Arc<BudgetGuard> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(BudgetGuard::new(self.limits.clone())))
            .clone()
    }

    /// Drop a session's guard, clearing it for any outstanding holders.
    pub fn end_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(guard) = sessions.remove(session_id) {
            guard.clear();
        }
    }
}
