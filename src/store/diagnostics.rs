//! Diagnostics sink
//!
//! Counters and a short history of the problems the pipeline absorbed
//! instead of failing: transport errors, undecodable frames, server error
//! frames, unknown frame types, dropped sends, reconnect exhaustion.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How many recent events are kept
pub const RECENT_EVENT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Transport,
    Decode,
    ServerError,
    UnknownFrame,
    SendDropped,
    Exhausted,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Transport => write!(f, "transport"),
            DiagnosticKind::Decode => write!(f, "decode"),
            DiagnosticKind::ServerError => write!(f, "server_error"),
            DiagnosticKind::UnknownFrame => write!(f, "unknown_frame"),
            DiagnosticKind::SendDropped => write!(f, "send_dropped"),
            DiagnosticKind::Exhausted => write!(f, "exhausted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiagnosticEvent {
    pub at: DateTime<Utc>,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Diagnostics {
    pub transport_errors: u64,
    pub decode_errors: u64,
    pub server_errors: u64,
    pub unknown_frames: u64,
    pub sends_dropped: u64,
    /// Data frames dropped because they belong to another session
    pub inactive_frames: u64,
    pub recent: VecDeque<DiagnosticEvent>,
}

impl Diagnostics {
    pub fn record(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        match kind {
            DiagnosticKind::Transport => self.transport_errors += 1,
            DiagnosticKind::Decode => self.decode_errors += 1,
            DiagnosticKind::ServerError => self.server_errors += 1,
            DiagnosticKind::UnknownFrame => self.unknown_frames += 1,
            DiagnosticKind::SendDropped => self.sends_dropped += 1,
            DiagnosticKind::Exhausted => {}
        }

        if self.recent.len() >= RECENT_EVENT_LIMIT {
            self.recent.pop_front();
        }
        self.recent.push_back(DiagnosticEvent {
            at: Utc::now(),
            kind,
            message: message.into(),
        });
    }

    pub fn last(&self) -> Option<&DiagnosticEvent> {
        self.recent.back()
    }

    /// Most recent event of one kind
    pub fn last_of(&self, kind: DiagnosticKind) -> Option<&DiagnosticEvent> {
        self.recent.iter().rev().find(|e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_by_kind() {
        let mut diag = Diagnostics::default();
        diag.record(DiagnosticKind::Decode, "bad json");
        diag.record(DiagnosticKind::Decode, "missing timestamp");
        diag.record(DiagnosticKind::ServerError, "device offline");

        assert_eq!(diag.decode_errors, 2);
        assert_eq!(diag.server_errors, 1);
        assert_eq!(diag.transport_errors, 0);
        assert_eq!(diag.last().unwrap().message, "device offline");
        assert_eq!(
            diag.last_of(DiagnosticKind::Decode).unwrap().message,
            "missing timestamp"
        );
    }

    #[test]
    fn test_recent_is_bounded() {
        let mut diag = Diagnostics::default();
        for i in 0..(RECENT_EVENT_LIMIT + 10) {
            diag.record(DiagnosticKind::UnknownFrame, format!("frame {}", i));
        }
        assert_eq!(diag.recent.len(), RECENT_EVENT_LIMIT);
        assert_eq!(diag.recent.front().unwrap().message, "frame 10");
        assert_eq!(diag.unknown_frames as usize, RECENT_EVENT_LIMIT + 10);
    }
}
