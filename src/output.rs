//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Each entity (locator, log entry) leads with its positional index and its
//! identity. Secondary details such as failure reasons, subjects, and
//! provider responses follow as indented context lines.
//!
//! # Output Format
//!
//! ## Preload
//!
//! ```text
//! 001/003 /images/hero.jpg
//! 002/003 /images/missing.jpg
//!     failed: server responded with status 404
//! 003/003 /images/probe.jpg
//!
//! Loaded 2 of 3 (67%)
//! Failed
//! 001 /images/missing.jpg
//! ```
//!
//! ## Log
//!
//! ```text
//! 001 success 2026-03-07T14:05:09.123Z jane@example.com
//!     Subject: CMM calibration quote
//!     Detail: 200 OK
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::audit::{AttemptStatus, LogEntry};
use crate::preload::{LoadState, PreloadEvent, Settlement};
use crate::provider::ProviderResponse;

/// Longest detail shown before truncation.
const DETAIL_MAX: usize = 120;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ============================================================================
// Preload
// ============================================================================

/// Format a single preload progress event as display lines.
pub fn format_preload_event(event: &PreloadEvent) -> Vec<String> {
    match event {
        PreloadEvent::Settled {
            locator,
            settlement,
            settled,
            total,
        } => {
            let mut lines = vec![format!(
                "{}/{} {}",
                format_index(*settled),
                format_index(*total),
                locator
            )];
            if let Settlement::Failed(reason) = settlement {
                lines.push(format!("{}failed: {}", indent(1), reason));
            }
            lines
        }
        // The final report covers completion.
        PreloadEvent::Completed { .. } => Vec::new(),
    }
}

/// Format the summary printed once an invocation has settled.
pub fn format_preload_report(state: &LoadState) -> Vec<String> {
    let total = state.requested().len();
    if total == 0 {
        return vec!["Nothing to preload".to_string()];
    }

    let mut lines = vec![
        String::new(),
        format!(
            "Loaded {} of {} ({:.0}%)",
            state.loaded().len(),
            total,
            state.loaded().len() as f64 * 100.0 / total as f64
        ),
    ];
    if !state.failed().is_empty() {
        lines.push("Failed".to_string());
        for (i, locator) in state.failed().iter().enumerate() {
            lines.push(format!("{} {}", format_index(i + 1), locator));
        }
    }
    lines
}

pub fn print_preload_report(state: &LoadState) {
    for line in format_preload_report(state) {
        println!("{}", line);
    }
}

// ============================================================================
// Send
// ============================================================================

pub fn format_send_result(response: &ProviderResponse) -> Vec<String> {
    vec![format!("Delivered: {}", response)]
}

pub fn print_send_result(response: &ProviderResponse) {
    for line in format_send_result(response) {
        println!("{}", line);
    }
}

// ============================================================================
// Audit log
// ============================================================================

/// Format the audit log, oldest entry first.
pub fn format_audit_log(entries: &[LogEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["Audit log is empty".to_string()];
    }

    let mut lines = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let status = match entry.status {
            AttemptStatus::Success => "success",
            AttemptStatus::Error => "error",
        };
        lines.push(format!(
            "{} {} {} {}",
            format_index(i + 1),
            status,
            entry.timestamp,
            entry.sender_identity
        ));
        lines.push(format!("{}Subject: {}", indent(1), entry.subject));
        if !entry.detail.is_empty() {
            lines.push(format!(
                "{}Detail: {}",
                indent(1),
                truncate_desc(&entry.detail, DETAIL_MAX)
            ));
        }
    }
    lines
}

pub fn print_audit_log(entries: &[LogEntry]) {
    for line in format_audit_log(entries) {
        println!("{}", line);
    }
}
