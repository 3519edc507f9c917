//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Reconciliation turns and stage submissions
//! - Retries against the host
//! - Artifact transfers
//! - Trigger wake-ups

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Orchestrator
// =============================================================================

/// Reconciliation turns by result.
pub static RECONCILE_TURNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("windrun_reconcile_turns_total", "Total reconciliation turns"),
        &["result"], // "idle", "submitted", "terminated", "error"
    )
    .unwrap()
});

/// Stage submissions by stage and result.
pub static STAGE_SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "windrun_stage_submissions_total",
            "Stage upload+submit attempts",
        ),
        &["stage", "result"], // result: "submitted", "failed"
    )
    .unwrap()
});

// =============================================================================
// Host
// =============================================================================

/// Retries of host calls by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "windrun_retry_attempts_total",
            "Retries of transient host failures",
        ),
        &["operation"],
    )
    .unwrap()
});

/// Artifact transfer duration in seconds.
pub static TRANSFER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "windrun_transfer_duration_seconds",
            "Duration of artifact uploads and downloads",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
        &["direction", "result"], // direction: "upload", "download"
    )
    .unwrap()
});

// =============================================================================
// Triggers
// =============================================================================

/// Trigger wake-ups by source and delivery result.
pub static TRIGGER_WAKEUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("windrun_trigger_wakeups_total", "Trigger wake-ups"),
        &["source", "result"], // result: "queued", "coalesced", "closed"
    )
    .unwrap()
});

/// Push channel (re)connections by result.
pub static PUSH_CONNECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "windrun_push_connections_total",
            "Notification hub connection attempts",
        ),
        &["result"], // "connected", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RECONCILE_TURNS.clone()),
        Box::new(STAGE_SUBMISSIONS.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(TRANSFER_DURATION.clone()),
        Box::new(TRIGGER_WAKEUPS.clone()),
        Box::new(PUSH_CONNECTIONS.clone()),
    ]
}
