use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};

#[derive(Clone)]
pub struct ElnoteMetrics {
    pub registry: Registry,
    pub experiments_created_total: IntCounter,
    pub addenda_created_total: IntCounter,
    pub conflicts_created_total: IntCounter,
    pub attachments_initiated_total: IntCounter,
    pub attachments_completed_total: IntCounter,
    pub reconcile_findings_total: IntCounterVec,
    pub audit_emit_failures_total: IntCounter,
    pub http_errors_total: IntCounterVec,
    pub ws_connections_active: IntGauge,
    pub sync_events_emitted_total: IntCounter,
    pub reconcile_duration_seconds: Histogram,
}

impl ElnoteMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let experiments_created_total = IntCounter::new(
            "elnote_experiments_created_total",
            "Experiments created",
        )
        .unwrap();
        let addenda_created_total = IntCounter::new(
            "elnote_addenda_created_total",
            "Addenda appended to experiments",
        )
        .unwrap();
        let conflicts_created_total = IntCounter::new(
            "elnote_conflicts_created_total",
            "Stale-base conflicts recorded on addendum attempts",
        )
        .unwrap();
        let attachments_initiated_total = IntCounter::new(
            "elnote_attachments_initiated_total",
            "Attachment uploads initiated",
        )
        .unwrap();
        let attachments_completed_total = IntCounter::new(
            "elnote_attachments_completed_total",
            "Attachment uploads confirmed complete",
        )
        .unwrap();
        let reconcile_findings_total = IntCounterVec::new(
            prometheus::Opts::new(
                "elnote_reconcile_findings_total",
                "Findings recorded by the attachment reconciler, by kind",
            ),
            &["kind"],
        )
        .unwrap();
        let audit_emit_failures_total = IntCounter::new(
            "elnote_audit_emit_failures_total",
            "Audit event emission failures",
        )
        .unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "elnote_http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["code", "status"],
        )
        .unwrap();
        let ws_connections_active = IntGauge::new(
            "elnote_ws_connections_active",
            "Open WebSocket change-feed subscriptions",
        )
        .unwrap();
        let sync_events_emitted_total = IntCounter::new(
            "elnote_sync_events_emitted_total",
            "Change-feed events appended to sync_events",
        )
        .unwrap();
        let reconcile_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "elnote_reconcile_duration_seconds",
                "Duration of a single attachment reconciliation scan",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .unwrap();

        let _ = registry.register(Box::new(experiments_created_total.clone()));
        let _ = registry.register(Box::new(addenda_created_total.clone()));
        let _ = registry.register(Box::new(conflicts_created_total.clone()));
        let _ = registry.register(Box::new(attachments_initiated_total.clone()));
        let _ = registry.register(Box::new(attachments_completed_total.clone()));
        let _ = registry.register(Box::new(reconcile_findings_total.clone()));
        let _ = registry.register(Box::new(audit_emit_failures_total.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        let _ = registry.register(Box::new(ws_connections_active.clone()));
        let _ = registry.register(Box::new(sync_events_emitted_total.clone()));
        let _ = registry.register(Box::new(reconcile_duration_seconds.clone()));

        ElnoteMetrics {
            registry,
            experiments_created_total,
            addenda_created_total,
            conflicts_created_total,
            attachments_initiated_total,
            attachments_completed_total,
            reconcile_findings_total,
            audit_emit_failures_total,
            http_errors_total,
            ws_connections_active,
            sync_events_emitted_total,
            reconcile_duration_seconds,
        }
    }
}

impl Default for ElnoteMetrics {
    fn default() -> Self {
        Self::new()
    }
}
