//! Prometheus counters served at `/metrics`
use ipl_pipeline::{Action, ExecutionOutcome};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Outcome label of a request that never reached the pipeline or hit a
/// structural error
pub const OUTCOME_ERROR: &str = "error";

/// Action label of a request body that could not be parsed
pub const INVALID_REQUEST: &str = "invalid_request";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    executions: IntCounterVec,
    warnings: IntCounter,
    sidecars_written: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let executions = IntCounterVec::new(
            Opts::new("ipl_executions_total", "Action executions by action and outcome"),
            &["action", "outcome"],
        )?;
        let warnings = IntCounter::new("ipl_warnings_total", "Warnings recorded by executions")?;
        let sidecars_written = IntCounter::new(
            "ipl_sidecars_written_total",
            "Label sidecar files written to shares",
        )?;

        registry.register(Box::new(executions.clone()))?;
        registry.register(Box::new(warnings.clone()))?;
        registry.register(Box::new(sidecars_written.clone()))?;

        Ok(Self {
            registry,
            executions,
            warnings,
            sidecars_written,
        })
    }

    pub fn observe(&self, outcome: &ExecutionOutcome) {
        self.executions
            .with_label_values(&[action_label(&outcome.action), outcome.phase().as_str()])
            .inc();
        self.warnings.inc_by(outcome.warnings.len() as u64);
        self.sidecars_written.inc_by(outcome.files_written as u64);
    }

    pub fn observe_error(&self, action: &Action) {
        self.executions
            .with_label_values(&[action_label(action), OUTCOME_ERROR])
            .inc();
    }

    pub fn observe_invalid_request(&self) {
        self.executions
            .with_label_values(&[INVALID_REQUEST, OUTCOME_ERROR])
            .inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

/// Unrecognized names share one label value
fn action_label(action: &Action) -> &str {
    match action {
        Action::Unrecognized(_) => "unrecognized",
        known => known.as_str(),
    }
}
