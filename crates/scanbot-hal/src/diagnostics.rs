//! Fire-and-forget diagnostics output (the serial console on the robot).

use tracing::info;

/// A line-oriented text sink.  Emission never fails and never blocks the
/// caller for long; a sink that cannot deliver drops the line.
pub trait DiagnosticsSink: Send {
    fn emit(&mut self, line: &str);
}

/// Sink that forwards every line to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&mut self, line: &str) {
        info!(target: "scanbot::diagnostics", "{line}");
    }
}
