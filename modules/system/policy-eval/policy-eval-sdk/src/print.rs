//! Diagnostic print output emitted by policies.

/// Receives each diagnostic print emitted during evaluation.
pub trait PrintSink: Send + Sync {
    fn print(&self, message: &str);
}

/// Default sink: forwards prints to the `policy_print` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPrintSink;

impl PrintSink for TracingPrintSink {
    fn print(&self, message: &str) {
        tracing::info!(target: "policy_print", "{message}");
    }
}
