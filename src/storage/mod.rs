//! Persistence sinks for assessments and alert-log rows.
//!
//! Writes are best-effort: callers log a failed write and carry on. SQLite
//! calls block, so async callers go through [`write_blocking`].

mod encrypted;
mod memory;

pub use encrypted::{AlertLogEntry, SecureStore, StoredAssessment};
pub use memory::{MemorySink, NullSink};

use crate::alert::{AlertOutcome, AlertRequest};
use crate::error::{AgentError, Result};
use crate::risk::RiskAssessment;

pub trait EventSink: Send + Sync {
    fn record_assessment(&self, assessment: &RiskAssessment) -> Result<()>;

    fn record_alert(&self, request: &AlertRequest, outcome: &AlertOutcome) -> Result<()>;
}

/// Run a sink write on tokio's blocking pool. A busy or locked database then
/// holds up only the awaiting task, never a runtime worker.
pub async fn write_blocking<F>(write: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(write).await {
        Ok(result) => result,
        Err(e) => Err(AgentError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))),
    }
}
