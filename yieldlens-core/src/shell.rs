//! Dashboard flows.
//!
//! Drives ingestion -> gateway -> normalizer on upload and
//! gateway -> normalizer -> merger on prediction, committing each step to the
//! session. The session lock is only held for transitions, never while the
//! model request is awaited.
//!
//! Each flow runs on its own task. Dropping the future returned by `upload`
//! or `predict` (a client disconnect, a request timeout) leaves the flow
//! running, so the session always reaches `Displaying` or `Error` and its
//! loading flag is cleared.

use crate::error::{Result, YieldLensError};
use crate::gateway::ModelGateway;
use crate::ingestion;
use crate::normalizer;
use crate::session::{FlowTicket, SessionView, SharedSession};
use crate::types::FlowKind;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs the analysis and prediction flows against a gateway.
#[derive(Debug, Clone)]
pub struct DashboardShell {
    gateway: ModelGateway,
}

impl DashboardShell {
    pub fn new(gateway: ModelGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Ingest an uploaded file and analyze it.
    ///
    /// On failure the user-facing message is recorded on the session before
    /// the error is returned. A completion made stale by a newer upload
    /// returns the session as it is now.
    pub async fn upload<B>(
        &self,
        session: &SharedSession,
        file_name: &str,
        bytes: B,
    ) -> Result<SessionView>
    where
        B: AsRef<[u8]> + Send + Sync + 'static,
    {
        let shell = self.clone();
        let session = session.clone();
        let file_name = file_name.to_string();
        let task = tokio::spawn(async move {
            shell
                .run_upload(&session, &file_name, bytes.as_ref())
                .await
        });
        join_flow(task, FlowKind::Analysis).await
    }

    /// Run a prediction with the session's current inputs and merge it into
    /// the displayed result.
    pub async fn predict(&self, session: &SharedSession) -> Result<SessionView> {
        let shell = self.clone();
        let session = session.clone();
        let task = tokio::spawn(async move { shell.run_predict(&session).await });
        join_flow(task, FlowKind::Prediction).await
    }

    async fn run_upload(
        &self,
        session: &SharedSession,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<SessionView> {
        let (session_id, ticket) = {
            let mut s = session.lock().await;
            let ticket = s.begin_upload(file_name)?;
            (s.id(), ticket)
        };
        info!(
            session_id = %session_id,
            generation = ticket.generation,
            file_name,
            bytes = bytes.len(),
            "Upload received"
        );

        let canonical = match ingestion::to_canonical_csv(file_name, bytes) {
            Ok(canonical) => Arc::new(canonical),
            Err(e) => return Err(record_failure(session, ticket, e.into()).await),
        };

        {
            let mut s = session.lock().await;
            if !s.data_ingested(ticket, Arc::clone(&canonical)) {
                return Ok(s.view());
            }
        }

        let outcome = match self.gateway.request_analysis(&canonical).await {
            Ok(raw) => normalizer::normalize(&raw).map_err(YieldLensError::from),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(result) => {
                let mut s = session.lock().await;
                if s.analysis_succeeded(ticket, result) {
                    info!(
                        session_id = %session_id,
                        insights = s.result().map_or(0, |r| r.key_insights.len()),
                        visualizations = s.result().map_or(0, |r| r.visualizations.len()),
                        "Analysis displayed"
                    );
                }
                Ok(s.view())
            }
            Err(e) => Err(record_failure(session, ticket, e).await),
        }
    }

    async fn run_predict(&self, session: &SharedSession) -> Result<SessionView> {
        let (session_id, ticket, inputs, canonical) = {
            let mut s = session.lock().await;
            let ticket = s.begin_prediction()?;
            let canonical = s.shared_canonical_data().unwrap_or_default();
            (s.id(), ticket, s.inputs().clone(), canonical)
        };
        info!(
            session_id = %session_id,
            generation = ticket.generation,
            inputs = inputs.filled().count(),
            "Prediction requested"
        );

        let outcome = match self.gateway.request_prediction(&inputs, &canonical).await {
            Ok(raw) => normalizer::normalize(&raw).map_err(YieldLensError::from),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(partial) => {
                let mut s = session.lock().await;
                if s.prediction_succeeded(ticket, &partial) {
                    info!(
                        session_id = %session_id,
                        predicted_yield = s.result().and_then(|r| r.predicted_yield.as_deref()).unwrap_or(""),
                        "Prediction merged"
                    );
                }
                Ok(s.view())
            }
            Err(e) => Err(record_failure(session, ticket, e).await),
        }
    }
}

/// Wait for a flow task. A panic in the flow is resumed on the caller.
async fn join_flow(task: JoinHandle<Result<SessionView>>, kind: FlowKind) -> Result<SessionView> {
    match task.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!(flow = %kind, error = %e, "Flow task cancelled");
            Err(YieldLensError::Interrupted { kind })
        }
    }
}

/// Record a flow failure on the session and hand the error back.
async fn record_failure(
    session: &SharedSession,
    ticket: FlowTicket,
    error: YieldLensError,
) -> YieldLensError {
    let message = error.user_message(ticket.kind);
    let mut s = session.lock().await;
    if s.flow_failed(ticket, message) {
        warn!(
            session_id = %s.id(),
            flow = %ticket.kind,
            error = %error,
            "Flow failed"
        );
    } else {
        debug!(flow = %ticket.kind, error = %error, "Ignoring failure of a stale flow");
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, NormalizeError, ValidationError};
    use crate::parameters::InputValue;
    use crate::providers::MockLlmProvider;
    use crate::session::{Phase, SessionStore};
    use std::time::Duration;

    const CSV: &str = "Batch ID,Material Supplier,Temperature,Yield\nB001,SupplierA,20,92.5\n";

    const ANALYSIS: &str = r#"{"Key Insights": ["A is best"], "Top Yield Impact Factors": ["Supplier"],
        "Optimization Suggestions": ["Prefer A"], "Optional Predicted Yield (if inputs provided)": "",
        "Visualizations": []}"#;

    const PREDICTION: &str = r#"{"Key Insights": [], "Top Yield Impact Factors": [], "Optimization Suggestions": [],
        "Optional Predicted Yield (if inputs provided)": "93%", "Visualizations": []}"#;

    fn shell_with(mock: Arc<MockLlmProvider>) -> DashboardShell {
        DashboardShell::new(ModelGateway::new(mock))
    }

    #[tokio::test]
    async fn test_upload_then_predict() {
        let mock = Arc::new(MockLlmProvider::with_response(ANALYSIS));
        mock.queue_text(PREDICTION);
        let shell = shell_with(mock.clone());
        let store = SessionStore::new();
        let session = store.create().await;

        let view = shell.upload(&session, "batches.csv", CSV.as_bytes()).await.unwrap();
        assert_eq!(view.phase, Phase::Displaying);
        assert!(view.has_data);

        session
            .lock()
            .await
            .set_input("temperature", InputValue::Number(21.0))
            .unwrap();
        let view = shell.predict(&session).await.unwrap();
        let result = view.result.unwrap();
        assert_eq!(result.key_insights, vec!["A is best"]);
        assert_eq!(result.predicted_yield.as_deref(), Some("93%"));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_file_never_reaches_gateway() {
        let mock = Arc::new(MockLlmProvider::new());
        let shell = shell_with(mock.clone());
        let session = SessionStore::new().create().await;

        let err = shell.upload(&session, "notes.pdf", b"%PDF").await.unwrap_err();
        assert_eq!(
            err.user_message(FlowKind::Analysis),
            "Unsupported file type. Please upload CSV or Excel files."
        );
        let s = session.lock().await;
        assert_eq!(s.phase(), Phase::Error);
        assert_eq!(
            s.error(),
            Some("Unsupported file type. Please upload CSV or Excel files.")
        );
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unparsable_analysis_recorded() {
        let mock = Arc::new(MockLlmProvider::with_response("Sorry, I cannot help."));
        let shell = shell_with(mock);
        let session = SessionStore::new().create().await;

        let err = shell.upload(&session, "a.csv", CSV.as_bytes()).await.unwrap_err();
        assert!(matches!(
            err,
            YieldLensError::Normalize(NormalizeError::UnparsableResponse { .. })
        ));
        let s = session.lock().await;
        assert_eq!(
            s.error(),
            Some("The AI output could not be understood. Please try again.")
        );
        assert!(s.result().is_none());
        assert!(s.canonical_data().is_some());
    }

    #[tokio::test]
    async fn test_not_configured_gateway() {
        let shell = DashboardShell::new(ModelGateway::unconfigured());
        let session = SessionStore::new().create().await;

        let err = shell.upload(&session, "a.csv", CSV.as_bytes()).await.unwrap_err();
        assert!(matches!(err, YieldLensError::Llm(LlmError::NotConfigured)));
        assert_eq!(
            session.lock().await.error(),
            Some("API key is not configured. Cannot analyze data.")
        );
    }

    #[tokio::test]
    async fn test_predict_without_inputs_is_validation_error() {
        let mock = Arc::new(MockLlmProvider::with_response(ANALYSIS));
        let shell = shell_with(mock.clone());
        let session = SessionStore::new().create().await;
        shell.upload(&session, "a.csv", CSV.as_bytes()).await.unwrap();

        let err = shell.predict(&session).await.unwrap_err();
        assert!(matches!(
            err,
            YieldLensError::Validation(ValidationError::NoInputs)
        ));
        assert_eq!(
            err.user_message(FlowKind::Prediction),
            "Please provide input values for prediction."
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_prediction_failure_keeps_analysis() {
        let mock = Arc::new(MockLlmProvider::with_response(ANALYSIS));
        mock.queue_error(LlmError::InvalidCredential {
            provider: "Gemini".into(),
        });
        let shell = shell_with(mock);
        let session = SessionStore::new().create().await;
        shell.upload(&session, "a.csv", CSV.as_bytes()).await.unwrap();
        session.lock().await.set_input("shift", "Day".into()).unwrap();

        shell.predict(&session).await.unwrap_err();
        let s = session.lock().await;
        assert_eq!(
            s.error(),
            Some("The configured API key is not valid. Please check your API key.")
        );
        assert_eq!(s.result().unwrap().key_insights, vec!["A is best"]);
    }

    #[tokio::test]
    async fn test_prediction_discarded_after_new_upload() {
        let mock = Arc::new(MockLlmProvider::new().with_delay(Duration::from_millis(200)));
        mock.queue_text(ANALYSIS);
        mock.queue_text(PREDICTION);
        mock.queue_text(&ANALYSIS.replace("A is best", "C is best"));
        let shell = shell_with(mock);
        let session = SessionStore::new().create().await;
        shell.upload(&session, "old.csv", CSV.as_bytes()).await.unwrap();
        session.lock().await.set_input("shift", "Night".into()).unwrap();

        let slow_prediction = {
            let shell = shell.clone();
            let session = session.clone();
            tokio::spawn(async move { shell.predict(&session).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let view = shell.upload(&session, "new.csv", CSV.as_bytes()).await.unwrap();
        let stale = slow_prediction.await.unwrap().unwrap();
        assert!(stale.result.is_none());

        let result = view.result.unwrap();
        assert_eq!(view.file_name.as_deref(), Some("new.csv"));
        assert_eq!(result.key_insights, vec!["C is best"]);
        assert!(result.predicted_yield.is_none());
        assert!(!view.is_loading_prediction);
    }

    #[tokio::test]
    async fn test_second_upload_rejected_while_analyzing() {
        let mock = Arc::new(MockLlmProvider::new().with_delay(Duration::from_millis(200)));
        mock.queue_text(ANALYSIS);
        let shell = shell_with(mock.clone());
        let session = SessionStore::new().create().await;

        let first = {
            let shell = shell.clone();
            let session = session.clone();
            tokio::spawn(async move { shell.upload(&session, "one.csv", CSV.as_bytes()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = shell.upload(&session, "two.csv", CSV.as_bytes()).await.unwrap_err();
        assert!(matches!(
            err,
            YieldLensError::Validation(ValidationError::Busy {
                kind: FlowKind::Analysis
            })
        ));
        let view = first.await.unwrap().unwrap();
        assert_eq!(view.file_name.as_deref(), Some("one.csv"));
        assert_eq!(view.phase, Phase::Displaying);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_upload_still_completes() {
        let mock = Arc::new(MockLlmProvider::new().with_delay(Duration::from_millis(300)));
        mock.queue_text(ANALYSIS);
        mock.queue_text(&ANALYSIS.replace("A is best", "B is best"));
        let shell = shell_with(mock.clone());
        let store = SessionStore::new();
        let session = store.create().await;

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            shell.upload(&session, "first.csv", CSV.as_bytes()),
        )
        .await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        {
            let s = session.lock().await;
            assert_eq!(s.phase(), Phase::Displaying);
            assert!(!s.is_busy());
            assert_eq!(s.result().unwrap().key_insights, vec!["A is best"]);
        }

        let view = shell
            .upload(&session, "second.csv", CSV.as_bytes())
            .await
            .unwrap();
        assert_eq!(view.result.unwrap().key_insights, vec!["B is best"]);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(store.purge_idle(chrono::Duration::seconds(-1)).await, 1);
    }

    #[tokio::test]
    async fn test_dropped_prediction_still_completes() {
        let mock = Arc::new(MockLlmProvider::new().with_delay(Duration::from_millis(300)));
        mock.queue_text(ANALYSIS);
        mock.queue_text(PREDICTION);
        mock.queue_text(&PREDICTION.replace("93%", "95%"));
        let shell = shell_with(mock);
        let session = SessionStore::new().create().await;
        shell.upload(&session, "a.csv", CSV.as_bytes()).await.unwrap();
        session.lock().await.set_input("shift", "Day".into()).unwrap();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), shell.predict(&session)).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        {
            let s = session.lock().await;
            assert!(!s.is_loading(FlowKind::Prediction));
            assert_eq!(
                s.result().unwrap().predicted_yield.as_deref(),
                Some("93%")
            );
        }

        let view = shell.predict(&session).await.unwrap();
        assert_eq!(
            view.result.unwrap().predicted_yield.as_deref(),
            Some("95%")
        );
    }
}
