//! Dashboard session state and lifecycle management.
//!
//! A `Session` owns everything one analyst sees: the uploaded file name, the
//! canonical data string, the displayed `AnalysisResult`, the current error
//! and the hypothetical inputs. Transitions are synchronous methods; the
//! async flows in `shell` call them around model requests.
//!
//! Every flow carries a `FlowTicket`. A new upload bumps the session
//! generation, so completions from flows started before it are discarded.

use crate::error::ValidationError;
use crate::merger::merge;
use crate::parameters::{HypotheticalInputs, InputValue};
use crate::types::{AnalysisResult, FlowKind, PartialAnalysisResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Where a session is in its upload/analyze/predict cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Uploading,
    Analyzing,
    Displaying,
    Predicting,
    Error,
}

/// Identifies one in-flight flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTicket {
    pub generation: u64,
    pub kind: FlowKind,
}

/// One analyst's dashboard session.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    phase: Phase,
    file_name: Option<String>,
    canonical_data: Option<Arc<String>>,
    result: Option<AnalysisResult>,
    error: Option<String>,
    inputs: HypotheticalInputs,
    loading_analysis: bool,
    loading_prediction: bool,
    generation: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            phase: Phase::Idle,
            file_name: None,
            canonical_data: None,
            result: None,
            error: None,
            inputs: HypotheticalInputs::new(),
            loading_analysis: false,
            loading_prediction: false,
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn canonical_data(&self) -> Option<&str> {
        self.canonical_data.as_deref().map(String::as_str)
    }

    /// A handle to the canonical data that outlives the session lock.
    pub fn shared_canonical_data(&self) -> Option<Arc<String>> {
        self.canonical_data.clone()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn inputs(&self) -> &HypotheticalInputs {
        &self.inputs
    }

    pub fn is_loading(&self, kind: FlowKind) -> bool {
        match kind {
            FlowKind::Analysis => self.loading_analysis,
            FlowKind::Prediction => self.loading_prediction,
        }
    }

    /// Whether any flow is in flight.
    pub fn is_busy(&self) -> bool {
        self.loading_analysis || self.loading_prediction
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the session has been untouched for longer than `ttl`.
    pub fn is_idle_for(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > ttl
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn is_current(&self, ticket: FlowTicket) -> bool {
        if ticket.generation == self.generation {
            return true;
        }
        debug!(
            session_id = %self.id,
            ticket_generation = ticket.generation,
            current_generation = self.generation,
            kind = %ticket.kind,
            "Discarding stale flow completion"
        );
        false
    }

    /// Set one hypothetical input. A blank value clears the field.
    pub fn set_input(&mut self, field: &str, value: InputValue) -> Result<(), ValidationError> {
        self.inputs.set(field, value)?;
        self.touch();
        Ok(())
    }

    /// Start an upload: clears the previous result, error and data.
    pub fn begin_upload(&mut self, file_name: &str) -> Result<FlowTicket, ValidationError> {
        if self.loading_analysis {
            return Err(ValidationError::Busy {
                kind: FlowKind::Analysis,
            });
        }

        self.generation += 1;
        self.phase = Phase::Uploading;
        self.file_name = Some(file_name.to_string());
        self.canonical_data = None;
        self.result = None;
        self.error = None;
        self.loading_analysis = true;
        // A prediction still in flight belongs to the previous generation.
        self.loading_prediction = false;
        self.touch();

        Ok(FlowTicket {
            generation: self.generation,
            kind: FlowKind::Analysis,
        })
    }

    /// The upload was converted to canonical text. Returns `false` if stale.
    pub fn data_ingested(&mut self, ticket: FlowTicket, canonical: Arc<String>) -> bool {
        if !self.is_current(ticket) || self.phase != Phase::Uploading {
            return false;
        }
        self.canonical_data = Some(canonical);
        self.phase = Phase::Analyzing;
        self.touch();
        true
    }

    /// The analysis came back and was normalized. Returns `false` if stale.
    pub fn analysis_succeeded(&mut self, ticket: FlowTicket, result: AnalysisResult) -> bool {
        if !self.is_current(ticket) || self.phase != Phase::Analyzing {
            return false;
        }
        self.result = Some(result);
        self.error = None;
        self.loading_analysis = false;
        self.phase = Phase::Displaying;
        self.touch();
        true
    }

    /// Start a prediction.
    ///
    /// `Busy` leaves the session untouched. `NoDataset` and `NoInputs` are
    /// recorded as the current error without entering `Predicting`.
    pub fn begin_prediction(&mut self) -> Result<FlowTicket, ValidationError> {
        if self.loading_prediction {
            return Err(ValidationError::Busy {
                kind: FlowKind::Prediction,
            });
        }
        if self.loading_analysis {
            return Err(ValidationError::Busy {
                kind: FlowKind::Analysis,
            });
        }

        let precondition = if self.canonical_data.is_none() {
            Err(ValidationError::NoDataset)
        } else if !self.inputs.has_any() {
            Err(ValidationError::NoInputs)
        } else {
            Ok(())
        };
        if let Err(err) = precondition {
            self.error = Some(err.to_string());
            self.touch();
            return Err(err);
        }

        self.error = None;
        self.loading_prediction = true;
        self.phase = Phase::Predicting;
        self.touch();
        Ok(FlowTicket {
            generation: self.generation,
            kind: FlowKind::Prediction,
        })
    }

    /// Merge a prediction into the displayed result. Returns `false` if stale.
    pub fn prediction_succeeded(
        &mut self,
        ticket: FlowTicket,
        partial: &PartialAnalysisResult,
    ) -> bool {
        if !self.is_current(ticket) || !self.loading_prediction {
            return false;
        }
        self.result = Some(merge(self.result.as_ref(), partial));
        self.error = None;
        self.loading_prediction = false;
        self.phase = Phase::Displaying;
        self.touch();
        true
    }

    /// Record a flow failure. Returns `false` if stale.
    pub fn flow_failed(&mut self, ticket: FlowTicket, message: String) -> bool {
        if !self.is_current(ticket) || !self.is_loading(ticket.kind) {
            return false;
        }
        match ticket.kind {
            FlowKind::Analysis => self.loading_analysis = false,
            FlowKind::Prediction => self.loading_prediction = false,
        }
        self.error = Some(message);
        self.phase = Phase::Error;
        self.touch();
        true
    }

    /// Snapshot for clients.
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            phase: self.phase,
            file_name: self.file_name.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            inputs: self.inputs.clone(),
            is_loading_analysis: self.loading_analysis,
            is_loading_prediction: self.loading_prediction,
            has_data: self.canonical_data.is_some(),
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub phase: Phase,
    pub file_name: Option<String>,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub inputs: HypotheticalInputs,
    pub is_loading_analysis: bool,
    pub is_loading_prediction: bool,
    pub has_data: bool,
    pub updated_at: DateTime<Utc>,
}

/// A session shared between request handlers.
pub type SharedSession = Arc<Mutex<Session>>;

/// All live sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new session.
    pub async fn create(&self) -> SharedSession {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(Session::new(id)));
        self.sessions.write().await.insert(id, session.clone());
        debug!(session_id = %id, "Session created");
        session
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session. Returns `true` if it existed.
    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle longer than `ttl` with no flow in flight.
    ///
    /// Sessions whose lock is currently held are in use and are skipped.
    pub async fn purge_idle(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(s) => s.is_busy() || !s.is_idle_for(ttl, now),
            Err(_) => true,
        });
        before - sessions.len()
    }
}
