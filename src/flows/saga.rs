//! Step log for multi-system writes.
//!
//! Staff mutations touch the identity provider, the role store and the REST backend with no
//! shared transaction. Each mutation runs as a [`Saga`]: named steps executed strictly in
//! order, every outcome recorded. Nothing is rolled back; the log is what an operator uses
//! to reconcile a partial failure by hand.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    ProvisionAccount,
    IssueToken,
    WriteRoleRecord,
    SignOutProvisioner,
    RegisterStaff,
    LookupRoleRecord,
    UpdateStaff,
    DeleteIdentityAccount,
    DeleteRoleRecord,
    DeleteStaff,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::ProvisionAccount => "provision_account",
            SagaStep::IssueToken => "issue_token",
            SagaStep::WriteRoleRecord => "write_role_record",
            SagaStep::SignOutProvisioner => "sign_out_provisioner",
            SagaStep::RegisterStaff => "register_staff",
            SagaStep::LookupRoleRecord => "lookup_role_record",
            SagaStep::UpdateStaff => "update_staff",
            SagaStep::DeleteIdentityAccount => "delete_identity_account",
            SagaStep::DeleteRoleRecord => "delete_role_record",
            SagaStep::DeleteStaff => "delete_staff",
        }
    }

    /// Steps whose effect outlives a later failure.
    pub fn is_write(&self) -> bool {
        !matches!(self, SagaStep::IssueToken | SagaStep::LookupRoleRecord | SagaStep::SignOutProvisioner)
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaKind {
    CreateStaff,
    UpdateStaff,
    DeleteStaff,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaKind::CreateStaff => "create_staff",
            SagaKind::UpdateStaff => "update_staff",
            SagaKind::DeleteStaff => "delete_staff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Committed,
    /// Failed, but the saga carried on.
    Skipped { reason: String },
    /// Failed and aborted the saga.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: SagaStep,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SagaLog {
    pub kind: SagaKind,
    /// Email of the staff account the saga acted on.
    pub subject: String,
    pub steps: Vec<StepRecord>,
    pub completed: bool,
}

impl SagaLog {
    pub fn committed(&self) -> Vec<SagaStep> {
        self.steps.iter().filter(|r| r.outcome == StepOutcome::Committed).map(|r| r.step).collect()
    }

    pub fn skipped(&self) -> Vec<SagaStep> {
        self.steps.iter().filter(|r| matches!(r.outcome, StepOutcome::Skipped { .. })).map(|r| r.step).collect()
    }

    pub fn failed_step(&self) -> Option<SagaStep> {
        self.steps.iter().find(|r| matches!(r.outcome, StepOutcome::Failed { .. })).map(|r| r.step)
    }

    pub fn has_committed(&self, step: SagaStep) -> bool { self.committed().contains(&step) }

    /// Committed writes left behind by an aborted saga.
    pub fn dangling_writes(&self) -> Vec<SagaStep> {
        if self.completed {
            return Vec::new();
        }
        self.committed().into_iter().filter(SagaStep::is_write).collect()
    }

    pub fn summary(&self) -> String {
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|r| match &r.outcome {
                StepOutcome::Committed => format!("{}=ok", r.step),
                StepOutcome::Skipped { .. } => format!("{}=skipped", r.step),
                StepOutcome::Failed { .. } => format!("{}=failed", r.step),
            })
            .collect();
        format!("{} {} [{}]", self.kind.as_str(), self.subject, steps.join(", "))
    }
}

#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct SagaFailure {
    pub log: SagaLog,
    pub error: AppError,
}

pub struct Saga {
    log: SagaLog,
    aborted: bool,
}

impl Saga {
    pub fn begin(kind: SagaKind, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        info!(target: "ispdesk::saga", "begin {} subject={}", kind.as_str(), subject);
        Self { log: SagaLog { kind, subject, steps: Vec::new(), completed: false }, aborted: false }
    }

    /// Run a required step. On failure the step is logged as the aborting one and the error
    /// is returned; the caller stops there.
    pub async fn run<T, F>(&mut self, step: SagaStep, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match fut.await {
            Ok(v) => {
                info!(target: "ispdesk::saga", "{} {} committed", self.log.kind.as_str(), step);
                self.record(step, StepOutcome::Committed);
                Ok(v)
            }
            Err(e) => {
                error!(target: "ispdesk::saga", "{} {} failed: {}", self.log.kind.as_str(), step, e);
                self.record(step, StepOutcome::Failed { reason: e.to_string() });
                self.aborted = true;
                Err(e)
            }
        }
    }

    /// Run a step whose failure is logged and otherwise ignored.
    pub async fn best_effort<T, F>(&mut self, step: SagaStep, fut: F) -> Option<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match fut.await {
            Ok(v) => {
                info!(target: "ispdesk::saga", "{} {} committed", self.log.kind.as_str(), step);
                self.record(step, StepOutcome::Committed);
                Some(v)
            }
            Err(e) => {
                warn!(target: "ispdesk::saga", "{} {} skipped: {}", self.log.kind.as_str(), step, e);
                self.record(step, StepOutcome::Skipped { reason: e.to_string() });
                None
            }
        }
    }

    pub fn log(&self) -> &SagaLog { &self.log }

    /// Close the saga. A successful result marks the log complete; a failure wraps the error
    /// with the log and reports what was left committed.
    pub fn finish<T>(mut self, result: AppResult<T>) -> Result<(T, SagaLog), SagaFailure> {
        match result {
            Ok(v) if !self.aborted => {
                self.log.completed = true;
                info!(target: "ispdesk::saga", "completed {}", self.log.summary());
                Ok((v, self.log))
            }
            Ok(_) => {
                let error = AppError::internal("saga_aborted", "A required step failed");
                Err(self.fail(error))
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn fail(self, error: AppError) -> SagaFailure {
        let dangling: Vec<&str> = self.log.dangling_writes().iter().map(SagaStep::as_str).collect();
        error!(
            target: "ispdesk::saga",
            "aborted {} left_committed=[{}]",
            self.log.summary(),
            dangling.join(", ")
        );
        SagaFailure { log: self.log, error }
    }

    fn record(&mut self, step: SagaStep, outcome: StepOutcome) { self.log.steps.push(StepRecord { step, outcome }); }
}
