//! One virtual user's pass through a journey.
use crate::http::Transport;
use crate::transaction::{record_consistency, transaction_hook};
use fintech_perf_core::{ConsistencyViolation, JourneyStep, ScenarioSpec, Session, StepError};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Passed,
    /// The chain stopped at `step`; later steps were not sent.
    StepFailed { step: String, error: StepError },
    Inconsistent(ConsistencyViolation),
}

impl IterationOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, IterationOutcome::Passed)
    }
}

/// Run every step of `spec` against a fresh session, then its consistency
/// check. Never panics and never aborts anything but this iteration.
#[instrument(name = "iteration", level = "debug", skip_all, fields(scenario = %spec.name))]
pub async fn run_iteration(transport: &Transport, spec: &ScenarioSpec) -> IterationOutcome {
    let mut session = spec.new_session();

    for step in &spec.steps {
        let res = transaction_hook(&step.name, execute_step(transport, step, &mut session)).await;
        if let Err(error) = res {
            debug!("Step {} failed: {error}", step.name);
            return IterationOutcome::StepFailed {
                step: step.name.clone(),
                error,
            };
        }
    }

    if let Some(check) = &spec.consistency {
        let verdict = check.evaluate(&session);
        record_consistency(verdict.is_ok());
        if let Err(violation) = verdict {
            warn!("Consistency check failed: {violation}");
            return IterationOutcome::Inconsistent(violation);
        }
    }

    IterationOutcome::Passed
}

async fn execute_step(
    transport: &Transport,
    step: &JourneyStep,
    session: &mut Session,
) -> Result<(), StepError> {
    let request = step.render(session)?;
    trace!("{} {}", request.method, request.path);
    let (status, body) = transport.send(&request, step.request_timeout).await?;
    step.validate(status, &body, session)
}
