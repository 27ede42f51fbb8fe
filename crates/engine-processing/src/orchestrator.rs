use crate::{
    error::StepError,
    step::{ObjectStep, StepReport},
};
use engine_core::context::JobContext;
use model::job::Status;
use tracing::info;

/// What happened to each object of a job run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<StepReport>,
    pub failed: Vec<String>,
}

/// Runs `steps` one after another. A failing step marks its object FAILED,
/// records the error in the detail log and lets the next object start.
/// Invariant violations stop the run.
pub async fn run_steps(ctx: &JobContext, steps: Vec<ObjectStep>) -> Result<RunReport, StepError> {
    let mut report = RunReport::default();
    let total = steps.len();

    for (idx, step) in steps.into_iter().enumerate() {
        info!(
            object = %step.object(),
            kind = %step.kind(),
            "Processing object {}/{}",
            idx + 1,
            total
        );

        match step.run().await {
            Ok(step_report) => report.completed.push(step_report),
            Err(e) if e.is_invariant_violation() => return Err(e),
            Err(e) => {
                ctx.details.exception(&e, Some(step.object())).await?;
                ctx.state
                    .set_object_status(step.object(), Status::Failed)
                    .await?;
                report.failed.push(step.object().to_string());
            }
        }
    }

    info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        "All objects processed"
    );
    Ok(report)
}
