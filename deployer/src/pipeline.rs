//! Ordered deployment steps and their failure policy.
//!
//! ```text
//! build ──> stop ──> remove ──> run ──> prune
//! fatal     best     best       fatal   best
//!           effort   effort             effort
//! ```
//!
//! A fatal step that fails ends the deployment immediately. A best-effort
//! step that fails is recorded as ignored and the next step runs.

use crate::config::DeploymentConfig;
use crate::container::{
    remove_container, run_container, stop_container, ContainerError, DeployedContainer,
};
use crate::env_file::EnvFileError;
use image_builder::{
    build_image, prune_dangling_images, CommandRunner, ContainerRuntime, ImageBuildConfig,
    ImageBuilderError,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort a deployment
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    #[error("No container runtime available. Please install Docker or Podman.")]
    NoRuntimeAvailable,

    #[error(transparent)]
    Image(#[from] ImageBuilderError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl DeployError {
    /// Process exit code for this failure: the failing command's own code
    /// when it has a usable one, otherwise 1.
    pub fn exit_code(&self) -> u8 {
        let code = match self {
            DeployError::Image(e) => e.exit_code(),
            DeployError::Container(e) => e.exit_code(),
            _ => None,
        };

        code.and_then(|c| u8::try_from(c).ok())
            .filter(|c| *c != 0)
            .unwrap_or(1)
    }
}

pub type DeployResult<T> = Result<T, DeployError>;

/// What happens to the deployment when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort with the step's error
    Fatal,
    /// Record the failure and carry on
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    BuildImage,
    StopContainer,
    RemoveContainer,
    RunContainer,
    PruneImages,
}

impl Step {
    /// Every step, in execution order
    pub const ALL: [Step; 5] = [
        Step::BuildImage,
        Step::StopContainer,
        Step::RemoveContainer,
        Step::RunContainer,
        Step::PruneImages,
    ];

    pub fn policy(&self) -> FailurePolicy {
        match self {
            Step::BuildImage | Step::RunContainer => FailurePolicy::Fatal,
            Step::StopContainer | Step::RemoveContainer | Step::PruneImages => {
                FailurePolicy::BestEffort
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::BuildImage => "build image",
            Step::StopContainer => "stop container",
            Step::RemoveContainer => "remove container",
            Step::RunContainer => "run container",
            Step::PruneImages => "prune images",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Ignored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub policy: FailurePolicy,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Summary of a completed deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    pub runtime: String,
    pub container: DeployedContainer,
    pub steps: Vec<StepRecord>,
}

impl DeploymentReport {
    /// Best-effort steps whose failure was ignored
    pub fn ignored(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Ignored { .. }))
    }
}

/// Runs the deployment steps strictly one after another
pub struct Pipeline<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    runtime: ContainerRuntime,
    image: ImageBuildConfig,
    deployment: DeploymentConfig,
}

impl<'a, R: CommandRunner + ?Sized> Pipeline<'a, R> {
    pub fn new(
        runner: &'a R,
        runtime: ContainerRuntime,
        image: ImageBuildConfig,
        deployment: DeploymentConfig,
    ) -> Self {
        Self {
            runner,
            runtime,
            image,
            deployment,
        }
    }

    pub fn run(&self) -> DeployResult<DeploymentReport> {
        if !self.runtime.is_available() {
            return Err(DeployError::NoRuntimeAvailable);
        }

        let mut steps = Vec::with_capacity(Step::ALL.len());

        for step in Step::ALL {
            info!(step = %step, "running step");

            let outcome = match self.execute(step) {
                Ok(()) => StepOutcome::Succeeded,
                Err(e) if step.policy() == FailurePolicy::BestEffort => {
                    warn!(step = %step, error = %e, "ignoring failure");
                    StepOutcome::Ignored {
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            };

            steps.push(StepRecord {
                step,
                policy: step.policy(),
                outcome,
            });
        }

        Ok(DeploymentReport {
            runtime: self.runtime.to_string(),
            container: DeployedContainer::from(&self.deployment),
            steps,
        })
    }

    fn execute(&self, step: Step) -> DeployResult<()> {
        let name = self.deployment.container_name.as_str();

        match step {
            Step::BuildImage => build_image(self.runner, self.runtime, &self.image)?,
            Step::StopContainer => stop_container(self.runner, self.runtime, name)?,
            Step::RemoveContainer => remove_container(self.runner, self.runtime, name)?,
            Step::RunContainer => {
                run_container(self.runner, self.runtime, &self.deployment)?;
            }
            Step::PruneImages => prune_dangling_images(self.runner, self.runtime)?,
        }

        Ok(())
    }
}
