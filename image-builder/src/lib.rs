//! Container image building utilities for webui-deploy
//!
//! This crate wraps the container runtime CLI for the image side of a
//! deployment: building the application image from a local build context and
//! pruning the dangling layers a rebuild leaves behind.

pub mod runtime;

use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

pub use runtime::{
    detect_runtime, CommandRunner, CommandStatus, ContainerRuntime, DryRunRunner, Invocation,
    OutputMode, SystemRunner,
};

/// Errors related to image building
#[derive(Error, Debug)]
pub enum ImageBuilderError {
    #[error("Build of image '{image}' failed: {reason}")]
    BuildFailed {
        image: String,
        reason: String,
        code: Option<i32>,
    },
    #[error("Pruning dangling images failed: {0}")]
    PruneFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageBuilderError {
    /// Exit code reported by the runtime, when there was one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ImageBuilderError::BuildFailed { code, .. } => *code,
            _ => None,
        }
    }
}

pub type ImageBuilderResult<T> = Result<T, ImageBuilderError>;

/// Configuration for building a container image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildConfig {
    /// Tag given to the built image
    pub image_name: String,
    /// Build context directory
    pub context_path: PathBuf,
}

impl Default for ImageBuildConfig {
    fn default() -> Self {
        Self {
            image_name: "open-webui".to_string(),
            context_path: PathBuf::from("."),
        }
    }
}

impl ImageBuildConfig {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context_path: impl Into<PathBuf>) -> Self {
        self.context_path = context_path.into();
        self
    }

    /// `<runtime> build -t <image> <context>`
    pub fn invocation(&self, runtime: ContainerRuntime) -> Invocation {
        runtime
            .invocation(["build", "-t", self.image_name.as_str()])
            .arg(self.context_path.display().to_string())
    }
}

/// Build the image. Any non-zero exit is an error; the build log streams
/// to the terminal.
///
/// The caller picks an available runtime; `ContainerRuntime::None` surfaces
/// as a spawn error.
pub fn build_image<R: CommandRunner + ?Sized>(
    runner: &R,
    runtime: ContainerRuntime,
    config: &ImageBuildConfig,
) -> ImageBuilderResult<()> {
    info!(image = %config.image_name, context = %config.context_path.display(), "building image");
    let status = runner.run(&config.invocation(runtime))?;

    if !status.is_success() {
        return Err(ImageBuilderError::BuildFailed {
            image: config.image_name.clone(),
            reason: status.describe(),
            code: status.code,
        });
    }

    info!(image = %config.image_name, "image built");
    Ok(())
}

/// `<runtime> image prune -f`
pub fn prune_invocation(runtime: ContainerRuntime) -> Invocation {
    runtime.invocation(["image", "prune", "-f"]).captured()
}

/// Remove dangling (untagged) images
pub fn prune_dangling_images<R: CommandRunner + ?Sized>(
    runner: &R,
    runtime: ContainerRuntime,
) -> ImageBuilderResult<()> {
    let status = runner.run(&prune_invocation(runtime))?;
    if !status.is_success() {
        warn!(reason = %status.describe(), "image prune failed");
        return Err(ImageBuilderError::PruneFailed(status.describe()));
    }

    info!("dangling images pruned");
    Ok(())
}
