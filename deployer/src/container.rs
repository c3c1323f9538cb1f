use crate::config::DeploymentConfig;
use image_builder::{CommandRunner, ContainerRuntime, Invocation};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Container operation errors
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Container failed to start
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        name: String,
        reason: String,
        code: Option<i32>,
    },

    /// Stopping the container failed
    #[error("Failed to stop container '{name}': {reason}")]
    StopFailed { name: String, reason: String },

    /// Removing the container failed
    #[error("Failed to remove container '{name}': {reason}")]
    RemoveFailed { name: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Exit code reported by the runtime, when there was one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ContainerError::ContainerStartFailed { code, .. } => *code,
            _ => None,
        }
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// A container started by [`run_container`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedContainer {
    pub name: String,
    pub image: String,
    pub url: String,
}

impl From<&DeploymentConfig> for DeployedContainer {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            name: config.container_name.clone(),
            image: config.image_name.clone(),
            url: config.local_url(),
        }
    }
}

/// `<runtime> stop <name>`
pub fn stop_invocation(runtime: ContainerRuntime, name: &str) -> Invocation {
    runtime.invocation(["stop", name]).captured()
}

/// `<runtime> rm <name>`
pub fn remove_invocation(runtime: ContainerRuntime, name: &str) -> Invocation {
    runtime.invocation(["rm", name]).captured()
}

/// `<runtime> run -d ...` for the configured deployment
pub fn run_invocation(runtime: ContainerRuntime, config: &DeploymentConfig) -> Invocation {
    let (host_port, container_port) = config.port_mapping;

    let mut inv = runtime
        .invocation(["run", "-d"])
        .arg("-p")
        .arg(format!("{}:{}", host_port, container_port));

    for (host, target) in &config.extra_hosts {
        inv = inv.arg(format!("--add-host={}:{}", host, target));
    }

    inv = inv
        .arg("-v")
        .arg(format!("{}:{}", config.volume_name, config.volume_mount))
        .args(["--name", config.container_name.as_str()])
        .args(["--restart", config.restart_policy.as_str()]);

    for (key, value) in &config.env_vars {
        inv = inv.arg("-e").arg(format!("{}={}", key, value));
    }

    inv.arg(config.image_name.as_str())
}

// These helpers do not check runtime availability; `Pipeline::run` rejects
// `ContainerRuntime::None` before any of them is reached.

/// Stop a container by name
pub fn stop_container<R: CommandRunner + ?Sized>(
    runner: &R,
    runtime: ContainerRuntime,
    name: &str,
) -> ContainerResult<()> {
    let status = runner.run(&stop_invocation(runtime, name))?;
    if !status.is_success() {
        return Err(ContainerError::StopFailed {
            name: name.to_string(),
            reason: status.describe(),
        });
    }

    info!(container = name, "container stopped");
    Ok(())
}

/// Remove a stopped container by name
pub fn remove_container<R: CommandRunner + ?Sized>(
    runner: &R,
    runtime: ContainerRuntime,
    name: &str,
) -> ContainerResult<()> {
    let status = runner.run(&remove_invocation(runtime, name))?;
    if !status.is_success() {
        return Err(ContainerError::RemoveFailed {
            name: name.to_string(),
            reason: status.describe(),
        });
    }

    info!(container = name, "container removed");
    Ok(())
}

/// Start the container detached. The runtime's own diagnostics go straight
/// to the terminal.
pub fn run_container<R: CommandRunner + ?Sized>(
    runner: &R,
    runtime: ContainerRuntime,
    config: &DeploymentConfig,
) -> ContainerResult<DeployedContainer> {
    let invocation = run_invocation(runtime, config);
    debug!(command = %invocation.redacted(), "starting container");
    info!(container = %config.container_name, image = %config.image_name, "starting container");

    let status = runner
        .run(&invocation)
        .map_err(|e| ContainerError::ContainerStartFailed {
            name: config.container_name.clone(),
            reason: e.to_string(),
            code: None,
        })?;

    if !status.is_success() {
        return Err(ContainerError::ContainerStartFailed {
            name: config.container_name.clone(),
            reason: status.describe(),
            code: status.code,
        });
    }

    Ok(DeployedContainer::from(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_file::Environment;
    use image_builder::{CommandStatus, OutputMode};
    use std::io;

    struct Fixed(CommandStatus);

    impl CommandRunner for Fixed {
        fn run(&self, _invocation: &Invocation) -> io::Result<CommandStatus> {
            Ok(self.0.clone())
        }
    }

    fn pair_after(inv: &Invocation, flag: &str) -> Option<String> {
        inv.position(flag).and_then(|i| inv.args.get(i + 1).cloned())
    }

    #[test]
    fn test_stop_and_remove_invocations() {
        let stop = stop_invocation(ContainerRuntime::Docker, "open-webui");
        assert_eq!(stop.args, vec!["stop", "open-webui"]);
        assert_eq!(stop.output, OutputMode::Capture);

        let rm = remove_invocation(ContainerRuntime::Podman, "open-webui");
        assert_eq!(rm.program, "podman");
        assert_eq!(rm.args, vec!["rm", "open-webui"]);
    }

    #[test]
    fn test_run_invocation_layout() {
        let config = DeploymentConfig::from_environment(&Environment::new());
        let inv = run_invocation(ContainerRuntime::Docker, &config);

        assert_eq!(&inv.args[..2], ["run", "-d"]);
        assert_eq!(pair_after(&inv, "-p").as_deref(), Some("3000:8080"));
        assert_eq!(pair_after(&inv, "-v").as_deref(), Some("open-webui:/app/backend/data"));
        assert_eq!(pair_after(&inv, "--name").as_deref(), Some("open-webui"));
        assert_eq!(pair_after(&inv, "--restart").as_deref(), Some("always"));
        assert!(inv
            .args
            .contains(&"--add-host=host.docker.internal:host-gateway".to_string()));
        assert_eq!(inv.args.last().map(String::as_str), Some("open-webui"));
        assert_eq!(inv.output, OutputMode::Inherit);
    }

    #[test]
    fn test_run_invocation_env_pairs() {
        let env =
            Environment::from_vars([("OPENAI_API_KEY", "abc"), ("ENABLE_OLLAMA_API", "true")]);
        let config = DeploymentConfig::from_environment(&env);
        let inv = run_invocation(ContainerRuntime::Docker, &config);

        let env_args: Vec<&str> = inv
            .args
            .windows(2)
            .filter(|w| w[0] == "-e")
            .map(|w| w[1].as_str())
            .collect();

        assert_eq!(env_args.len(), 16);
        assert!(env_args.contains(&"OPENAI_API_KEY=abc"));
        assert!(env_args.contains(&"DATABASE_URL="));
        assert_eq!(env_args.last(), Some(&"ENABLE_OLLAMA_API=false"));
        assert!(!env_args.contains(&"ENABLE_OLLAMA_API=true"));
    }

    #[test]
    fn test_stop_failure_is_reported() {
        let runner = Fixed(CommandStatus::failure(1, "Error: No such container: open-webui"));
        let err = stop_container(&runner, ContainerRuntime::Docker, "open-webui").unwrap_err();
        assert!(matches!(err, ContainerError::StopFailed { .. }));
        assert!(err.to_string().contains("No such container"));
    }

    #[test]
    fn test_run_container_success() {
        let runner = Fixed(CommandStatus::success());
        let config = DeploymentConfig::default();
        let deployed = run_container(&runner, ContainerRuntime::Docker, &config).unwrap();
        assert_eq!(deployed.name, "open-webui");
        assert_eq!(deployed.url, "http://localhost:3000");
    }

    #[test]
    fn test_run_container_failure_keeps_exit_code() {
        let runner = Fixed(CommandStatus::failure(125, "port is already allocated"));
        let err = run_container(&runner, ContainerRuntime::Docker, &DeploymentConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(125));
        assert!(err.to_string().contains("port is already allocated"));
    }
}
