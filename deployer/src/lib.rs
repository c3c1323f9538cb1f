pub mod config;
pub mod container;
pub mod env_file;
pub mod pipeline;

pub use config::{
    DeploymentConfig, APP_NAME, CONTAINER_PORT, DATA_MOUNT_PATH, DEFAULT_ENV_FILE,
    FORCED_ENV_VARS, FORWARDED_ENV_VARS, GATEWAY_HOST_ALIAS, HOST_PORT, RESTART_POLICY,
};
pub use container::{
    remove_container, run_container, run_invocation, stop_container, ContainerError,
    ContainerResult, DeployedContainer,
};
pub use env_file::{load_env_file, parse_env_file, EnvFileError, EnvFileResult, Environment};
pub use pipeline::{
    DeployError, DeployResult, DeploymentReport, FailurePolicy, Pipeline, Step, StepOutcome,
    StepRecord,
};
