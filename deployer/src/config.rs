use crate::env_file::Environment;

pub const APP_NAME: &str = "open-webui";
pub const HOST_PORT: u16 = 3000;
pub const CONTAINER_PORT: u16 = 8080;
pub const DATA_MOUNT_PATH: &str = "/app/backend/data";
pub const GATEWAY_HOST_ALIAS: &str = "host.docker.internal";
pub const RESTART_POLICY: &str = "always";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Variables copied from the orchestrator's environment into the container,
/// in the order they are passed.
pub const FORWARDED_ENV_VARS: &[&str] = &[
    "OPENAI_API_BASE_URL",
    "OPENAI_API_KEY",
    "DATABASE_URL",
    "ENABLE_OAUTH_SIGNUP",
    "OAUTH_CLIENT_ID",
    "OAUTH_CLIENT_SECRET",
    "OPENID_PROVIDER_URL",
    "OAUTH_PROVIDER_NAME",
    "OAUTH_SCOPES",
    "ENABLE_LOGIN_FORM",
    "LANGFUSE_PUBLIC_KEY",
    "LANGFUSE_SECRET_KEY",
    "MCP_ENABLE",
    "VECTOR_DB",
    "PGVECTOR_DB_URL",
];

/// Variables set to a literal value regardless of the environment
pub const FORCED_ENV_VARS: &[(&str, &str)] = &[("ENABLE_OLLAMA_API", "false")];

/// Everything needed to (re)deploy the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub image_name: String,
    pub container_name: String,
    /// Port mapping (host_port, container_port)
    pub port_mapping: (u16, u16),
    pub volume_name: String,
    pub volume_mount: String,
    /// `--add-host` entries as (hostname, target)
    pub extra_hosts: Vec<(String, String)>,
    pub restart_policy: String,
    /// Ordered `-e` bindings passed to the container
    pub env_vars: Vec<(String, String)>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            image_name: APP_NAME.to_string(),
            container_name: APP_NAME.to_string(),
            port_mapping: (HOST_PORT, CONTAINER_PORT),
            volume_name: APP_NAME.to_string(),
            volume_mount: DATA_MOUNT_PATH.to_string(),
            extra_hosts: vec![(GATEWAY_HOST_ALIAS.to_string(), "host-gateway".to_string())],
            restart_policy: RESTART_POLICY.to_string(),
            env_vars: Vec::new(),
        }
    }
}

impl DeploymentConfig {
    /// Fixed deployment with the forwarded variables resolved from `env`.
    /// Unset variables are passed as empty strings; forced variables are
    /// appended last and ignore `env` entirely.
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            env_vars: resolve_env_vars(env),
            ..Self::default()
        }
    }

    pub fn host_port(&self) -> u16 {
        self.port_mapping.0
    }

    /// Where the application is reachable once running
    pub fn local_url(&self) -> String {
        format!("http://localhost:{}", self.host_port())
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env_vars
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn resolve_env_vars(env: &Environment) -> Vec<(String, String)> {
    FORWARDED_ENV_VARS
        .iter()
        .map(|key| (key.to_string(), env.get_or_empty(key).to_string()))
        .chain(
            FORCED_ENV_VARS
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
        .collect()
}
