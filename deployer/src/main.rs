use clap::{Parser, ValueEnum};
use deployer::{
    DeployResult, DeploymentConfig, DeploymentReport, Environment, Pipeline, DEFAULT_ENV_FILE,
};
use image_builder::{
    detect_runtime, CommandRunner, ContainerRuntime, DryRunRunner, ImageBuildConfig, SystemRunner,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "webui-deploy")]
#[command(about = "Build the open-webui image and replace the running container")]
struct Cli {
    /// Env file to read before deploying; skipped when missing
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,
    /// Build context directory
    #[arg(long, default_value = ".")]
    context: PathBuf,
    /// Container runtime to use
    #[arg(long, value_enum, default_value_t = RuntimeChoice::Auto)]
    runtime: RuntimeChoice,
    /// Print the commands instead of running them
    #[arg(long)]
    dry_run: bool,
    /// Print the deployment report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuntimeChoice {
    Auto,
    Docker,
    Podman,
}

fn resolve_runtime(choice: RuntimeChoice, dry_run: bool) -> ContainerRuntime {
    match choice {
        RuntimeChoice::Docker => ContainerRuntime::Docker,
        RuntimeChoice::Podman => ContainerRuntime::Podman,
        RuntimeChoice::Auto if dry_run => ContainerRuntime::Docker,
        RuntimeChoice::Auto => detect_runtime(),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let report = match deploy(&cli) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "deployment failed");
            return ExitCode::from(e.exit_code());
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!(error = %e, "failed to serialize report");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&report);
    }

    ExitCode::SUCCESS
}

fn deploy(cli: &Cli) -> DeployResult<DeploymentReport> {
    let env = Environment::load(&cli.env_file)?;
    let deployment = DeploymentConfig::from_environment(&env);
    let image = ImageBuildConfig::new(deployment.image_name.as_str()).with_context(&cli.context);

    let runtime = resolve_runtime(cli.runtime, cli.dry_run);
    info!(runtime = %runtime, dry_run = cli.dry_run, "deploying {}", deployment.container_name);

    // With --json, stdout carries only the report.
    let dry_run_out: Box<dyn Write> = if cli.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let dry_run = DryRunRunner::new(dry_run_out);
    let system = SystemRunner::new().with_stdout_to_stderr(cli.json);
    let runner: &dyn CommandRunner = if cli.dry_run { &dry_run } else { &system };

    Pipeline::new(runner, runtime, image, deployment).run()
}

fn print_summary(report: &DeploymentReport) {
    for record in report.ignored() {
        warn!(step = %record.step, "completed with ignored failure");
    }

    println!("✓ {} is running at {}", report.container.name, report.container.url);
}
