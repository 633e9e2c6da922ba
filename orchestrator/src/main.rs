use clap::{Parser, Subcommand};
use image_builder::{build_image, stage_entrypoint, ImageBuildConfig};
use orchestrator::collect::{self, CollectError, ProjectRef, DEFAULT_PROJECT, ENV_ORGANIZATION};
use orchestrator::config::{
    CliOverrides, FailurePolicy, PipelineConfig, PipelineFile, ProcessEnv, Variant, ENV_TOKEN,
};
use orchestrator::container::{
    detect_runtime, forwarded_env, resolve_entrypoint_binary, run_pipeline_container,
    ContainerError, ContainerRunConfig,
};
use orchestrator::pipeline::Pipeline;
use orchestrator::runner::SystemRunner;
use orchestrator::store::{DbSettings, ResultStore};
use orchestrator::EnvSource;
use sonar_client::{SonarClient, SonarConfig, DEFAULT_SONAR_HOST, METRICS};
use std::io;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Run tests with coverage, then the SonarQube scanner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test + scanner sequence in the current environment
    Run {
        /// Deployment shape; selects defaults and the scanner failure policy
        #[arg(long, value_enum)]
        variant: Option<Variant>,
        /// Pipeline TOML file with tooling overrides
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory holding the test sources (default: current directory)
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Override what a failing scanner does
        #[arg(long, value_enum)]
        on_scanner_failure: Option<FailurePolicy>,
        /// Write a JSON summary of step outcomes to this path
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Build the pipeline image and run it with the SONAR_* variables forwarded
    Container {
        /// Image tag to build and run
        #[arg(long, default_value = image_builder::DEFAULT_IMAGE_TAG)]
        image: String,
        /// Container name
        #[arg(long, default_value = "quality-pipeline")]
        name: String,
        /// Project directory mounted at /app and used as build context
        #[arg(long, default_value = ".")]
        work_dir: PathBuf,
        /// Skip the image build and run an existing image
        #[arg(long)]
        no_build: bool,
        /// Extra pip requirement to bake into the image (repeatable)
        #[arg(long = "requirement")]
        requirements: Vec<String>,
        /// Linux build of orchestrator to install as the image entrypoint
        /// (default: the running executable, Linux hosts only)
        #[arg(long)]
        entrypoint_binary: Option<PathBuf>,
    },
    /// Fetch the latest analysis results from SonarQube / SonarCloud
    Collect {
        /// Project as KEY=OWNER/REPO (repeatable)
        #[arg(long = "project", default_value = DEFAULT_PROJECT)]
        projects: Vec<String>,
        /// Server base URL
        #[arg(long, default_value = DEFAULT_SONAR_HOST)]
        sonar_url: String,
        /// Persist results to PostgreSQL using the DB_* variables
        #[arg(long)]
        store: bool,
    },
    /// Print the resolved pipeline configuration (token masked)
    Config {
        #[arg(long, value_enum)]
        variant: Option<Variant>,
        /// Pipeline TOML file with tooling overrides
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            variant,
            config,
            work_dir,
            on_scanner_failure,
            summary_json,
        } => {
            let overrides = CliOverrides {
                variant,
                work_dir,
                on_scanner_failure,
            };
            run_pipeline(&overrides, config, summary_json)?
        }
        Commands::Container {
            image,
            name,
            work_dir,
            no_build,
            requirements,
            entrypoint_binary,
        } => run_container(image, name, work_dir, no_build, requirements, entrypoint_binary)?,
        Commands::Collect {
            projects,
            sonar_url,
            store,
        } => run_collect(&projects, &sonar_url, store).await?,
        Commands::Config { variant, config } => {
            let pipeline_config = load_config(
                &CliOverrides {
                    variant,
                    ..Default::default()
                },
                config,
            )?;
            show_config(&pipeline_config)?;
            0
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn load_config(
    overrides: &CliOverrides,
    path: Option<PathBuf>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let file = match path {
        Some(path) => PipelineFile::load(&path)?,
        None => PipelineFile::default(),
    };
    Ok(PipelineConfig::build(overrides, &file, &ProcessEnv)?)
}

fn run_pipeline(
    overrides: &CliOverrides,
    config_path: Option<PathBuf>,
    summary_json: Option<PathBuf>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(overrides, config_path)?;
    info!(
        variant = %config.variant,
        work_dir = %config.work_dir.display(),
        "Starting pipeline"
    );

    let pipeline = Pipeline::from_config(&config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = pipeline.run(&SystemRunner, &mut out)?;

    Ok(report.finish(summary_json.as_deref()))
}

fn run_container(
    image: String,
    name: String,
    work_dir: PathBuf,
    no_build: bool,
    requirements: Vec<String>,
    entrypoint_binary: Option<PathBuf>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let runtime = detect_runtime();
    if !runtime.is_available() {
        return Err(ContainerError::NoRuntimeAvailable.into());
    }

    if !no_build {
        let mut build_config = ImageBuildConfig::default()
            .with_tag(image.clone())
            .with_context_dir(work_dir.clone());
        build_config.requirements = requirements;
        let entrypoint = resolve_entrypoint_binary(entrypoint_binary.as_deref())?;
        stage_entrypoint(&build_config, &entrypoint).map_err(ContainerError::from)?;
        println!("Building image {} with {}", image, runtime.command());
        build_image(&build_config, runtime.command()).map_err(ContainerError::from)?;
    }

    let run_config = ContainerRunConfig {
        image,
        container_name: name,
        work_dir,
        env_vars: forwarded_env(&ProcessEnv),
        ..Default::default()
    };
    Ok(run_pipeline_container(&runtime, &run_config)?)
}

async fn run_collect(
    projects: &[String],
    sonar_url: &str,
    store: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env = ProcessEnv;
    let missing = collect::missing_required_env(&env);
    if !missing.is_empty() {
        let err = CollectError::MissingEnv(missing);
        error!("{}", err);
        println!("{}", err);
        println!("Please set these variables in your .env file");
        return Ok(1);
    }

    let projects = projects
        .iter()
        .map(|p| p.parse::<ProjectRef>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut sonar_config = SonarConfig::new()
        .with_base_url(sonar_url)
        .with_token(env.non_empty(ENV_TOKEN).unwrap_or_default());
    if let Some(org) = env.non_empty(ENV_ORGANIZATION) {
        sonar_config = sonar_config.with_organization(org);
    }
    let client = SonarClient::new(sonar_config)?;

    let records = match collect::collect(&client, &projects, METRICS).await {
        Ok(records) => records,
        Err(e) => {
            error!("{}", e);
            println!("ERROR: {}", e);
            return Ok(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&records)?);

    if store {
        if records.is_empty() {
            println!("No SonarQube data to insert");
            return Ok(0);
        }
        let settings = DbSettings::from_env(&env)?;
        let result_store = ResultStore::connect(&settings).await?;
        result_store.setup(METRICS).await?;
        let written = result_store.insert(&records, METRICS).await?;
        result_store.close().await;
        println!("Successfully stored {} SonarQube analysis records", written);
    }

    Ok(0)
}

fn show_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let summary = serde_json::json!({
        "variant": config.variant,
        "settings": config.settings,
        "test_command": config.test_command(),
        "scanner_binary": config.scanner_binary,
        "work_dir": config.work_dir,
        "on_scanner_failure": config.on_scanner_failure,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
