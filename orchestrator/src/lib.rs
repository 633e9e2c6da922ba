pub mod collect;
pub mod config;
pub mod container;
pub mod pipeline;
pub mod runner;
pub mod steps;
pub mod store;

pub use collect::{
    collect, missing_required_env, parse_analysis_date, process_project, AnalysisRecord,
    CollectError, CollectResult, ProjectRef,
};
pub use config::{
    mask_token, CliOverrides, ConfigError, ConfigResult, EnvSource, FailurePolicy,
    PipelineConfig, PipelineFile, ProcessEnv, ScannerSettings, Variant, VariantDefaults,
};
pub use container::{
    detect_runtime, forwarded_env, run_pipeline_container, verify_image_exists, ContainerError,
    ContainerResult, ContainerRunConfig, ContainerRuntime,
};
pub use pipeline::{
    Pipeline, PipelineError, PipelineReport, PipelineResult, StepOutcome, StepStatus,
};
pub use runner::{CommandRunner, SystemRunner, SPAWN_FAILURE_EXIT_CODE};
pub use steps::{
    pipeline_steps, CommandSpec, Step, StepAction, SCANNER_FALLBACK_MESSAGE, TESTS_PASSED_MESSAGE,
};
pub use store::{DbSettings, ResultStore, StoreError, StoreResult};
