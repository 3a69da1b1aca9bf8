//! Prepare command handler
//!
//! Materialises one fixture for one planned run: copy, capture hook,
//! mutation, entry point. The execution backend takes it from there.

use crate::commands::PrepareArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::Reporter;
use serde::Serialize;
use stateprobe::{next_run_dir, FixtureHandle, HarnessConfig, Mutation, Seed, TokenGenerator};
use std::path::PathBuf;

/// What to prepare
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    /// Fixture name
    pub fixture: String,
    /// Mutation id from the fixture's plan
    pub mutation: String,
    /// Destination of the mutable copy
    pub dest: PathBuf,
    /// Capture hook copied into the fixture
    pub instrumentation: PathBuf,
    /// Arguments passed to the capture hook
    pub capture_args: String,
    /// Token seed
    pub seed: u64,
    /// Output tree, if a run directory should be allocated
    pub output: Option<PathBuf>,
}

/// Summary of a prepared fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedFixture {
    /// Fixture name
    pub fixture: String,
    /// Applied mutation id
    pub mutation: String,
    /// Handle instance id
    pub instance: String,
    /// The mutable copy
    pub copy: PathBuf,
    /// Edits made by the capture hook
    pub capture_edits: usize,
    /// Edits made by the mutation
    pub edits: usize,
    /// Entry point written next to the copy
    pub entry_point: Option<PathBuf>,
    /// Where the backend mounts the copy
    pub mount: &'static str,
    /// Command the backend runs
    pub command: String,
    /// Run directory the backend fills with `logs.txt` and `snapshots/`
    pub run_dir: Option<PathBuf>,
}

/// Prepare one planned run
pub fn prepare_fixture(
    harness: &HarnessConfig,
    request: &PrepareRequest,
) -> CliResult<PreparedFixture> {
    let fixture = harness.fixture(&request.fixture)?;
    let plan = harness.plan_for(fixture)?;
    let mutation = plan.find(&request.mutation).ok_or_else(|| {
        CliError::invalid_argument(format!(
            "mutation '{}' is not planned for fixture '{}'",
            request.mutation, request.fixture
        ))
    })?;

    let mut handle: FixtureHandle = fixture.handle();
    handle.copy_to(&request.dest)?;
    let mut tokens = TokenGenerator::new(Seed::from_u64(request.seed));

    let capture = Mutation::capture_with_settings(
        &request.instrumentation,
        request.capture_args.clone(),
        harness.capture.clone(),
    )
    .apply(&mut handle, &mut tokens)?;
    let report = mutation.apply(&mut handle, &mut tokens)?;
    let entry_point = handle.write_entry_point()?;

    let run_dir = match &request.output {
        Some(output) => Some(next_run_dir(&output.join(&fixture.name), mutation.id())?),
        None => None,
    };

    Ok(PreparedFixture {
        fixture: fixture.name.clone(),
        mutation: mutation.id().to_string(),
        instance: handle.instance_id().to_string(),
        copy: request.dest.clone(),
        capture_edits: capture.edits,
        edits: report.edits,
        entry_point,
        mount: FixtureHandle::mount_point(),
        command: handle.invocation_command(),
        run_dir,
    })
}

/// Execute the prepare command
pub fn execute_prepare(config: &CliConfig, args: &PrepareArgs) -> CliResult<()> {
    let harness = HarnessConfig::load(&args.config)?;
    let instrumentation = match &args.instrumentation {
        Some(path) => path.clone(),
        None => std::env::current_exe()?,
    };
    let request = PrepareRequest {
        fixture: args.fixture.clone(),
        mutation: args.mutation.clone(),
        dest: args.dest.clone(),
        instrumentation,
        capture_args: args.capture_args.clone(),
        seed: args.seed.unwrap_or(harness.seed).wrapping_add(args.repetition),
        output: args.output.clone(),
    };
    let prepared = prepare_fixture(&harness, &request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&prepared)?);
        return Ok(());
    }
    let reporter = Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
    reporter.heading(&format!("{} / {}", prepared.fixture, prepared.mutation));
    reporter.field("copy:", &prepared.copy.display().to_string());
    reporter.field("edits:", &prepared.edits.to_string());
    if let Some(entry) = &prepared.entry_point {
        reporter.field("entry point:", &entry.display().to_string());
    }
    reporter.field("mount at:", prepared.mount);
    reporter.field("command:", &prepared.command);
    if let Some(run_dir) = &prepared.run_dir {
        reporter.field("run dir:", &run_dir.display().to_string());
    }
    Ok(())
}
