//! CLI subcommands: init, validate, graph, render, plan, apply, destroy,
//! status, drift, credentials, schema, completions.

use crate::backend::simulated::SimulatedCloud;
use crate::backend::ProvisioningBackend;
use crate::core::{codegen, executor, parser, planner, resolver, state, topology, types};
use crate::error::{Error, Result};
use crate::tripwire::{drift, eventlog};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

const CLOUD_FILE: &str = "simulated-cloud.json";

#[derive(Parser, Debug)]
#[command(
    name = "webstack",
    version,
    about = "Declarative webserver stack: network, rule sets, instance and database, planned and applied from one stack.yaml"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the stack definition comes from.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Path to stack.yaml
    #[arg(short, long, default_value = "stack.yaml")]
    pub file: PathBuf,

    /// Override a template parameter (KEY=VALUE, repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

/// Where state and the simulated provider live.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// State directory
    #[arg(long, default_value = "state")]
    pub state_dir: PathBuf,

    /// Simulated cloud file (default: <state-dir>/simulated-cloud.json)
    #[arg(long)]
    pub cloud: Option<PathBuf>,
}

impl StateArgs {
    fn cloud_path(&self) -> PathBuf {
        self.cloud
            .clone()
            .unwrap_or_else(|| self.state_dir.join(CLOUD_FILE))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stack project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate stack.yaml and the topology it builds
    Validate {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Show resources in dependency order
    Graph {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Print the ordered request manifest as JSON
    Render {
        #[command(flatten)]
        stack: StackArgs,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show execution plan (diff desired vs current)
    Plan {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Create or update the stack's resources
    Apply {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,

        /// Target specific resource
        #[arg(short, long)]
        resource: Option<String>,

        /// Force re-apply all resources
        #[arg(long)]
        force: bool,

        /// Show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Tear down every resource recorded in the lock
    Destroy {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,

        /// Show what would be destroyed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current state from lock files
    Status {
        #[command(flatten)]
        state: StateArgs,

        /// Target specific stack
        #[arg(short, long)]
        stack: Option<String>,
    },

    /// Detect changes made outside webstack (tripwire)
    Drift {
        #[command(flatten)]
        state: StateArgs,

        /// Target specific stack
        #[arg(short, long)]
        stack: Option<String>,

        /// Exit non-zero on any drift (for CI/cron)
        #[arg(long)]
        tripwire: bool,
    },

    /// Print the generated database credentials from the secret store
    Credentials {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Print the JSON Schema of stack.yaml
    Schema,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { stack } => cmd_validate(&stack),
        Commands::Graph { stack } => cmd_graph(&stack),
        Commands::Render { stack, output } => cmd_render(&stack, output.as_deref()),
        Commands::Plan { stack, state } => cmd_plan(&stack, &state),
        Commands::Apply {
            stack,
            state,
            resource,
            force,
            dry_run,
        } => cmd_apply(&stack, &state, resource.as_deref(), force, dry_run),
        Commands::Destroy {
            stack,
            state,
            dry_run,
        } => cmd_destroy(&stack, &state, dry_run),
        Commands::Status { state, stack } => cmd_status(&state.state_dir, stack.as_deref()),
        Commands::Drift {
            state,
            stack,
            tripwire,
        } => cmd_drift(&state, stack.as_deref(), tripwire),
        Commands::Credentials { stack, state } => cmd_credentials(&stack, &state),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "webstack", &mut std::io::stdout());
            Ok(())
        }
    }
}

const INIT_TEMPLATE: &str = r#"version: "1.0"
stack: webserver-stack
prefix: webserver
region: us-east-1
description: "Webserver with a private MySQL database"

params:
  ssh_key: "<your ssh key>"

network:
  cidr: 10.0.0.0/16
  max_azs: 2
  subnet_mask: 24
  nat_gateways: 0

webserver:
  instance_type: t2.micro
  images:
    us-east-1: ami-083654bd07b5da81d
  key_name: "{{params.ssh_key}}"

database:
  engine: mysql
  instance_type: t3.micro
  port: 3306
  allocated_storage_gb: 8
  username: admin
  deletion_protection: false

policy:
  tripwire: true
  lock_file: true
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join("stack.yaml");
    if config_path.exists() {
        return Err(Error::State(format!(
            "{} already exists",
            config_path.display()
        )));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| Error::io(format!("cannot create {}", state_dir.display()), e))?;
    std::fs::write(&config_path, INIT_TEMPLATE)
        .map_err(|e| Error::io(format!("cannot write {}", config_path.display()), e))?;

    println!("Initialized webstack project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    println!("  Next: webstack apply --param ssh_key=<key pair name>");
    Ok(())
}

/// Parse, apply `--param` overrides, resolve, validate, build.
fn load_stack(args: &StackArgs) -> Result<(types::StackConfig, types::Topology)> {
    let mut config = parser::parse_config_file(&args.file)?;
    resolver::apply_param_overrides(&mut config, &args.params)?;
    topology::load_topology(&config)
}

fn cmd_validate(args: &StackArgs) -> Result<()> {
    let (config, topology) = load_stack(args)?;
    executor::check_invariants(&topology)?;
    resolver::build_execution_order(&topology)?;
    println!(
        "OK: {} ({} resources, prefix '{}', region {})",
        config.stack,
        topology.resources.len(),
        config.prefix,
        config.region
    );
    Ok(())
}

fn cmd_graph(args: &StackArgs) -> Result<()> {
    let (_, topology) = load_stack(args)?;
    let order = resolver::build_execution_order(&topology)?;
    println!("{} ({} resources):", topology.stack, order.len());
    for (i, id) in order.iter().enumerate() {
        let Some(resource) = topology.get(id) else {
            continue;
        };
        let deps = resource.spec.references();
        if deps.is_empty() {
            println!("  {}. {} [{}]", i + 1, id, resource.kind());
        } else {
            println!(
                "  {}. {} [{}] <- {}",
                i + 1,
                id,
                resource.kind(),
                deps.join(", ")
            );
        }
    }
    Ok(())
}

fn cmd_render(args: &StackArgs, output: Option<&Path>) -> Result<()> {
    let (_, topology) = load_stack(args)?;
    executor::check_invariants(&topology)?;
    let order = resolver::build_execution_order(&topology)?;
    let manifest = codegen::render_manifest(&topology, &order);
    let json = serde_json::to_string_pretty(&manifest)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .map_err(|e| Error::io(format!("cannot write {}", path.display()), e))?;
            println!("Wrote {} requests to {}", order.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Plan a topology against the lock in `state_dir`.
fn plan_stack(topology: &types::Topology, state_dir: &Path) -> Result<types::ExecutionPlan> {
    executor::check_invariants(topology)?;
    let order = resolver::build_execution_order(topology)?;
    let lock = state::load_lock(state_dir, &topology.stack)?;
    Ok(planner::plan(topology, &order, lock.as_ref()))
}

fn cmd_plan(args: &StackArgs, state_args: &StateArgs) -> Result<()> {
    let (_, topology) = load_stack(args)?;
    print_plan(&plan_stack(&topology, &state_args.state_dir)?);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::ExecutionPlan) {
    println!("Planning: {} ({} resources)", plan.name, plan.changes.len());
    println!();

    for change in &plan.changes {
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_apply(
    args: &StackArgs,
    state_args: &StateArgs,
    resource_filter: Option<&str>,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let (config, topology) = load_stack(args)?;
    let cloud_path = state_args.cloud_path();
    let mut cloud = SimulatedCloud::load(&cloud_path)?;

    let cfg = executor::ApplyConfig {
        config: &config,
        topology: &topology,
        state_dir: &state_args.state_dir,
        force,
        dry_run,
        resource_filter,
    };

    let outcome = executor::apply(&cfg, &mut cloud);
    if dry_run {
        outcome?;
        print_plan(&plan_stack(&topology, &state_args.state_dir)?);
        println!();
        println!("Dry run: no changes applied.");
        return Ok(());
    }
    // Whatever the backend created must survive a failed run.
    cloud.save(&cloud_path)?;
    let result = outcome?;

    println!(
        "{}: {} converged, {} unchanged, {} destroyed ({:.1}s)",
        result.stack,
        result.resources_converged,
        result.resources_unchanged,
        result.resources_destroyed,
        result.total_duration.as_secs_f64()
    );
    println!();
    println!(
        "Apply complete: {} converged, {} unchanged.",
        result.resources_converged, result.resources_unchanged
    );
    Ok(())
}

fn cmd_destroy(args: &StackArgs, state_args: &StateArgs, dry_run: bool) -> Result<()> {
    let config = parser::parse_config_file(&args.file)?;
    let cloud_path = state_args.cloud_path();
    let mut cloud = SimulatedCloud::load(&cloud_path)?;

    if dry_run {
        match state::load_lock(&state_args.state_dir, &config.stack)? {
            Some(lock) => {
                for id in executor::destroy_order(&lock) {
                    println!("  - {}", id);
                }
            }
            None => println!("No state found for {}.", config.stack),
        }
        return Ok(());
    }

    let cfg = executor::DestroyConfig {
        stack: &config.stack,
        state_dir: &state_args.state_dir,
        tripwire: config.policy.tripwire,
        dry_run: false,
    };
    let outcome = executor::destroy(&cfg, &mut cloud);
    cloud.save(&cloud_path)?;
    let result = outcome?;
    println!(
        "Destroy complete: {} resource(s) removed from {}.",
        result.resources_destroyed, result.stack
    );
    Ok(())
}

/// Stacks with a lock file under `state_dir`, optionally just one.
fn locked_stacks(state_dir: &Path, filter: Option<&str>) -> Result<Vec<types::StackLock>> {
    let mut locks = Vec::new();
    if !state_dir.exists() {
        return Ok(locks);
    }
    let entries = std::fs::read_dir(state_dir)
        .map_err(|e| Error::io(format!("cannot read state dir {}", state_dir.display()), e))?;
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| filter.map_or(true, |f| f == name.as_str()))
        .collect();
    names.sort();
    for name in names {
        if let Some(lock) = state::load_lock(state_dir, &name)? {
            locks.push(lock);
        }
    }
    Ok(locks)
}

fn cmd_status(state_dir: &Path, stack_filter: Option<&str>) -> Result<()> {
    let locks = locked_stacks(state_dir, stack_filter)?;
    if locks.is_empty() {
        println!("No state found. Run `webstack apply` first.");
        return Ok(());
    }

    for lock in &locks {
        println!("Stack: {} (prefix {}, {})", lock.stack, lock.prefix, lock.region);
        println!("  Backend:   {}", lock.backend);
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        println!("  Resources: {}", lock.resources.len());

        for (id, rl) in &lock.resources {
            let duration = rl
                .duration_seconds
                .map(|d| format!(" ({:.2}s)", d))
                .unwrap_or_default();
            let physical = rl.physical_id.as_deref().unwrap_or("-");
            println!(
                "    {}: {} [{}] {}{}",
                id, rl.status, rl.resource_type, physical, duration
            );
            for (key, value) in &rl.outputs {
                println!("      {} = {}", key, value);
            }
        }
        println!();
    }
    Ok(())
}

fn cmd_drift(state_args: &StateArgs, stack_filter: Option<&str>, tripwire_mode: bool) -> Result<()> {
    let cloud = SimulatedCloud::load(&state_args.cloud_path())?;
    let state_dir = &state_args.state_dir;
    let mut total_drift = 0;

    for mut lock in locked_stacks(state_dir, stack_filter)? {
        println!(
            "Checking {} ({} resources)...",
            lock.stack,
            lock.resources.len()
        );
        let findings = drift::detect_drift(&lock, &cloud)?;

        if findings.is_empty() {
            println!("  No drift detected.");
            continue;
        }
        for f in &findings {
            println!("  DRIFTED: {} ({})", f.resource_id, f.detail);
            println!("    Expected: {}", f.expected_hash);
            println!("    Actual:   {}", f.actual_hash);
            eventlog::append_event(
                state_dir,
                &lock.stack,
                types::ProvenanceEvent::DriftDetected {
                    stack: lock.stack.clone(),
                    resource: f.resource_id.clone(),
                    expected_hash: f.expected_hash.clone(),
                    actual_hash: f.actual_hash.clone(),
                },
            )?;
        }
        drift::mark_drifted(&mut lock, &findings);
        state::save_lock(state_dir, &lock)?;
        total_drift += findings.len();
    }

    if total_drift > 0 {
        println!();
        println!("Drift detected: {} resource(s)", total_drift);
        if tripwire_mode {
            return Err(Error::Drift(total_drift));
        }
    } else {
        println!("No drift detected.");
    }
    Ok(())
}

fn cmd_credentials(args: &StackArgs, state_args: &StateArgs) -> Result<()> {
    let config = parser::parse_config_file(&args.file)?;
    let names = topology::ResourceNames::new(&config.prefix);
    let lock = state::load_lock(&state_args.state_dir, &config.stack)?
        .ok_or_else(|| Error::State(format!("no state for stack '{}'", config.stack)))?;
    let secret_id = lock
        .resources
        .get(&names.db_credentials)
        .and_then(|rl| rl.physical_id.clone())
        .ok_or_else(|| Error::State(format!("{} has not been created", names.db_credentials)))?;

    let cloud = SimulatedCloud::load(&state_args.cloud_path())?;
    let creds = cloud
        .secrets()
        .fetch(&secret_id)
        .map_err(|source| Error::Backend {
            resource: names.db_credentials.clone(),
            source,
        })?
        .ok_or_else(|| Error::State(format!("secret {} is missing from the store", secret_id)))?;

    println!("secret:   {}", secret_id);
    println!("username: {}", creds.username);
    println!("password: {}", creds.password);
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(types::StackConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
