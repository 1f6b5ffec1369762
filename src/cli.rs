//! Command-line surface (§6 "External interfaces"): one subcommand per
//! engine operation, each also reachable as its own thin binary under
//! `src/bin/` with the identical argument set.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::adaptive::{self, builtin};
use crate::calculator::registry;
use crate::case;
use crate::config;
use crate::error::{Error, Result};
use crate::extractor;
use crate::model::{Model, ModelOverrides};
use crate::result_set::ResultSet;
use crate::scheduler::{self, RunOptions};
use crate::shutdown::ShutdownFlag;

#[derive(Parser)]
#[command(name = "fz")]
#[command(about = "Parametric computational study engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover variable references in a template tree.
    Input(InputArgs),
    /// Compile a template tree for one case into an output directory.
    Compile(CompileArgs),
    /// Extract declared output fields from a completed case directory.
    Output(OutputArgs),
    /// Run a full parametric study: expand cases, dispatch, render results.
    Run(RunArgs),
    /// Drive an adaptive sampling algorithm over a ranged variable set.
    Design(DesignArgs),
    /// List configured models, calculators, or algorithms.
    List(ListArgs),
    /// Install a models/calculators/algorithms bundle into `~/.fz/`.
    Install(InstallArgs),
    /// Remove a named entry from `~/.fz/`.
    Uninstall(UninstallArgs),
}

#[derive(clap::Args)]
pub struct ModelFieldOverrides {
    #[arg(long)]
    pub varprefix: Option<String>,
    #[arg(long)]
    pub delim: Option<String>,
    #[arg(long)]
    pub formulaprefix: Option<String>,
    #[arg(long)]
    pub commentline: Option<String>,
    /// `name=command`, repeatable.
    #[arg(long = "output-cmd")]
    pub output_cmd: Vec<String>,
}

impl ModelFieldOverrides {
    fn into_model_overrides(self) -> Result<ModelOverrides> {
        let mut overrides = ModelOverrides { varprefix: self.varprefix, formulaprefix: self.formulaprefix, commentline: self.commentline, ..Default::default() };
        if let Some(delim) = self.delim {
            let (l, r) = delim.split_once(',').ok_or_else(|| {
                Error::ConfigError("--delim expects 'left,right'".to_string())
            })?;
            overrides.delim = Some((l.to_string(), r.to_string()));
        }
        for entry in self.output_cmd {
            let (name, cmd) = entry.split_once('=').ok_or_else(|| {
                Error::ConfigError(format!("--output-cmd expects 'name=command', got '{entry}'"))
            })?;
            overrides.output_cmds.insert(name.to_string(), cmd.to_string());
        }
        Ok(overrides)
    }
}

#[derive(Parser, clap::Args)]
pub struct InputArgs {
    #[arg(short = 'i', long = "input_path")]
    pub input_path: PathBuf,
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,
}

#[derive(Parser, clap::Args)]
pub struct CompileArgs {
    #[arg(short = 'i', long = "input_path")]
    pub input_path: PathBuf,
    #[arg(short = 'v', long = "input_variables")]
    pub input_variables: Option<String>,
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,
    #[arg(short = 'r', long = "results_dir", default_value = "./results")]
    pub results_dir: PathBuf,
    #[command(flatten)]
    pub overrides: ModelFieldOverrides,
}

#[derive(Parser, clap::Args)]
pub struct OutputArgs {
    #[arg(short = 'r', long = "results_dir")]
    pub case_dir: PathBuf,
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,
    #[arg(short = 'f', long = "format", default_value = "table")]
    pub format: String,
}

#[derive(Parser, clap::Args)]
pub struct RunArgs {
    #[arg(short = 'i', long = "input_path")]
    pub input_path: PathBuf,
    #[arg(short = 'v', long = "input_variables")]
    pub input_variables: Option<String>,
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,
    #[arg(short = 'c', long = "calculator")]
    pub calculator: Vec<String>,
    #[arg(short = 'r', long = "results_dir", default_value = "./results")]
    pub results_dir: PathBuf,
    #[arg(short = 'f', long = "format", default_value = "table")]
    pub format: String,
    #[command(flatten)]
    pub overrides: ModelFieldOverrides,
}

#[derive(Parser, clap::Args)]
pub struct DesignArgs {
    #[arg(short = 'i', long = "input_path")]
    pub input_path: PathBuf,
    #[arg(short = 'v', long = "input_variables")]
    pub input_variables: String,
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,
    #[arg(short = 'c', long = "calculator")]
    pub calculator: Vec<String>,
    #[arg(short = 'a', long = "algorithm")]
    pub algorithm: String,
    #[arg(short = 'e', long = "output-expression")]
    pub output_expression: String,
    /// `key=value`, repeatable.
    #[arg(short = 'o', long = "algorithm-options")]
    pub algorithm_options: Vec<String>,
    #[arg(long = "analysis-dir", default_value = "./analysis")]
    pub analysis_dir: PathBuf,
    #[arg(short = 'f', long = "format", default_value = "table")]
    pub format: String,
}

#[derive(Parser, clap::Args)]
pub struct ListArgs {
    #[arg(long)]
    pub models: bool,
    #[arg(long)]
    pub calculators: bool,
    /// Probe each listed calculator's reachability instead of only listing names.
    #[arg(long)]
    pub check: bool,
}

#[derive(clap::Args)]
pub struct InstallArgs {
    #[arg(value_enum)]
    pub kind: BundleKind,
    pub source_path: PathBuf,
    pub name: String,
}

#[derive(clap::Args)]
pub struct UninstallArgs {
    #[arg(value_enum)]
    pub kind: BundleKind,
    pub name: String,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum BundleKind {
    Models,
    Calculators,
    Algorithms,
}

impl BundleKind {
    fn dir_name(self) -> &'static str {
        match self {
            BundleKind::Models => config::MODELS_DIR,
            BundleKind::Calculators => config::CALCULATORS_DIR,
            BundleKind::Algorithms => config::ALGORITHMS_DIR,
        }
    }
}

fn load_model(spec: Option<&str>) -> Result<Model> {
    match spec {
        None => Ok(Model::default()),
        Some(spec) => {
            let path = config::resolve_named(config::MODELS_DIR, spec)
                .unwrap_or_else(|| PathBuf::from(spec));
            if path.is_file() {
                Model::from_path(&path)
            } else {
                Model::from_json(spec)
            }
        }
    }
}

fn load_case_spec(input_variables: Option<&str>) -> Result<case::CaseSpec> {
    let text = match input_variables {
        None => return Ok(case::CaseSpec::Mapping(Default::default())),
        Some(v) => {
            let path = PathBuf::from(v);
            if path.is_file() {
                std::fs::read_to_string(path)?
            } else {
                v.to_string()
            }
        }
    };
    case::spec_from_json(&text)
}

fn resolve_calculators(uris: &[String], model_name: Option<&str>) -> Result<Vec<String>> {
    let model_name = model_name.unwrap_or("");
    uris.iter().map(|spec| registry::resolve(spec, model_name)).collect()
}

/// Exit codes (§6): 0 success, 1 fatal config/dispatch error, 2 all cases
/// failed, 130 interrupted. `shutdown` is the process-wide flag installed by
/// `main`'s interrupt handler; only `run`/`design` observe it.
pub fn run(cli: Cli, shutdown: ShutdownFlag) -> i32 {
    let outcome = dispatch(cli, shutdown);
    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn dispatch(cli: Cli, shutdown: ShutdownFlag) -> Result<i32> {
    match cli.command {
        Commands::Input(args) => cmd_input(args),
        Commands::Compile(args) => cmd_compile(args),
        Commands::Output(args) => cmd_output(args),
        Commands::Run(args) => cmd_run(args, shutdown),
        Commands::Design(args) => cmd_design(args, shutdown),
        Commands::List(args) => cmd_list(args),
        Commands::Install(args) => cmd_install(args),
        Commands::Uninstall(args) => cmd_uninstall(args),
    }
}

/// Entry points for the per-subcommand wrapper binaries (`src/bin/`), each
/// taking the identical argument set as the matching `fz` subcommand (§6:
/// "each is also a top-level binary with the same arguments").
pub fn run_input(args: InputArgs) -> i32 {
    report(cmd_input(args))
}

pub fn run_compile(args: CompileArgs) -> i32 {
    report(cmd_compile(args))
}

pub fn run_output(args: OutputArgs) -> i32 {
    report(cmd_output(args))
}

pub fn run_run(args: RunArgs, shutdown: ShutdownFlag) -> i32 {
    report(cmd_run(args, shutdown))
}

pub fn run_design(args: DesignArgs, shutdown: ShutdownFlag) -> i32 {
    report(cmd_design(args, shutdown))
}

pub fn run_list(args: ListArgs) -> i32 {
    report(cmd_list(args))
}

fn report(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn cmd_input(args: InputArgs) -> Result<i32> {
    let model = load_model(args.model.as_deref())?;
    let names = crate::template::discover(&args.input_path, &model)?;
    for name in names {
        println!("{name}");
    }
    Ok(0)
}

fn cmd_compile(args: CompileArgs) -> Result<i32> {
    let mut model = load_model(args.model.as_deref())?;
    model.apply_overrides(&args.overrides.into_model_overrides()?);
    let spec = load_case_spec(args.input_variables.as_deref())?;
    let cases = case::expand(&spec)?;
    std::fs::create_dir_all(&args.results_dir)?;
    for c in &cases {
        let key = c.case_key();
        let dir = if key.is_empty() { args.results_dir.clone() } else { args.results_dir.join(&key) };
        std::fs::create_dir_all(&dir)?;
        crate::template::compile(&args.input_path, c, &model, &dir)?;
        println!("{}", dir.display());
    }
    Ok(0)
}

fn cmd_output(args: OutputArgs) -> Result<i32> {
    let model = load_model(args.model.as_deref())?;
    let outputs = extractor::extract_all(&args.case_dir, &model)?;
    // No input variables are known for a bare `output` invocation; leave
    // `inputs` empty so rendering shows only the path and output fields.
    let record = crate::result_set::CaseResultRecord {
        inputs: Default::default(),
        outputs,
        status: crate::result_set::CaseStatus::Done,
        calculator: String::new(),
        error: None,
        command: String::new(),
        path: args.case_dir.display().to_string(),
    };
    let rs = ResultSet { rows: vec![record] };
    println!("{}", rs.render(&args.format));
    Ok(0)
}

fn cmd_run(args: RunArgs, shutdown: ShutdownFlag) -> Result<i32> {
    let mut model = load_model(args.model.as_deref())?;
    model.apply_overrides(&args.overrides.into_model_overrides()?);
    let spec = load_case_spec(args.input_variables.as_deref())?;
    let cases = case::expand(&spec)?;

    let calculator_uris = if args.calculator.is_empty() {
        vec!["sh://sh".to_string()]
    } else {
        resolve_calculators(&args.calculator, args.model.as_deref())?
    };

    let runtime = config::RuntimeConfig::from_env();
    let opts = RunOptions {
        input_path: &args.input_path,
        model: &model,
        run_dir: &args.results_dir,
        calculator_uris: &calculator_uris,
        retry_bound: runtime.max_retries,
        env_default_timeout: runtime.run_timeout.as_secs(),
        max_workers: runtime.max_workers,
        shutdown,
        observers: vec![],
    };
    let mut result_set = scheduler::run(&cases, opts)?;
    scheduler::populate_outputs(&mut result_set, &model)?;

    println!("{}", result_set.render(&args.format));
    Ok(exit_code_for(&result_set))
}

fn exit_code_for(result_set: &ResultSet) -> i32 {
    use crate::result_set::CaseStatus;
    if result_set.rows.iter().any(|r| r.status == CaseStatus::Interrupted) {
        return 130;
    }
    if !result_set.rows.is_empty() && result_set.rows.iter().all(|r| r.status == CaseStatus::Failed) {
        return 2;
    }
    0
}

fn cmd_design(args: DesignArgs, shutdown: ShutdownFlag) -> Result<i32> {
    let model = load_model(args.model.as_deref())?;
    let spec = load_case_spec(Some(&args.input_variables))?;
    let case::CaseSpec::Mapping(mapping) = spec else {
        return Err(Error::ConfigError("design requires mapping-form input variables (fixed + ranged)".to_string()));
    };
    let (fixed, ranges) = adaptive::split_fixed_and_ranged(&mapping);
    let output_names: Vec<String> = model.output.keys().cloned().collect();

    let mut caller_options = BTreeMap::new();
    for entry in &args.algorithm_options {
        let (k, v) = entry.split_once('=').ok_or_else(|| {
            Error::ConfigError(format!("--algorithm-options expects 'key=value', got '{entry}'"))
        })?;
        caller_options.insert(k.to_string(), v.to_string());
    }
    let (_header, algorithm) = builtin::load(&args.algorithm, &caller_options)?;

    let calculator_uris = if args.calculator.is_empty() {
        vec!["sh://sh".to_string()]
    } else {
        resolve_calculators(&args.calculator, args.model.as_deref())?
    };
    let runtime = config::RuntimeConfig::from_env();

    let opts = adaptive::DriverOptions {
        input_path: &args.input_path,
        model: &model,
        analysis_dir: &args.analysis_dir,
        calculator_uris: &calculator_uris,
        output_expression: &args.output_expression,
        retry_bound: runtime.max_retries,
        env_default_timeout: runtime.run_timeout.as_secs(),
        max_workers: runtime.max_workers,
        shutdown,
    };

    let report = adaptive::drive(algorithm.as_ref(), &args.algorithm, &fixed, &ranges, &output_names, opts)?;
    println!("{}", report.xy.render(&args.format));
    println!("\n{}", report.summary);
    Ok(0)
}

fn cmd_list(args: ListArgs) -> Result<i32> {
    if args.models || (!args.calculators && !args.models) {
        println!("models:");
        for name in config::list_named(config::MODELS_DIR) {
            println!("  {name}");
        }
    }
    if args.calculators || (!args.calculators && !args.models) {
        println!("calculators:");
        for name in config::list_named(config::CALCULATORS_DIR) {
            if args.check {
                let status = check_calculator(&name);
                println!("  {name}: {status}");
            } else {
                println!("  {name}");
            }
        }
    }
    Ok(0)
}

fn check_calculator(name: &str) -> &'static str {
    let Some(path) = config::resolve_named(config::CALCULATORS_DIR, name) else {
        return "missing descriptor";
    };
    match registry::CalculatorAlias::from_path(&path) {
        Ok(_) => "reachable",
        Err(_) => "invalid descriptor",
    }
}

fn cmd_install(args: InstallArgs) -> Result<i32> {
    let dest_dir = config::user_dir().join(args.kind.dir_name());
    std::fs::create_dir_all(&dest_dir)?;
    std::fs::copy(&args.source_path, dest_dir.join(&args.name))?;
    Ok(0)
}

fn cmd_uninstall(args: UninstallArgs) -> Result<i32> {
    if let Some(path) = config::resolve_named(args.kind.dir_name(), &args.name) {
        std::fs::remove_file(path)?;
    }
    Ok(0)
}
