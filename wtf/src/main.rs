//! `wtf`: WRF regression test driver.
//!
//! Acquires source packages, reads a `.wtf` test descriptor, and builds,
//! tests and checks every declared variant of every package. Exit codes are
//! listed in [`wtf::exit_codes`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use wtf::core::variant::BuildPlan;
use wtf::descriptor::TestDescriptor;
use wtf::error::{WtfError, exit_code_for};
use wtf::exit_codes;
use wtf::fetch::Acquisition;
use wtf::io::actions::ScriptActions;
use wtf::io::archive::TarArchiver;
use wtf::io::config::{DEFAULT_CONFIG_FILE, WtfConfig, load_config};
use wtf::io::git::GitFetcher;
use wtf::io::workspace::{AssumeYes, Confirm, StdinConfirm, Workspace};
use wtf::logging;
use wtf::schedule::BuildScheduler;
use wtf::source::{SourceReference, resolve};

#[derive(Parser, Debug)]
#[command(
    name = "wtf",
    version,
    about = "Regression test driver for WRF builds across compilers and build variants"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, test and check every variant of every source package.
    Run(RunArgs),
    /// Print the build plan for a descriptor without running anything.
    Plan {
        /// Test descriptor (`*.wtf`).
        descriptor: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Print the canonical package name of a source reference.
    Package {
        /// Repository URL (default: configured upstream).
        #[arg(long, default_value = "")]
        url: String,
        /// Branch (default: configured default branch).
        #[arg(long, default_value = "")]
        branch: String,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Test descriptor (`*.wtf`).
    descriptor: PathBuf,
    /// Repository URL to test; pairs with `--branch` by position.
    #[arg(long = "url")]
    urls: Vec<String>,
    /// Branch to test; pairs with `--url` by position.
    #[arg(long = "branch")]
    branches: Vec<String>,
    /// Local source directory or existing `.tar` package.
    #[arg(long = "local")]
    locals: Vec<PathBuf>,
    /// Overwrite existing packages without asking.
    #[arg(short, long)]
    yes: bool,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Also write the run report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    /// Git references (URLs and branches paired by position) followed by
    /// local ones.
    fn references(&self) -> Vec<SourceReference> {
        let count = self.urls.len().max(self.branches.len());
        let mut references: Vec<SourceReference> = (0..count)
            .map(|index| {
                SourceReference::git(
                    self.urls.get(index).map_or("", String::as_str),
                    self.branches.get(index).map_or("", String::as_str),
                )
            })
            .collect();
        references.extend(self.locals.iter().cloned().map(SourceReference::Local));
        references
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::USAGE
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            process::exit(code);
        }
    };
    logging::init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            if code == exit_codes::OK {
                eprintln!("{err}");
            } else {
                eprintln!("error: {err:#}");
            }
            code
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Plan { descriptor, config } => cmd_plan(&descriptor, &config),
        Command::Package {
            url,
            branch,
            config,
        } => cmd_package(&url, &branch, &config),
    }
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let cfg = load_config(&args.config)?;
    let descriptor = TestDescriptor::load(&args.descriptor)?;
    let resolver = cfg.dependency_table();
    BuildPlan::new(&descriptor.variants, &resolver).map_err(WtfError::from)?;

    let workspace = workspace_for(&cfg, &descriptor);
    let confirm: &dyn Confirm = if args.yes { &AssumeYes } else { &StdinConfirm };
    let packages = Acquisition {
        workspace: &workspace,
        fetcher: &GitFetcher,
        archiver: &TarArchiver,
        confirm,
    }
    .acquire(&args.references(), &cfg.source_defaults())?;
    info!(
        packages = packages.len(),
        work_dir = %workspace.root().display(),
        "packages ready"
    );

    let actions = ScriptActions::from_config(&cfg, &workspace.logs_dir());
    let report =
        BuildScheduler::new(&descriptor, &resolver, &actions, &actions, &actions).run(&packages)?;

    print!("{}", report.render_text());
    if let Some(path) = &args.report {
        write_json(path, &report)?;
    }
    Ok(if report.is_failure() {
        exit_codes::RUN_FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_plan(descriptor_path: &Path, config: &Path) -> Result<i32> {
    let cfg = load_config(config)?;
    let descriptor = TestDescriptor::load(descriptor_path)?;
    let plan =
        BuildPlan::new(&descriptor.variants, &cfg.dependency_table()).map_err(WtfError::from)?;

    println!("compiler: {}", descriptor.compiler);
    println!("configure: {}", descriptor.configure_options.join(" "));
    println!(
        "work_dir: {}",
        workspace_for(&cfg, &descriptor).root().display()
    );
    let width = plan
        .variants()
        .iter()
        .map(|variant| variant.name.len())
        .max()
        .unwrap_or(0);
    for variant in plan.variants() {
        let depends = variant
            .depends_on
            .as_deref()
            .map(|dep| format!("  after {dep}"))
            .unwrap_or_default();
        let options = if variant.configure_options.is_empty() {
            String::new()
        } else {
            format!("  [{}]", variant.configure_options.join(" "))
        };
        println!(
            "  {:<width$}  {}{depends}{options}",
            variant.name,
            variant.status()
        );
    }
    println!("passes: at most {}", plan.depth() + 1);
    Ok(exit_codes::OK)
}

fn cmd_package(url: &str, branch: &str, config: &Path) -> Result<i32> {
    let cfg = load_config(config)?;
    let source = resolve(&SourceReference::git(url, branch), &cfg.source_defaults())?;
    println!("{}", source.package_name);
    Ok(exit_codes::OK)
}

/// `TARFILE_DIR` from the descriptor wins over the configured working area.
fn workspace_for(cfg: &WtfConfig, descriptor: &TestDescriptor) -> Workspace {
    Workspace::new(descriptor.tarfile_dir().unwrap_or_else(|| cfg.work_dir.clone()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize report")?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, format!("{json}\n")).with_context(|| format!("write {}", path.display()))
}
