use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use jar_patcher::archive::Archive;
use jar_patcher::cache::CacheValidator;
use jar_patcher::class::DecodedModule;
use jar_patcher::config::{load_settings, LogLevel, Settings};
use jar_patcher::pipeline::{BuildOutcome, Pipeline};
use jar_patcher::plugin::{discover, TransformerRegistry};
use std::env;
use std::path::PathBuf;
use std::process::Command;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "jar-patcher")]
#[command(about = "Patch compiled modules in an archive with transformer plugins", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ./jar-patcher.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level: 0 fatal, 1 warn, 2 info, 3 debug
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    log: Option<i64>,

    /// Source archive to patch
    #[arg(long, global = true)]
    jar: Option<PathBuf>,

    /// Plugin directory
    #[arg(long, global = true)]
    plugins: Option<PathBuf>,

    /// Directory holding the patched archive and its digest
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the patched archive, reusing the cached one when inputs are unchanged
    Build,

    /// Build, then launch the patched archive with java
    Run {
        /// Extra arguments passed to the program after the configured ones
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List plugin packages and whether their entry points are available
    Plugins,

    /// Report whether the cached archive is up to date
    Status,

    /// Decode one class from an archive and list its methods
    Inspect {
        /// Archive to read
        archive: PathBuf,

        /// Class name, dotted (a.b.C) or as an entry path (a/b/C.class)
        class: String,

        /// Print every instruction of every method
        #[arg(long)]
        code: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = env::current_dir().context("Failed to determine working directory")?;
    let mut settings = match load_settings(cli.config.as_deref(), &cwd) {
        Ok(settings) => settings,
        Err(e) => {
            // No settings to take a level from, so log at the requested or default one.
            init_logging(cli.log);
            error!("{}", e);
            return Err(e.into());
        }
    };
    apply_overrides(&mut settings, &cli);
    init_logging(cli.log.or(settings.build.log_level));

    let result = match cli.command {
        Commands::Build => cmd_build(&settings),
        Commands::Run { args } => cmd_run(&settings, args),
        Commands::Plugins => cmd_plugins(&settings),
        Commands::Status => cmd_status(&settings),
        Commands::Inspect {
            archive,
            class,
            code,
        } => cmd_inspect(&settings, archive, &class, code),
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(jar) = &cli.jar {
        settings.paths.source = jar.clone();
    }
    if let Some(plugins) = &cli.plugins {
        settings.paths.plugins = plugins.clone();
    }
    if let Some(cache_dir) = &cli.cache_dir {
        settings.paths.cache = cache_dir.clone();
    }
}

/// Logs go to stderr; stdout carries the command's own report.
fn init_logging(requested: Option<i64>) {
    let force_debug = env::var_os("ENABLE_DEBUG_LOG").is_some();
    let (level, warning) = LogLevel::resolve(requested, force_debug);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level.directive()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Some(warning) = warning {
        warn!("{}", warning);
    }
}

fn build(settings: &Settings) -> Result<BuildOutcome> {
    let mut pipeline = Pipeline::new(settings, TransformerRegistry::with_builtins());
    pipeline
        .run()
        .with_context(|| format!("Failed to build from {}", settings.paths.source.display()))
}

fn print_outcome(outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Cached { artifact } => {
            println!(
                "{} Up to date: {}",
                "⊙".yellow(),
                artifact.display()
            );
        }
        BuildOutcome::Rebuilt {
            artifact,
            modules,
            changed,
            plugins,
        } => {
            println!("{} Built {}", "✓".green(), artifact.display());
            println!("{}", "Summary:".bold());
            println!("  {} plugins loaded", format!("{}", plugins).cyan());
            println!("  {} modules transformed", format!("{}", modules).green());
            println!("  {} modules changed", format!("{}", changed).yellow());
        }
    }
}

fn cmd_build(settings: &Settings) -> Result<()> {
    let outcome = build(settings)?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_run(settings: &Settings, extra_args: Vec<String>) -> Result<()> {
    let outcome = build(settings)?;
    print_outcome(&outcome);

    let launch = &settings.launch;
    info!("Launching {}", outcome.artifact().display());
    let status = Command::new(&launch.java)
        .args(&launch.jvm_args)
        .arg("-jar")
        .arg(outcome.artifact())
        .args(&launch.args)
        .args(&extra_args)
        .status()
        .with_context(|| format!("Failed to launch {}", launch.java))?;

    if status.success() {
        return Ok(());
    }

    let code = status.code().unwrap_or(1);
    warn!(
        "{} exited with status {}; discarding the cached archive",
        launch.java, code
    );
    let validator = CacheValidator::new(
        &settings.paths.cache,
        settings.artifact_path(),
        settings.build.digest,
    );
    validator
        .invalidate()
        .context("Failed to invalidate the cache")?;
    eprintln!(
        "{} {} exited with status {}",
        "✗".red(),
        launch.java,
        code
    );
    std::process::exit(code);
}

fn cmd_plugins(settings: &Settings) -> Result<()> {
    let registry = TransformerRegistry::with_builtins();
    let candidates = discover(&settings.paths.plugins)?;

    println!("{}", "Plugin packages".bold());
    println!("Directory: {}", settings.paths.plugins.display());
    println!();

    if candidates.is_empty() {
        println!("{}", "  No usable plugin packages found".yellow());
    }
    let mut unavailable = 0;
    for (path, manifest) in &candidates {
        let marker = if registry.contains(&manifest.entry_point) {
            "✓".green()
        } else {
            unavailable += 1;
            "✗".red()
        };
        println!(
            "{} {} {} by {}",
            marker,
            manifest.name.bold(),
            manifest.version,
            manifest.author
        );
        println!("  Entry point: {}", manifest.entry_point);
        if let Some(req) = &manifest.supported_versions {
            println!("  Supports: {}", req);
        }
        println!("  {}", path.display().to_string().dimmed());
    }

    if unavailable > 0 {
        println!();
        println!("{}", "Available entry points:".bold());
        for id in registry.entry_points() {
            println!("  - {}", id);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_status(settings: &Settings) -> Result<()> {
    let validator = CacheValidator::new(
        &settings.paths.cache,
        settings.artifact_path(),
        settings.build.digest,
    );
    let status = validator
        .check(&settings.paths.plugins, &settings.paths.source)
        .context("Failed to compute the current digest")?;

    println!("{}", "Cache Status Report".bold());
    println!("Source: {}", settings.paths.source.display());
    println!("Plugins: {}", settings.paths.plugins.display());
    println!("Artifact: {}", validator.artifact.display());
    println!("Digest ({}): {}", validator.algorithm, status.digest().dimmed());
    println!();
    if status.is_valid() {
        println!("{} {}", "✓".green(), "UP TO DATE".green().bold());
    } else {
        println!("{} {}", "⊙".yellow(), "STALE".yellow().bold());
    }
    Ok(())
}

fn cmd_inspect(settings: &Settings, archive: PathBuf, class: &str, show_code: bool) -> Result<()> {
    let suffix = settings.build.module_suffix.as_str();
    let entry = if class.ends_with(suffix) {
        class.to_string()
    } else {
        format!("{}{}", class.replace('.', "/"), suffix)
    };

    let archive_data = Archive::load(&archive)?;
    let bytes = archive_data
        .get(&entry)
        .with_context(|| format!("{} has no entry {}", archive.display(), entry))?;
    let module =
        DecodedModule::decode(bytes).with_context(|| format!("Failed to decode {}", entry))?;

    println!(
        "{} {} (class file {}.{})",
        module.access,
        module.qualified_name().bold(),
        module.major_version,
        module.minor_version
    );
    println!("Constant pool: {} slots", module.pool.len());
    println!("Methods: {}", module.methods.len());
    println!();
    for method in &module.methods {
        println!(
            "  {} {}{}  {}",
            method.access.to_string().cyan(),
            method.name,
            method.descriptor,
            format!("[{} instructions]", method.instruction_count()).dimmed()
        );
        if !show_code {
            continue;
        }
        if let Some(code) = &method.code {
            for insn in &code.instructions {
                let label = insn
                    .label
                    .map_or_else(|| "   -".to_string(), |l| format!("{:4}", l));
                println!("    {}: {}", label.dimmed(), insn.instruction);
            }
        }
    }
    Ok(())
}
