//! mlbox CLI: runs MLBoxes locally under docker or on a remote host over SSH.
//!
//! # Usage
//!
//! ```text
//! mlbox docker configure --mlbox ./mnist --platform ./mnist/platforms/docker.yaml
//! mlbox docker run --mlbox ./mnist --platform ./mnist/platforms/docker.yaml --task ./mnist/run/train.yaml
//! mlbox ssh configure ./mnist --platform ./mnist/platforms/ssh.yaml
//! mlbox ssh run ./mnist --platform ./mnist/platforms/ssh.yaml --task ./mnist/run/train.yaml
//! mlbox hparams check ./mnist/workspace/hparams/base.yaml --json
//! mlbox new --root-dir ./my_box
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use mlbox_core::hparams::HyperParams;
use mlbox_core::infrastructure::{CommandRunner, DryRunner, ShellRunner};
use mlbox_core::logging::{init_logging, LogConfig};
use mlbox_core::mlbox::{MLBox, MLBoxInvoke};
use mlbox_core::platform::PlatformConfig;
use mlbox_core::runner_config::{build_runner_config, Action};
use mlbox_core::runners::{DockerRun, SshRun};
use mlbox_core::settings::{resolve_config_dir, Settings};
use mlbox_core::template::create_box;
use mlbox_core::Result;


#[derive(Parser, Debug)]
#[command(name = "mlbox")]
#[command(version)]
#[command(about = "Run MLBoxes locally with docker or remotely over SSH", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); defaults to the settings file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print commands instead of executing them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a box with the local docker runner
    Docker {
        #[command(subcommand)]
        action: DockerAction,
    },

    /// Run a box on a remote host over SSH
    Ssh {
        #[command(subcommand)]
        action: SshAction,
    },

    /// Inspect hyperparameter files
    Hparams {
        #[command(subcommand)]
        action: HparamsAction,
    },

    /// Create a new box from the built-in template
    New {
        /// Directory to create
        #[arg(long, alias = "root_dir", default_value = "mlbox_example")]
        root_dir: PathBuf,

        /// Box name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum DockerAction {
    /// Build the box image
    Configure {
        /// Path to the box directory
        #[arg(long)]
        mlbox: PathBuf,

        /// Docker platform file
        #[arg(long)]
        platform: PathBuf,
    },

    /// Run one task invocation
    Run {
        #[arg(long)]
        mlbox: PathBuf,

        #[arg(long)]
        platform: PathBuf,

        /// Invocation file (run/<task>.yaml)
        #[arg(long)]
        task: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SshAction {
    /// Sync the box, provision Python and build the image remotely
    Configure {
        /// Path to the box directory
        mlbox: PathBuf,

        /// SSH platform file
        #[arg(long)]
        platform: PathBuf,
    },

    /// Run one task invocation remotely and pull the workspace back
    Run {
        mlbox: PathBuf,

        #[arg(long)]
        platform: PathBuf,

        /// Invocation file inside the box
        #[arg(long)]
        task: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum HparamsAction {
    /// Parse and validate a hyperparameter file
    Check {
        file: PathBuf,

        /// Print the parameters as JSON
        #[arg(long)]
        json: bool,
    },
}


fn main() {
    let cli = Cli::parse();

    let settings = match Settings::resolve(&resolve_config_dir()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("mlbox: {}", e);
            process::exit(1);
        }
    };

    init_logging(&LogConfig {
        level: cli.log_level.clone().unwrap_or_else(|| settings.log_level.clone()),
        json: cli.json_logs,
    });

    let runner: Box<dyn CommandRunner> = if cli.dry_run {
        Box::new(DryRunner)
    } else {
        Box::new(ShellRunner::new(settings.stream_output))
    };

    if let Err(e) = execute(cli.command, &settings, runner.as_ref()) {
        tracing::error!(error = %e, "command failed");
        eprintln!("mlbox: {}", e);
        process::exit(1);
    }
}


fn execute(command: Commands, settings: &Settings, runner: &dyn CommandRunner) -> Result<()> {
    match command {
        Commands::Docker { action } => match action {
            DockerAction::Configure { mlbox, platform } => docker_configure(&mlbox, &platform, runner),
            DockerAction::Run { mlbox, platform, task } => docker_run(&mlbox, &platform, &task, runner),
        },
        Commands::Ssh { action } => match action {
            SshAction::Configure { mlbox, platform } => {
                let mlbox = MLBox::open(&mlbox)?;
                let platform = PlatformConfig::load(&platform)?;
                println!("{}", mlbox);
                SshRun::new(&mlbox, platform, settings, runner)?.configure()
            }
            SshAction::Run { mlbox, platform, task } => {
                let mlbox = MLBox::open(&mlbox)?;
                let platform = PlatformConfig::load(&platform)?;
                println!("{}", mlbox);
                SshRun::new(&mlbox, platform, settings, runner)?.run(&task)
            }
        },
        Commands::Hparams { action } => match action {
            HparamsAction::Check { file, json } => hparams_check(&file, json),
        },
        Commands::New { root_dir, name } => {
            let created = create_box(&root_dir, name.as_deref())?;
            for path in &created {
                println!("  {}", path.display());
            }
            println!("Template MLBox created at {}", root_dir.display());
            Ok(())
        }
    }
}


fn docker_configure(root: &Path, platform: &Path, runner: &dyn CommandRunner) -> Result<()> {
    let mlbox = MLBox::open(root)?;
    let config = build_runner_config(&mlbox, platform, Action::Configure, None)?;
    println!("{}", mlbox);
    DockerRun::new(&mlbox, config, runner)?.configure()
}


fn docker_run(root: &Path, platform: &Path, task: &Path, runner: &dyn CommandRunner) -> Result<()> {
    let mlbox = MLBox::open(root)?;
    let invoke = MLBoxInvoke::load(task)?;
    let task_def = mlbox.load_task(&invoke)?;
    let config = build_runner_config(&mlbox, platform, Action::Run, Some(&invoke.task_name))?;
    println!("{}", mlbox);
    DockerRun::new(&mlbox, config, runner)?.run(&invoke, &task_def)
}


fn hparams_check(file: &Path, json: bool) -> Result<()> {
    let params = HyperParams::load(file)?;
    if json {
        println!("{}", params.to_json());
    } else {
        for (key, value) in params.iter() {
            println!("{}: {}", key, value);
        }
    }
    params.ensure_valid()?;
    println!("{}: {} hyperparameters OK", file.display(), params.len());
    Ok(())
}
