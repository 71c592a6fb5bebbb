mod admin;
mod install;
mod serve;

use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;

use crate::core::task::{BuildTarget, FileKind};
use crate::core::terminal::{self, GuideSection};

/// Compiler version recorded on firmware records created from the command line.
pub(crate) const DEFAULT_QMK_VERSION: &str = "0.22.12";

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Run the build server (default)")
        .command("install", "Create the data directory and database")
        .print();

    GuideSection::new("Records")
        .command(
            "upload-file",
            "Attach a source file: -k <id> -t keyboard|keymap -n <name> -p <path> [--project]",
        )
        .command("firmware enable|disable <id>", "Toggle whether a firmware may be built")
        .command(
            "firmware directory <id> [name]",
            "Set or clear the fixed keyboard directory name",
        )
        .command("project create <id> --uid <uid>", "Create a workbench project")
        .command(
            "project directory <id> [name]",
            "Set or clear the fixed keyboard directory name",
        )
        .command("quota set <uid> <count>", "Set a user's remaining workbench builds")
        .print();

    GuideSection::new("Tasks")
        .command(
            "task create <id> --uid <uid> --firmware|--project <id>",
            "Queue a build task [--parameters <file>]",
        )
        .command("task show <id>", "Print a task's status and output")
        .print();

    println!(
        "\n {} {} <command> [arguments] [--config <path>]\n",
        style("Usage:").bold(),
        style("qmk-build-server").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadFileArgs {
    pub record_id: String,
    pub kind: FileKind,
    pub file_name: String,
    pub local_path: PathBuf,
    pub project: bool,
    pub qmk_version: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TaskCreateArgs {
    pub task_id: String,
    pub uid: String,
    pub target: BuildTarget,
    pub parameters_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Serve,
    Install,
    UploadFile(UploadFileArgs),
    FirmwareEnabled { id: String, enabled: bool },
    DirectoryName {
        target: BuildTarget,
        name: Option<String>,
    },
    ProjectCreate {
        id: String,
        uid: String,
        qmk_version: String,
    },
    QuotaSet { uid: String, remaining: i64 },
    TaskCreate(TaskCreateArgs),
    TaskShow { id: String },
    Help,
}

/// Splits `--config <path>` out of `args`; it may appear anywhere.
pub(crate) fn extract_config_flag(args: &[String]) -> Result<(Vec<String>, Option<PathBuf>)> {
    let mut rest = Vec::with_capacity(args.len());
    let mut config = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let value = args
                    .get(i + 1)
                    .context("--config requires a path")?;
                config = Some(PathBuf::from(value));
                i += 2;
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }
    Ok((rest, config))
}

fn flag_value(args: &[String], i: usize, flag: &str) -> Result<String> {
    match args.get(i + 1) {
        Some(value) => Ok(value.clone()),
        None => bail!("{} requires a value", flag),
    }
}

fn positional(args: &[String], index: usize, what: &str) -> Result<String> {
    match args.get(index) {
        Some(value) if !value.starts_with('-') => Ok(value.clone()),
        _ => bail!("missing {}", what),
    }
}

pub(crate) fn parse_upload_file_args(args: &[String], start: usize) -> Result<UploadFileArgs> {
    let mut record_id = String::new();
    let mut kind = String::new();
    let mut file_name = String::new();
    let mut local_path = String::new();
    let mut project = false;
    let mut qmk_version = DEFAULT_QMK_VERSION.to_string();
    let mut uid = String::new();

    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "-k" | "--keyboard-definition-id" => {
                record_id = flag_value(args, i, "-k")?;
                i += 2;
            }
            "-t" | "--type" => {
                kind = flag_value(args, i, "-t")?;
                i += 2;
            }
            "-n" | "--name" => {
                file_name = flag_value(args, i, "-n")?;
                i += 2;
            }
            "-p" | "--path" => {
                local_path = flag_value(args, i, "-p")?;
                i += 2;
            }
            "--qmk-version" => {
                qmk_version = flag_value(args, i, "--qmk-version")?;
                i += 2;
            }
            "--uid" => {
                uid = flag_value(args, i, "--uid")?;
                i += 2;
            }
            "--project" => {
                project = true;
                i += 1;
            }
            other => bail!("unknown upload-file argument {:?}", other),
        }
    }

    if record_id.is_empty() {
        bail!("-k <record id> is required");
    }
    if kind.is_empty() {
        bail!("-t keyboard|keymap is required");
    }
    let Some(kind) = FileKind::from_flag(&kind) else {
        bail!("the file type must be keyboard or keymap, got {:?}", kind);
    };
    if file_name.is_empty() {
        bail!("-n <file name> is required");
    }
    if local_path.is_empty() {
        bail!("-p <local path> is required");
    }

    Ok(UploadFileArgs {
        record_id,
        kind,
        file_name,
        local_path: PathBuf::from(local_path),
        project,
        qmk_version,
        uid,
    })
}

fn parse_task_create_args(args: &[String], start: usize) -> Result<TaskCreateArgs> {
    let task_id = positional(args, start, "task id")?;
    let mut uid = String::new();
    let mut target = None;
    let mut parameters_file = None;

    let mut i = start + 1;
    while i < args.len() {
        match args[i].as_str() {
            "--uid" => {
                uid = flag_value(args, i, "--uid")?;
                i += 2;
            }
            "--firmware" => {
                target = Some(BuildTarget::Firmware(flag_value(args, i, "--firmware")?));
                i += 2;
            }
            "--project" => {
                target = Some(BuildTarget::Project(flag_value(args, i, "--project")?));
                i += 2;
            }
            "--parameters" => {
                parameters_file = Some(PathBuf::from(flag_value(args, i, "--parameters")?));
                i += 2;
            }
            other => bail!("unknown task create argument {:?}", other),
        }
    }

    if uid.is_empty() {
        bail!("--uid is required");
    }
    let Some(target) = target else {
        bail!("either --firmware <id> or --project <id> is required");
    };
    Ok(TaskCreateArgs {
        task_id,
        uid,
        target,
        parameters_file,
    })
}

fn parse_project_create_args(args: &[String], start: usize) -> Result<Command> {
    let id = positional(args, start, "project id")?;
    let mut uid = String::new();
    let mut qmk_version = DEFAULT_QMK_VERSION.to_string();

    let mut i = start + 1;
    while i < args.len() {
        match args[i].as_str() {
            "--uid" => {
                uid = flag_value(args, i, "--uid")?;
                i += 2;
            }
            "--qmk-version" => {
                qmk_version = flag_value(args, i, "--qmk-version")?;
                i += 2;
            }
            other => bail!("unknown project create argument {:?}", other),
        }
    }
    if uid.is_empty() {
        bail!("--uid is required");
    }
    Ok(Command::ProjectCreate {
        id,
        uid,
        qmk_version,
    })
}

/// Parses everything after the binary name, with `--config` already removed.
pub(crate) fn parse_command(args: &[String]) -> Result<Command> {
    let Some(cmd) = args.first() else {
        return Ok(Command::Serve);
    };
    let sub = args.get(1).map(String::as_str).unwrap_or("");

    let command = match cmd.as_str() {
        "serve" => Command::Serve,
        "install" => Command::Install,
        "upload-file" => Command::UploadFile(parse_upload_file_args(args, 1)?),
        "firmware" => match sub {
            "enable" | "disable" => Command::FirmwareEnabled {
                id: positional(args, 2, "firmware id")?,
                enabled: sub == "enable",
            },
            "directory" => Command::DirectoryName {
                target: BuildTarget::Firmware(positional(args, 2, "firmware id")?),
                name: args.get(3).cloned(),
            },
            _ => bail!("unknown firmware command {:?}; expected enable, disable or directory", sub),
        },
        "project" => match sub {
            "create" => parse_project_create_args(args, 2)?,
            "directory" => Command::DirectoryName {
                target: BuildTarget::Project(positional(args, 2, "project id")?),
                name: args.get(3).cloned(),
            },
            _ => bail!("unknown project command {:?}; expected create or directory", sub),
        },
        "quota" => match sub {
            "set" => {
                let uid = positional(args, 2, "uid")?;
                let count = positional(args, 3, "build count")?;
                let remaining = count
                    .parse()
                    .with_context(|| format!("the build count must be a number, got {:?}", count))?;
                Command::QuotaSet { uid, remaining }
            }
            _ => bail!("unknown quota command {:?}; expected set", sub),
        },
        "task" => match sub {
            "create" => Command::TaskCreate(parse_task_create_args(args, 2)?),
            "show" => Command::TaskShow {
                id: positional(args, 2, "task id")?,
            },
            _ => bail!("unknown task command {:?}; expected create or show", sub),
        },
        "help" | "--help" | "-h" => Command::Help,
        other => bail!("unknown command {:?}", other),
    };
    Ok(command)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (args, config_path) = extract_config_flag(&args)?;
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(e) => {
            print_help();
            return Err(e);
        }
    };
    let config_path = config_path.as_deref();

    match command {
        Command::Serve => serve::run_serve(config_path).await,
        Command::Install => install::run_install(config_path).await,
        Command::Help => {
            print_help();
            Ok(())
        }
        admin_command => admin::run(admin_command, config_path).await,
    }
}
