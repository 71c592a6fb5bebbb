//! Operator commands that edit the build database directly.

use anyhow::{Context, Result, bail};
use std::path::Path;

use super::{Command, TaskCreateArgs, UploadFileArgs};
use crate::core::config::ServerConfig;
use crate::core::store::{BuildDatabase, QuotaStore, RecordStore, TaskStore};
use crate::core::task::BuildTarget;
use crate::core::terminal::{print_info, print_status, print_success, print_warn};
use crate::core::workspace::{validate_name, validate_relative_path};

pub async fn run(command: Command, config_path: Option<&Path>) -> Result<()> {
    let config = ServerConfig::load(config_path).await?;
    let db = BuildDatabase::open(config.database_path()).await?;

    match command {
        Command::UploadFile(args) => upload_file(&db, args).await,
        Command::FirmwareEnabled { id, enabled } => {
            if !db.set_firmware_enabled(&id, enabled).await? {
                bail!("firmware {} not found", id);
            }
            let state = if enabled { "enabled" } else { "disabled" };
            print_success(&format!("Firmware {} is {}.", id, state));
            Ok(())
        }
        Command::DirectoryName { target, name } => {
            if let Some(name) = name.as_deref() {
                validate_name(name, "keyboard directory name")?;
            }
            if !db.set_keyboard_directory_name(&target, name.as_deref()).await? {
                bail!("{} {} not found", target.kind().as_str(), target.id());
            }
            match name {
                Some(name) => print_success(&format!("{} builds in keyboards/{}.", target.id(), name)),
                None => print_success(&format!("{} builds in a fresh directory each time.", target.id())),
            }
            Ok(())
        }
        Command::ProjectCreate {
            id,
            uid,
            qmk_version,
        } => {
            validate_name(&qmk_version, "QMK firmware version")?;
            db.insert_project(&id, &uid, &qmk_version)
                .await
                .with_context(|| format!("creating project {}", id))?;
            print_success(&format!("Project {} created for {}.", id, uid));
            Ok(())
        }
        Command::QuotaSet { uid, remaining } => {
            db.set_remaining_builds(&uid, remaining).await?;
            let stored = db.remaining_builds(&uid).await?;
            print_success(&format!("{} has {} workbench builds left.", uid, stored));
            Ok(())
        }
        Command::TaskCreate(args) => create_task(&db, args).await,
        Command::TaskShow { id } => show_task(&db, &id).await,
        Command::Serve | Command::Install | Command::Help => {
            bail!("not an administration command")
        }
    }
}

async fn upload_file(db: &BuildDatabase, args: UploadFileArgs) -> Result<()> {
    validate_relative_path(&args.file_name)?;
    let content = tokio::fs::read_to_string(&args.local_path)
        .await
        .with_context(|| format!("reading {}", args.local_path.display()))?;

    let target = if args.project {
        let target = BuildTarget::Project(args.record_id.clone());
        if db.fetch_project(&args.record_id).await?.is_none() {
            bail!("project {} not found", args.record_id);
        }
        target
    } else {
        validate_name(&args.qmk_version, "QMK firmware version")?;
        let created = db
            .ensure_firmware(&args.record_id, &args.uid, &args.qmk_version)
            .await?;
        if created {
            print_warn(&format!(
                "Created firmware {} (disabled). Enable it with `firmware enable {}`.",
                args.record_id, args.record_id
            ));
        }
        BuildTarget::Firmware(args.record_id.clone())
    };

    let file_id = db
        .insert_source_file(&target, args.kind, &args.file_name, &content)
        .await?;
    print_success(&format!(
        "Stored {} as a {} file of {} {}.",
        args.file_name,
        args.kind.as_str(),
        target.kind().as_str(),
        target.id()
    ));
    print_status("File ID", &file_id);
    Ok(())
}

async fn create_task(db: &BuildDatabase, args: TaskCreateArgs) -> Result<()> {
    let parameters_json = match &args.parameters_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => "{}".to_string(),
    };
    let exists = match &args.target {
        BuildTarget::Firmware(id) => db.fetch_firmware(id).await?.is_some(),
        BuildTarget::Project(id) => db.fetch_project(id).await?.is_some(),
    };
    if !exists {
        print_warn(&format!(
            "{} {} does not exist yet; the build will fail until it does.",
            args.target.kind().as_str(),
            args.target.id()
        ));
    }

    db.insert_task(&args.task_id, &args.uid, &args.target, &parameters_json)
        .await
        .with_context(|| format!("creating task {}", args.task_id))?;
    print_success(&format!("Task {} is waiting.", args.task_id));
    print_info(&format!(
        "Trigger it with GET /build?uid={}&taskId={}",
        args.uid, args.task_id
    ));
    Ok(())
}

async fn show_task(db: &BuildDatabase, task_id: &str) -> Result<()> {
    let Some(task) = db.fetch_task(task_id).await? else {
        bail!("task {} not found", task_id);
    };
    print_status("Task", &task.task_id);
    print_status("User", &task.uid);
    print_status("Status", &task.status.to_string());
    if let Some(target) = &task.target {
        print_status(target.kind().as_str(), target.id());
    }
    print_status("Created", &task.created_at);
    print_status("Updated", &task.updated_at);
    if !task.firmware_file_path.is_empty() {
        print_status("Firmware", &task.firmware_file_path);
    }
    if !task.stdout.is_empty() {
        println!("\n--- stdout ---\n{}", task.stdout);
    }
    if !task.stderr.is_empty() {
        println!("\n--- stderr ---\n{}", task.stderr);
    }
    Ok(())
}
