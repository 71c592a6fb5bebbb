use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Waiting,
    Building,
    Success,
    Failure,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Waiting,
        TaskStatus::Building,
        TaskStatus::Success,
        TaskStatus::Failure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Building => "building",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(TaskStatus::Waiting),
            "building" => Some(TaskStatus::Building),
            "success" => Some(TaskStatus::Success),
            "failure" => Some(TaskStatus::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which buildable definition a task points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    /// A registered firmware published by a keyboard author.
    Firmware(String),
    /// A user's workbench project; builds consume the user's quota.
    Project(String),
}

impl BuildTarget {
    pub fn kind(&self) -> RecordKind {
        match self {
            BuildTarget::Firmware(_) => RecordKind::Firmware,
            BuildTarget::Project(_) => RecordKind::Project,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BuildTarget::Firmware(id) | BuildTarget::Project(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Firmware,
    Project,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Firmware => "firmware",
            RecordKind::Project => "project",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Keyboard,
    Keymap,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Keyboard => "keyboard",
            FileKind::Keymap => "keymap",
        }
    }

    pub fn from_flag(value: &str) -> Option<Self> {
        match value {
            "keyboard" => Some(FileKind::Keyboard),
            "keymap" => Some(FileKind::Keymap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub uid: String,
    pub status: TaskStatus,
    /// `None` when the stored row references neither or both record kinds.
    pub target: Option<BuildTarget>,
    pub parameters_json: String,
    pub stdout: String,
    pub stderr: String,
    pub firmware_file_path: String,
    pub created_at: String,
    pub updated_at: String,
}

/// The fields written on every status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    pub stdout: String,
    pub stderr: String,
    pub firmware_file_path: String,
}

impl TaskUpdate {
    pub fn building() -> Self {
        Self {
            status: TaskStatus::Building,
            stdout: String::new(),
            stderr: String::new(),
            firmware_file_path: String::new(),
        }
    }

    pub fn failure(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failure,
            stdout: stdout.into(),
            stderr: stderr.into(),
            firmware_file_path: String::new(),
        }
    }

    pub fn success(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        firmware_file_path: impl Into<String>,
    ) -> Self {
        Self {
            status: TaskStatus::Success,
            stdout: stdout.into(),
            stderr: stderr.into(),
            firmware_file_path: firmware_file_path.into(),
        }
    }
}

/// A firmware or project record, reduced to what a build needs.
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub kind: RecordKind,
    pub id: String,
    pub uid: String,
    /// Always `true` for projects; firmwares can be switched off by their author.
    pub enabled: bool,
    pub qmk_firmware_version: String,
    pub keyboard_directory_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: String,
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(id: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            content: content.into(),
        }
    }
}
