use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const POSTLINE_DIR: &str = ".postline";

pub const CONFIG_FILE: &str = ".postline/config.yaml";
pub const ROTATION_FILE: &str = ".postline/rotation.yaml";
pub const PLAN_FILE: &str = ".postline/content_plan.yaml";
pub const LOCK_FILE: &str = ".postline/scheduler.lock";
pub const CONTROL_SOCKET: &str = ".postline/control.sock";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn postline_dir(root: &Path) -> PathBuf {
    root.join(POSTLINE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn rotation_path(root: &Path) -> PathBuf {
    root.join(ROTATION_FILE)
}

pub fn plan_path(root: &Path) -> PathBuf {
    root.join(PLAN_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Unix socket the running scheduler answers operator commands on.
pub fn control_path(root: &Path) -> PathBuf {
    root.join(CONTROL_SOCKET)
}
