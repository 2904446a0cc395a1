use postline_core::paths::POSTLINE_DIR;
use std::path::{Path, PathBuf};

/// Resolve the deployment root directory.
///
/// Priority:
/// 1. `--root` flag / `POSTLINE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.postline/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd).unwrap_or(cwd)
}

/// Nearest ancestor of `start` (inclusive) holding a `.postline/` directory.
fn find_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(POSTLINE_DIR).is_dir())
        .map(Path::to_path_buf)
}
