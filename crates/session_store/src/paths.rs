use std::path::{Path, PathBuf};

pub const HISTORY_DIR: [&str; 2] = [".quasar", "history"];

#[must_use]
pub fn default_history_dir(cwd: &Path) -> PathBuf {
    cwd.join(HISTORY_DIR[0]).join(HISTORY_DIR[1])
}

/// Keys map to `<key>.json`; anything outside `[A-Za-z0-9_-]` is rejected.
#[must_use]
pub fn storage_file_name(key: &str) -> Option<String> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');
    valid.then(|| format!("{key}.json"))
}
