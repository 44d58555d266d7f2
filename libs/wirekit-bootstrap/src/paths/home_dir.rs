use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the application home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("{0} environment variable is not set")]
    BaseMissing(&'static str),
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Environment variable holding the per-user base directory.
#[cfg(target_os = "windows")]
const BASE_VAR: &str = "APPDATA";
#[cfg(not(target_os = "windows"))]
const BASE_VAR: &str = "HOME";

/// Resolve the home directory of the application.
///
/// - A configured path may start with `~`, which expands to the user home
///   (`HOME`, or `USERPROFILE` on Windows); the result must be absolute.
/// - Without a configured path, `<base>/<default_subdir>` is used, where
///   `<base>` is `$HOME` (Unix/macOS) or `%APPDATA%` (Windows).
///
/// If `create` is true, the directory is created if missing.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let user_home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from);
    let base = env::var_os(BASE_VAR).map(PathBuf::from);
    let path = resolve_with(config_home, default_subdir, user_home, base)?;
    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

/// Environment-free core of [`resolve_home_dir`].
fn resolve_with(
    config_home: Option<String>,
    default_subdir: &str,
    user_home: Option<PathBuf>,
    base: Option<PathBuf>,
) -> Result<PathBuf, HomeDirError> {
    let Some(raw) = config_home else {
        let base = base.ok_or(HomeDirError::BaseMissing(BASE_VAR))?;
        return Ok(base.join(default_subdir));
    };

    let expanded = match raw.strip_prefix('~') {
        Some(rest) => {
            let home = user_home.ok_or(HomeDirError::BaseMissing("HOME"))?;
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                home
            } else {
                Path::new(&home).join(rest)
            }
        }
        None => PathBuf::from(&raw),
    };

    if !expanded.is_absolute() {
        return Err(HomeDirError::AbsoluteRequired(
            expanded.to_string_lossy().into(),
        ));
    }
    Ok(expanded)
}
