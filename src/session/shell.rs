//! Default-shell discovery.
//!
//! Preference order on Windows: `pwsh` from `PATH`, then Windows
//! PowerShell, then `%COMSPEC%`, then `cmd.exe`. Elsewhere `$SHELL`
//! falls back to `/bin/sh`.

use std::path::{Path, PathBuf};

/// Resolve the shell to spawn when a session gives no explicit command.
#[must_use]
pub fn default_shell() -> String {
    #[cfg(windows)]
    {
        if let Some(pwsh) = find_in_path("pwsh.exe") {
            return pwsh.to_string_lossy().into_owned();
        }
        if let Some(powershell) = find_in_path("powershell.exe") {
            return powershell.to_string_lossy().into_owned();
        }
        if let Ok(comspec) = std::env::var("COMSPEC") {
            if !comspec.is_empty() {
                return comspec;
            }
        }
        "cmd.exe".to_string()
    }

    #[cfg(not(windows))]
    {
        match std::env::var("SHELL") {
            Ok(shell) if !shell.is_empty() => shell,
            _ => "/bin/sh".to_string(),
        }
    }
}

/// Search `PATH` for an executable by file name.
#[must_use]
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell_is_nonempty() {
        assert!(!default_shell().is_empty());
    }

    #[test]
    fn test_find_in_path_misses_nonsense() {
        assert!(find_in_path("definitely-not-a-real-binary-9f3a").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path_locates_sh() {
        // Every POSIX box has sh somewhere on PATH.
        if std::env::var_os("PATH").is_some() {
            assert!(find_in_path("sh").is_some());
        }
    }
}
