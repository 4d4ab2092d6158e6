use std::env;
use std::path::PathBuf;

use itertools::Itertools;

use crate::runner::traits::RunnerError;

/// Directories always searched, ahead of `$PATH`.
pub const SYSTEM_BIN_PATHS: [&str; 7] = [
    "/usr/libexec",
    "/usr/local/sbin",
    "/usr/local/bin",
    "/usr/sbin",
    "/usr/bin",
    "/sbin",
    "/bin",
];

/// Locate a bare command name on the system, paranoid version.
///
/// Searches the fixed system binary directories unioned with `$PATH`,
/// first-seen order, duplicates removed. Returns the first existing
/// regular file as an absolute path. The full searched list travels in
/// the error so a miss is diagnosable.
pub fn find_command(cmd: &str) -> Result<PathBuf, RunnerError> {
    let searched = search_dirs();

    for dir in &searched {
        let candidate = dir.join(cmd);
        if candidate.is_file() {
            return Ok(std::path::absolute(&candidate).unwrap_or(candidate));
        }
    }

    Err(RunnerError::NotFound {
        command: cmd.to_string(),
        searched,
    })
}

fn search_dirs() -> Vec<PathBuf> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    SYSTEM_BIN_PATHS
        .iter()
        .map(PathBuf::from)
        .chain(env::split_paths(&path_var))
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command_returns_absolute_path() {
        // `sh` exists on any host this harness targets
        let path = find_command("sh").expect("sh should be locatable");
        assert!(path.is_absolute());
        assert!(path.is_file());
    }

    #[test]
    fn test_find_command_miss_lists_searched_dirs() {
        let err = find_command("definitely-not-a-real-binary-4242").unwrap_err();
        match err {
            RunnerError::NotFound { command, searched } => {
                assert_eq!(command, "definitely-not-a-real-binary-4242");
                assert!(searched.iter().any(|p| p == &PathBuf::from("/usr/bin")));
                assert!(searched.iter().any(|p| p == &PathBuf::from("/bin")));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_search_dirs_deduplicates_preserving_order() {
        let dirs = search_dirs();
        let mut seen = std::collections::HashSet::new();
        for dir in &dirs {
            assert!(seen.insert(dir), "duplicate dir in search list: {:?}", dir);
        }
        // fixed system dirs come first, in declaration order
        assert_eq!(dirs[0], PathBuf::from("/usr/libexec"));
        assert_eq!(dirs[1], PathBuf::from("/usr/local/sbin"));
    }
}
