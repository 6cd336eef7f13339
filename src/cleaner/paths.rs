use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PathsConfig;

/// Every user home directory on the machine: the children of each
/// configured home root, plus the service's own home.
pub fn user_homes(config: &PathsConfig) -> Vec<PathBuf> {
    let mut homes = Vec::new();

    for root in &config.home_roots {
        match fs::read_dir(root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        homes.push(path);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Cannot enumerate home root '{}': {}", root.display(), e);
            }
        }
    }

    match dirs::home_dir() {
        Some(own) if !homes.contains(&own) => homes.push(own),
        Some(_) => {}
        None => tracing::warn!("No home directory for the current user"),
    }

    homes
}

/// Existing drop folders: `<home>/<drop_dir>` for every user home.
pub fn drop_roots(config: &PathsConfig, drop_dir: &str) -> Vec<PathBuf> {
    user_homes(config)
        .into_iter()
        .map(|home| home.join(drop_dir))
        .filter(|path| path.is_dir())
        .collect()
}

/// Existing root configuration directories holding product logs:
/// `<home>/<dir>` for every user home and every configured directory name.
pub fn root_log_dirs(config: &PathsConfig) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for home in user_homes(config) {
        for name in &config.root_log_dirs {
            let path = home.join(name);
            if path.is_dir() && !dirs.contains(&path) {
                dirs.push(path);
            }
        }
    }
    dirs
}

/// The product's log-naming convention: `VBox*.log*` (rotated logs such as
/// `VBox.log.1` included).
pub fn is_vbox_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("VBox") && name.contains(".log"))
}

/// Whether `dir` has a `Logs` subdirectory with at least one product log.
pub fn has_vbox_logs(dir: &Path) -> bool {
    let logs = dir.join("Logs");
    match fs::read_dir(&logs) {
        Ok(entries) => entries.flatten().any(|entry| is_vbox_log(&entry.path())),
        Err(_) => false,
    }
}

/// Mask a file name for logging: keep the first character and separators,
/// star out the rest. The log must not reproduce user file names.
pub fn masked_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 || "_-.".contains(c) {
                c
            } else {
                '*'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn vbox_log_naming_convention() {
        assert!(is_vbox_log(Path::new("/x/VBox.log")));
        assert!(is_vbox_log(Path::new("/x/VBoxHardening.log")));
        assert!(is_vbox_log(Path::new("/x/VBox.log.1")));

        assert!(!is_vbox_log(Path::new("/x/vbox.log")));
        assert!(!is_vbox_log(Path::new("/x/VBox.txt")));
        assert!(!is_vbox_log(Path::new("/x/system.log")));
    }

    #[test]
    fn detects_logs_subdirectory() {
        let tmp = TempDir::new().unwrap();
        let vm = tmp.path().join("vm");
        fs::create_dir_all(vm.join("Logs")).unwrap();

        assert!(!has_vbox_logs(&vm));

        fs::write(vm.join("Logs/VBox.log"), "data").unwrap();
        assert!(has_vbox_logs(&vm));
    }

    #[test]
    fn missing_logs_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(!has_vbox_logs(tmp.path()));
    }

    #[test]
    fn masked_name_hides_content() {
        assert_eq!(masked_name("secret-report.pdf"), "s*****-******.***");
        assert_eq!(masked_name("a"), "a");
        assert_eq!(masked_name(""), "");
    }

    #[test]
    fn homes_from_configured_roots() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("alice")).unwrap();
        fs::create_dir(tmp.path().join("bob")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a home").unwrap();

        let config = PathsConfig {
            home_roots: vec![tmp.path().to_path_buf()],
            ..PathsConfig::default()
        };

        let homes = user_homes(&config);
        assert!(homes.contains(&tmp.path().join("alice")));
        assert!(homes.contains(&tmp.path().join("bob")));
        assert!(!homes.contains(&tmp.path().join("notes.txt")));
    }

    #[test]
    fn drop_roots_require_existing_directories() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("alice");
        fs::create_dir_all(home.join(".cache/VirtualBox Dropped Files")).unwrap();
        fs::create_dir(tmp.path().join("bob")).unwrap();

        let config = PathsConfig {
            home_roots: vec![tmp.path().to_path_buf()],
            ..PathsConfig::default()
        };

        let roots = drop_roots(&config, ".cache/VirtualBox Dropped Files");
        assert!(roots.contains(&home.join(".cache/VirtualBox Dropped Files")));
        // bob has no drop folder
        assert!(!roots.iter().any(|p| p.starts_with(tmp.path().join("bob"))));
    }

    #[test]
    fn root_log_dirs_cover_both_conventions() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("alice");
        fs::create_dir_all(home.join(".config/VirtualBox")).unwrap();
        fs::create_dir_all(home.join(".VirtualBox")).unwrap();

        let config = PathsConfig {
            home_roots: vec![tmp.path().to_path_buf()],
            ..PathsConfig::default()
        };

        let dirs = root_log_dirs(&config);
        assert!(dirs.contains(&home.join(".config/VirtualBox")));
        assert!(dirs.contains(&home.join(".VirtualBox")));
    }
}
