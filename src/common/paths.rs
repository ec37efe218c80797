use directories::ProjectDirs;
use std::path::PathBuf;

/// Config file looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "configs/face-roster.toml";

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/face-roster/face-roster.toml")
}

pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "faceroster", "FaceRoster")
        .map(|dirs| dirs.config_dir().join("face-roster.toml"))
}

/// First existing config file: working directory, then per-user, then system.
pub fn resolve_config_file() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    if let Some(user) = user_config_file() {
        if user.exists() {
            return user;
        }
    }

    let system = system_config_file();
    if system.exists() {
        return system;
    }

    local
}
