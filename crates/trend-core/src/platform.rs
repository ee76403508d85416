use std::path::PathBuf;

const APP_DIR: &str = "trendline";

/// Overrides every directory below when set (tests, containers).
pub const HOME_ENV: &str = "TRENDLINE_HOME";

fn home_override() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn data_dir() -> PathBuf {
    if let Some(home) = home_override() {
        return home.join("data");
    }
    // On macOS and Linux, use ~/.local/share/trendline/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(home) = home_override() {
        return home;
    }
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn cache_dir() -> PathBuf {
    if let Some(home) = home_override() {
        return home.join("cache");
    }
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".cache")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }
}
