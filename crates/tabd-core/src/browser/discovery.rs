use std::path::PathBuf;

/// Finds a browser executable: an explicit `override_path` wins outright; otherwise the first
/// existing path from a per-platform ordered candidate list.
pub fn find_executable(override_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        let path = PathBuf::from(path);
        return path.exists().then_some(path);
    }

    for candidate in candidates() {
        if candidate.starts_with('/') {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Some(path);
            }
        } else if let Ok(path) = which::which(candidate) {
            return Some(path);
        }
    }
    None
}

fn candidates() -> Vec<&'static str> {
    if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ]
    } else {
        vec![
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
            "brave-browser",
            "brave",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    }
}
