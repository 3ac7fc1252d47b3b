//! Chromium discovery and launch.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// Install locations under `~/.guidewalk`, most specific first.
#[cfg(target_os = "macos")]
const MANAGED_INSTALLS: &[&str] = &[
    "chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
    "chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
    "chromium/chrome",
];
#[cfg(not(target_os = "macos"))]
const MANAGED_INSTALLS: &[&str] = &["chromium/chrome-linux64/chrome", "chromium/chrome"];

/// Executable names looked up on `PATH`.
const PATH_NAMES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

/// Fixed system locations tried last.
#[cfg(target_os = "macos")]
const SYSTEM_INSTALLS: &[&str] = &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"];
#[cfg(not(target_os = "macos"))]
const SYSTEM_INSTALLS: &[&str] = &["/usr/bin/chromium", "/snap/bin/chromium"];

/// Locate a Chromium executable.
///
/// An existing `explicit` path wins. After it come the managed installs
/// under `~/.guidewalk`, then `PATH`, then the fixed system locations.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    let home = dirs::home_dir().map(|h| h.join(".guidewalk"));
    let managed = home
        .iter()
        .flat_map(|root| MANAGED_INSTALLS.iter().map(move |rel| root.join(rel)));

    explicit
        .map(Path::to_path_buf)
        .into_iter()
        .chain(managed)
        .find(|p| p.is_file())
        .or_else(|| PATH_NAMES.iter().find_map(|name| which::which(name).ok()))
        .or_else(|| SYSTEM_INSTALLS.iter().map(PathBuf::from).find(|p| p.is_file()))
}

/// A launched browser and the task pumping its CDP events.
pub struct LaunchedBrowser {
    pub browser: Browser,
    pub handler: JoinHandle<()>,
}

/// Launch Chromium with the flags the portal tolerates.
pub async fn launch(chrome_path: Option<&Path>, headless: bool) -> Result<LaunchedBrowser> {
    let executable = find_chromium(chrome_path)
        .context("Chromium not found. Set GUIDEWALK_CHROME_PATH or install google-chrome.")?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(executable)
        .window_size(1920, 1080)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions");
    builder = if headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("failed to launch Chromium")?;

    let handler = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            let _ = event;
        }
    });

    Ok(LaunchedBrowser { browser, handler })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(find_chromium(Some(&fake)), Some(fake));
    }

    #[test]
    fn test_explicit_directory_is_not_an_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert_ne!(find_chromium(Some(dir.path())), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_missing_explicit_path_is_skipped() {
        let found = find_chromium(Some(Path::new("/nonexistent/chrome")));
        assert_ne!(found, Some(PathBuf::from("/nonexistent/chrome")));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_launch_headless() {
        let launched = launch(None, true).await.expect("failed to launch");
        let page = launched.browser.new_page("about:blank").await.expect("no page");
        let title: String = page
            .evaluate("document.title = 'ok'")
            .await
            .expect("eval failed")
            .into_value()
            .expect("not a string");
        assert_eq!(title, "ok");
        launched.handler.abort();
    }
}
