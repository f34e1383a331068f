//! Locating the `adb` executable.
//!
//! The search list is computed from an explicit [`SearchContext`] so the
//! policy can be checked without touching the real filesystem or
//! environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variables consulted while building the search list.
const SEARCH_ENV_VARS: [&str; 3] = ["ANDROID_SDK_ROOT", "ANDROID_HOME", "LOCALAPPDATA"];

/// Operating system family whose conventions the search follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// File name of the bridge executable.
    pub fn executable_name(&self) -> &'static str {
        match self {
            Self::Windows => "adb.exe",
            Self::Linux | Self::MacOs => "adb",
        }
    }

    /// Name of the per-OS subdirectory under a bundled `platform-tools`.
    fn bundle_dir(&self) -> &'static str {
        match self {
            Self::Windows => "win32",
            Self::MacOs => "darwin",
            Self::Linux => "linux",
        }
    }

    fn conventional_dirs(&self) -> &'static [&'static str] {
        match self {
            Self::Windows => &[
                r"C:\adb",
                r"C:\Android\platform-tools",
                r"C:\Program Files\Android\platform-tools",
            ],
            Self::MacOs => &[
                "/usr/local/bin",
                "/opt/android-sdk/platform-tools",
                "/opt/homebrew/bin",
            ],
            Self::Linux => &["/usr/local/bin", "/opt/android-sdk/platform-tools"],
        }
    }
}

/// Inputs to the executable search.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    /// Directory containing the running executable
    pub exe_dir: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl SearchContext {
    /// Captures the context of the current process.
    pub fn from_process() -> Self {
        let env = SEARCH_ENV_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.to_string(), value))
            })
            .collect();

        Self {
            exe_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            cwd: std::env::current_dir().ok(),
            home: dirs::home_dir(),
            env,
        }
    }

    fn env_dir(&self, name: &str) -> Option<PathBuf> {
        self.env.get(name).map(PathBuf::from)
    }
}

/// Candidate executable paths in priority order.
///
/// The last entry is always the bare executable name, resolved through the
/// OS search path when spawned.
pub fn search_paths(ctx: &SearchContext, platform: Platform) -> Vec<PathBuf> {
    let exe = platform.executable_name();
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Some(exe_dir) = &ctx.exe_dir {
        let tools = exe_dir.join("platform-tools");
        dirs.push(exe_dir.clone());
        dirs.push(tools.clone());
        dirs.push(tools.join(platform.bundle_dir()));
    }

    if let Some(cwd) = &ctx.cwd {
        dirs.push(cwd.join("platform-tools"));
    }

    dirs.extend(platform.conventional_dirs().iter().map(PathBuf::from));

    for var in ["ANDROID_SDK_ROOT", "ANDROID_HOME"] {
        if let Some(sdk) = ctx.env_dir(var) {
            dirs.push(sdk.join("platform-tools"));
        }
    }

    match platform {
        Platform::Linux => {
            if let Some(home) = &ctx.home {
                dirs.push(home.join("Android").join("Sdk").join("platform-tools"));
            }
        }
        Platform::MacOs => {
            if let Some(home) = &ctx.home {
                dirs.push(home.join("Library").join("Android").join("sdk").join("platform-tools"));
            }
        }
        Platform::Windows => {
            if let Some(local) = ctx.env_dir("LOCALAPPDATA") {
                dirs.push(local.join("Android").join("Sdk").join("platform-tools"));
            }
            if let Some(home) = &ctx.home {
                dirs.push(
                    home.join("AppData")
                        .join("Local")
                        .join("Android")
                        .join("Sdk")
                        .join("platform-tools"),
                );
            }
        }
    }

    let mut paths: Vec<PathBuf> = dirs.into_iter().map(|dir| dir.join(exe)).collect();
    paths.push(PathBuf::from(exe));
    paths
}

/// Picks the first candidate accepted by `exists`, falling back to the bare
/// executable name.
pub fn resolve_with<F>(ctx: &SearchContext, platform: Platform, exists: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let candidates = search_paths(ctx, platform);
    let bare = PathBuf::from(platform.executable_name());

    for candidate in candidates {
        if candidate == bare {
            break;
        }
        if exists(&candidate) {
            debug!(path = %candidate.display(), "Found bridge executable");
            return candidate;
        }
    }

    debug!(name = %bare.display(), "Falling back to bridge executable on PATH");
    bare
}

/// Locates the bridge executable for the current process and platform.
pub fn find_bridge_executable() -> PathBuf {
    resolve_with(&SearchContext::from_process(), Platform::current(), Path::is_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SearchContext {
        SearchContext {
            exe_dir: Some(PathBuf::from("/app/bin")),
            cwd: Some(PathBuf::from("/work")),
            home: Some(PathBuf::from("/home/tester")),
            env: HashMap::from([
                ("ANDROID_SDK_ROOT".to_string(), "/sdk/root".to_string()),
                ("ANDROID_HOME".to_string(), "/sdk/home".to_string()),
            ]),
        }
    }

    #[test]
    fn test_linux_search_order() {
        let paths = search_paths(&context(), Platform::Linux);
        let expected: Vec<PathBuf> = [
            "/app/bin/adb",
            "/app/bin/platform-tools/adb",
            "/app/bin/platform-tools/linux/adb",
            "/work/platform-tools/adb",
            "/usr/local/bin/adb",
            "/opt/android-sdk/platform-tools/adb",
            "/sdk/root/platform-tools/adb",
            "/sdk/home/platform-tools/adb",
            "/home/tester/Android/Sdk/platform-tools/adb",
            "adb",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_macos_includes_homebrew_and_library_sdk() {
        let paths = search_paths(&context(), Platform::MacOs);
        assert!(paths.contains(&PathBuf::from("/opt/homebrew/bin/adb")));
        assert!(paths.contains(&PathBuf::from(
            "/home/tester/Library/Android/sdk/platform-tools/adb"
        )));
        assert!(paths.contains(&PathBuf::from("/app/bin/platform-tools/darwin/adb")));
    }

    #[test]
    fn test_windows_uses_exe_name() {
        let mut ctx = context();
        ctx.env
            .insert("LOCALAPPDATA".to_string(), "/local".to_string());
        let paths = search_paths(&ctx, Platform::Windows);

        assert_eq!(paths.last(), Some(&PathBuf::from("adb.exe")));
        assert!(paths
            .iter()
            .all(|p| p.file_name().and_then(|n| n.to_str()) == Some("adb.exe")));
        assert!(paths.contains(&PathBuf::from("/local/Android/Sdk/platform-tools/adb.exe")));
    }

    #[test]
    fn test_windows_profile_sdk_follows_local_app_data() {
        let mut ctx = context();
        ctx.env
            .insert("LOCALAPPDATA".to_string(), "/local".to_string());
        let paths = search_paths(&ctx, Platform::Windows);

        let position = |target: &str| paths.iter().position(|p| p == Path::new(target));
        let local = position("/local/Android/Sdk/platform-tools/adb.exe").unwrap();
        let profile =
            position("/home/tester/AppData/Local/Android/Sdk/platform-tools/adb.exe").unwrap();
        assert_eq!(profile, local + 1);
    }

    #[test]
    fn test_empty_context_still_has_fallback() {
        let paths = search_paths(&SearchContext::default(), Platform::Linux);
        assert_eq!(paths.last(), Some(&PathBuf::from("adb")));
        assert!(!paths.iter().any(|p| p.starts_with("/app")));
    }

    #[test]
    fn test_resolve_with_first_existing_wins() {
        let found = resolve_with(&context(), Platform::Linux, |p| {
            p == Path::new("/sdk/home/platform-tools/adb")
                || p == Path::new("/home/tester/Android/Sdk/platform-tools/adb")
        });
        assert_eq!(found, PathBuf::from("/sdk/home/platform-tools/adb"));
    }

    #[test]
    fn test_resolve_with_nothing_found() {
        let found = resolve_with(&context(), Platform::Linux, |_| false);
        assert_eq!(found, PathBuf::from("adb"));
    }

    #[test]
    fn test_resolve_with_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("platform-tools");
        std::fs::create_dir_all(&tools).unwrap();
        std::fs::write(tools.join("adb"), b"").unwrap();

        let ctx = SearchContext {
            cwd: Some(dir.path().to_path_buf()),
            ..SearchContext::default()
        };
        let found = resolve_with(&ctx, Platform::Linux, Path::is_file);
        assert_eq!(found, tools.join("adb"));
    }
}
