//! Config file loading and path defaults.

use std::path::{Path, PathBuf};

use panepush_core::config::{ConfigError, PanepushConfig};

const APP_DIR: &str = "panepush";

/// Load and validate the config. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<PanepushConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(PanepushConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config = PanepushConfig::from_json(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Filesystem locations the runtime needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub socket: PathBuf,
    pub subscriptions: PathBuf,
    pub summary_log: PathBuf,
}

impl Paths {
    /// CLI flag > config file > environment default.
    pub fn resolve(cli_socket: Option<PathBuf>, config: &PanepushConfig) -> Self {
        let env = Env::from_process();
        Self {
            socket: cli_socket
                .or_else(|| config.socket_path.clone())
                .unwrap_or_else(|| env.socket_path()),
            subscriptions: config
                .subscriptions_path
                .clone()
                .unwrap_or_else(|| env.state_dir().join("subscriptions.json")),
            summary_log: config
                .notifications
                .summary
                .log_path
                .clone()
                .unwrap_or_else(|| env.state_dir().join("summary-events.jsonl")),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    Env::from_process().config_path()
}

/// Environment variables consulted for default paths.
#[derive(Debug, Clone, Default)]
struct Env {
    home: Option<String>,
    user: Option<String>,
    xdg_config_home: Option<String>,
    xdg_runtime_dir: Option<String>,
}

impl Env {
    fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            home: var("HOME"),
            user: var("USER"),
            xdg_config_home: var("XDG_CONFIG_HOME"),
            xdg_runtime_dir: var("XDG_RUNTIME_DIR"),
        }
    }

    fn home(&self) -> PathBuf {
        PathBuf::from(self.home.as_deref().unwrap_or("."))
    }

    fn config_path(&self) -> PathBuf {
        let base = match &self.xdg_config_home {
            Some(dir) => PathBuf::from(dir),
            None => self.home().join(".config"),
        };
        base.join(APP_DIR).join("config.json")
    }

    fn state_dir(&self) -> PathBuf {
        self.home().join(".local").join("state").join(APP_DIR)
    }

    /// Per-user socket path.
    fn socket_path(&self) -> PathBuf {
        if let Some(dir) = &self.xdg_runtime_dir {
            return PathBuf::from(dir).join(APP_DIR).join("panepushd.sock");
        }
        let user = self.user.as_deref().unwrap_or("unknown");
        PathBuf::from(format!("/tmp/panepush-{user}/panepushd.sock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env {
            home: Some("/home/ada".into()),
            user: Some("ada".into()),
            ..Default::default()
        }
    }

    #[test]
    fn config_path_prefers_xdg_config_home() {
        assert_eq!(
            env().config_path(),
            PathBuf::from("/home/ada/.config/panepush/config.json")
        );
        let xdg = Env {
            xdg_config_home: Some("/cfg".into()),
            ..env()
        };
        assert_eq!(xdg.config_path(), PathBuf::from("/cfg/panepush/config.json"));
    }

    #[test]
    fn socket_path_falls_back_to_per_user_tmp() {
        assert_eq!(
            env().socket_path(),
            PathBuf::from("/tmp/panepush-ada/panepushd.sock")
        );
        let runtime = Env {
            xdg_runtime_dir: Some("/run/user/1000".into()),
            ..env()
        };
        assert_eq!(
            runtime.socket_path(),
            PathBuf::from("/run/user/1000/panepush/panepushd.sock")
        );
    }

    #[test]
    fn state_files_live_under_local_state() {
        assert_eq!(
            env().state_dir().join("summary-events.jsonl"),
            PathBuf::from("/home/ada/.local/state/panepush/summary-events.jsonl")
        );
    }

    #[test]
    fn configured_paths_override_defaults() {
        let mut config = PanepushConfig::default();
        config.socket_path = Some("/from/config.sock".into());
        config.subscriptions_path = Some("/data/subs.json".into());
        config.notifications.summary.log_path = Some("/data/summaries.jsonl".into());

        let paths = Paths::resolve(None, &config);
        assert_eq!(paths.socket, PathBuf::from("/from/config.sock"));
        assert_eq!(paths.subscriptions, PathBuf::from("/data/subs.json"));
        assert_eq!(paths.summary_log, PathBuf::from("/data/summaries.jsonl"));

        let paths = Paths::resolve(Some("/from/cli.sock".into()), &config);
        assert_eq!(paths.socket, PathBuf::from("/from/cli.sock"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("absent.json")).expect("defaults");
        assert_eq!(config, PanepushConfig::default());
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"notifications": {"cooldownMs": 0, "summary": {"enabled": true}}}"#,
        )
        .expect("write");

        let config = load_config(&path).expect("load");
        assert_eq!(config.notifications.cooldown_ms, 0);
        assert!(config.notifications.summary.enabled);
        assert_eq!(config.notifications.retry.max_attempts, 3);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"notifications": {"retry": {"maxAttempts": 0}}}"#)
            .expect("write");
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    }
}
