//! Common utilities for pattern-discovery tests

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Workspace root holding the shipped `specs/` and `prompts/`
pub fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

/// Isolated state for one binary invocation
pub struct Sandbox {
    pub dir: TempDir,
    pub target: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target-repo");
        std::fs::create_dir_all(target.join("src")).unwrap();
        std::fs::write(target.join("src/main.py"), "print('hi')\n").unwrap();

        let config = format!(
            "rate_file: {}\nheartbeat_secs: 1\n",
            dir.path().join("rate_limit.json").display()
        );
        std::fs::write(dir.path().join("config.yaml"), config).unwrap();

        Self { dir, target }
    }

    pub fn rate_file(&self) -> PathBuf {
        self.dir.path().join("rate_limit.json")
    }

    /// The binary, pointed at the shipped knowledge base and this sandbox
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("pattern-discovery").unwrap();
        cmd.env("PATTERN_DISCOVERY_ROOT", project_root())
            .env_remove("PATTERN_DISCOVERY_MODEL")
            .env_remove("PATTERN_DISCOVERY_LOG")
            .env("PATTERN_DISCOVERY_TOOL", "pattern-discovery-missing-tool")
            .arg("--config")
            .arg(self.dir.path().join("config.yaml"))
            .arg("--target-path")
            .arg(&self.target);
        cmd
    }

    /// Write an executable shell script standing in for the external tool
    #[cfg(unix)]
    pub fn fake_tool(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

pub fn read_to_string(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
