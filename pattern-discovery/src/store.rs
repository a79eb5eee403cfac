//! Spec and prompt store
//!
//! Reads the static knowledge base from disk at invocation time:
//! - `specs/*.yaml` and `specs/<group>/*.yaml` pattern specifications
//! - `prompts/*.md` prompt templates

use pattern_discovery_sdk::{AnalysisCategory, SpecFile};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Main specs shown first in the catalogue, in this order
const MAIN_SPECS: [(&str, &str); 3] = [
    ("algorithms-data-structures-spec.yaml", "Algorithms & Data Structures"),
    ("design-patterns-spec.yaml", "Design Patterns"),
    ("cloud-architecture-spec.yaml", "Cloud Architecture"),
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Spec file not found: {}", .0.display())]
    SpecNotFound(PathBuf),

    #[error("Prompt template not found: {}", .0.display())]
    PromptNotFound(PathBuf),

    #[error("Malformed YAML in {}: {source}", .path.display())]
    MalformedYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid spec {}: {reason}", .path.display())]
    InvalidSpec { path: PathBuf, reason: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One row of the spec catalogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEntry {
    pub group: String,
    pub file: String,
    pub description: String,
    /// Location relative to `specs/`
    pub path: PathBuf,
}

/// Read-only view over a knowledge-base root
#[derive(Debug, Clone)]
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.root.join("specs")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    /// Load and validate a YAML spec relative to `specs/`
    pub fn load_spec(&self, file: impl AsRef<Path>) -> Result<SpecFile, StoreError> {
        let path = self.specs_dir().join(file);
        if !path.is_file() {
            return Err(StoreError::SpecNotFound(path));
        }

        let text = read(&path)?;
        parse_spec(&path, &text)
    }

    /// Load a raw prompt template relative to `prompts/`
    pub fn load_prompt(&self, file: impl AsRef<Path>) -> Result<String, StoreError> {
        let path = self.prompts_dir().join(file);
        if !path.is_file() {
            return Err(StoreError::PromptNotFound(path));
        }

        read(&path)
    }

    pub fn spec_for(&self, category: AnalysisCategory) -> Result<SpecFile, StoreError> {
        self.load_spec(category.spec_file())
    }

    pub fn prompt_for(&self, category: AnalysisCategory) -> Result<String, StoreError> {
        self.load_prompt(category.prompt_file())
    }

    /// Catalogue of available specs
    ///
    /// Main specs come first in a fixed order, then every `*.yaml` found in
    /// a sub-directory of `specs/`, sorted by directory and file name.
    pub fn list_specs(&self) -> Result<Vec<SpecEntry>, StoreError> {
        let specs_dir = self.specs_dir();
        let mut entries = Vec::new();

        for (file, description) in MAIN_SPECS {
            if specs_dir.join(file).is_file() {
                entries.push(SpecEntry {
                    group: "Main".to_string(),
                    file: file.to_string(),
                    description: description.to_string(),
                    path: PathBuf::from(file),
                });
            }
        }

        if !specs_dir.is_dir() {
            return Ok(entries);
        }

        let mut subdirs = read_dir_sorted(&specs_dir)?;
        subdirs.retain(|p| p.is_dir());

        for subdir in subdirs {
            let dir_name = match subdir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let group = title_case(&dir_name);

            for spec in read_dir_sorted(&subdir)? {
                let is_yaml = spec.extension().and_then(|e| e.to_str()) == Some("yaml");
                if !spec.is_file() || !is_yaml {
                    continue;
                }
                if let Some(file) = spec.file_name().and_then(|n| n.to_str()) {
                    entries.push(SpecEntry {
                        group: group.clone(),
                        file: file.to_string(),
                        description: format!("{} Pattern", group),
                        path: PathBuf::from(&dir_name).join(file),
                    });
                }
            }
        }

        Ok(entries)
    }

    /// Every catalogued spec file, relative to `specs/`
    pub fn all_spec_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self.list_specs()?.into_iter().map(|e| e.path).collect())
    }
}

/// Parse YAML text into a validated spec
pub fn parse_spec(path: &Path, text: &str) -> Result<SpecFile, StoreError> {
    let spec: SpecFile = serde_yaml::from_str(text).map_err(|source| {
        debug!(
            path = %path.display(),
            preview = %text.chars().take(500).collect::<String>(),
            "YAML parsing failed"
        );
        StoreError::MalformedYaml {
            path: path.to_path_buf(),
            source,
        }
    })?;

    spec.validate().map_err(|reason| StoreError::InvalidSpec {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok(spec)
}

fn read(path: &Path) -> Result<String, StoreError> {
    std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}

/// "service-collaboration" -> "Service Collaboration"
fn title_case(name: &str) -> String {
    name.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
