/// Language Profile Registry - Language → Sandbox Image + Run Command
///
/// **Core Responsibility:**
/// Static per-language knowledge: sandbox image, source file name and the
/// command run inside the container. Profiles come from a JSON file layered
/// over the builtin set, with a fallback echo profile for anything unknown.

use anyhow::{bail, Context, Result};
use codegrade_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Sidecar file holding stdin inside the workspace
pub const INPUT_FILE: &str = "input.txt";

const PYTHON_STDIN_PRELUDE: &str = "import sys\n\
import io\n\
with open('/code/input.txt', 'r') as f:\n    input_data = f.read()\n\
sys.stdin = io.StringIO(input_data)\n\
# Submitted code below:\n";

/// How a program receives stdin from the sidecar file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StdinStrategy {
    /// Shell redirect appended to the run command
    #[default]
    Redirect,
    /// Source rewritten so the program opens the sidecar file itself
    Prelude { prelude: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub image: String,
    pub file_name: String,
    pub extension: String,
    /// Shell tokens joined with spaces and run through `sh -c`
    pub run_command: Vec<String>,
    #[serde(default)]
    pub stdin: StdinStrategy,
}

impl LanguageProfile {
    pub fn new(image: &str, file_name: &str, extension: &str, run_command: &[&str]) -> Self {
        Self {
            image: image.to_string(),
            file_name: file_name.to_string(),
            extension: extension.to_string(),
            run_command: run_command.iter().map(|t| t.to_string()).collect(),
            stdin: StdinStrategy::Redirect,
        }
    }

    pub fn with_stdin(mut self, stdin: StdinStrategy) -> Self {
        self.stdin = stdin;
        self
    }

    /// Command line handed to `sh -c`
    pub fn shell_command(&self, has_input: bool) -> String {
        let mut command = self.run_command.join(" ");
        if has_input && self.stdin == StdinStrategy::Redirect {
            command.push_str(" < ");
            command.push_str(INPUT_FILE);
        }
        command
    }

    /// Source text as written to disk
    pub fn prepare_source(&self, source: &str, has_input: bool) -> String {
        match &self.stdin {
            StdinStrategy::Prelude { prelude } if has_input => format!("{}{}", prelude, source),
            _ => source.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    language: Language,
    #[serde(flatten)]
    profile: LanguageProfile,
}

#[derive(Debug, Deserialize)]
struct LanguagesFile {
    languages: Vec<LanguageEntry>,
}

/// Registry of language profiles, built once at startup and shared read-only
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: HashMap<Language, LanguageProfile>,
    fallback: LanguageProfile,
}

impl LanguageRegistry {
    /// Registry with nothing but the fallback profile
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            fallback: LanguageProfile::new(
                "alpine:latest",
                "main.txt",
                ".txt",
                &["echo", "Unsupported language"],
            ),
        }
    }

    pub fn builtin() -> Self {
        let python =
            LanguageProfile::new("amancevice/pandas", "main.py", ".py", &["python", "main.py"])
                .with_stdin(StdinStrategy::Prelude {
                    prelude: PYTHON_STDIN_PRELUDE.to_string(),
                });

        Self::empty()
            .with_profile(
                Language::Java,
                LanguageProfile::new(
                    "openjdk:17-slim",
                    "Main.java",
                    ".java",
                    &["javac", "Main.java", "&&", "java", "Main"],
                ),
            )
            .with_profile(Language::Python, python)
            .with_profile(
                Language::C,
                LanguageProfile::new(
                    "gcc:latest",
                    "main.c",
                    ".c",
                    &["gcc", "main.c", "-o", "main", "&&", "./main"],
                ),
            )
            .with_profile(
                Language::Cpp,
                LanguageProfile::new(
                    "gcc:latest",
                    "main.cpp",
                    ".cpp",
                    &["g++", "main.cpp", "-o", "main", "&&", "./main"],
                ),
            )
            .with_profile(
                Language::JavaScript,
                LanguageProfile::new("node:16-slim", "main.js", ".js", &["node", "main.js"]),
            )
            .with_profile(
                Language::TypeScript,
                LanguageProfile::new(
                    "node:16-slim",
                    "main.ts",
                    ".ts",
                    &["tsc", "main.ts", "&&", "node", "main.js"],
                ),
            )
            .with_profile(
                Language::Kotlin,
                LanguageProfile::new(
                    "openjdk:17-slim",
                    "main.kt",
                    ".kt",
                    &[
                        "kotlinc",
                        "main.kt",
                        "-include-runtime",
                        "-d",
                        "main.jar",
                        "&&",
                        "java",
                        "-jar",
                        "main.jar",
                    ],
                ),
            )
            .with_profile(
                Language::Ruby,
                LanguageProfile::new("ruby:3.0-slim", "main.rb", ".rb", &["ruby", "main.rb"]),
            )
            .with_profile(
                Language::Rust,
                LanguageProfile::new(
                    "rust:1.55-slim",
                    "main.rs",
                    ".rs",
                    &["rustc", "main.rs", "&&", "./main"],
                ),
            )
            .with_profile(
                Language::Go,
                LanguageProfile::new(
                    "golang:1.17-alpine",
                    "main.go",
                    ".go",
                    &["go", "run", "main.go"],
                ),
            )
            .with_profile(
                Language::Swift,
                LanguageProfile::new("swift:5.5", "main.swift", ".swift", &["swift", "main.swift"]),
            )
            .with_profile(
                Language::Php,
                LanguageProfile::new("php:8.0-cli", "main.php", ".php", &["php", "main.php"]),
            )
            .with_profile(
                Language::Sql,
                LanguageProfile::new("keinos/sqlite3", "query.sql", ".sql", &["sqlite3", "app.db"]),
            )
    }

    /// Builtin profiles overlaid with the entries of a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let file: LanguagesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let mut registry = Self::builtin();
        for entry in file.languages {
            registry.profiles.insert(entry.language, entry.profile);
        }

        Ok(registry)
    }

    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let registry = Self::load(config_path)?;
            info!(path = %config_path.display(), "Loaded language profiles");
            Ok(registry)
        } else {
            warn!(
                path = %config_path.display(),
                "Language config not found, using builtin profiles"
            );
            Ok(Self::builtin())
        }
    }

    pub fn with_profile(mut self, language: Language, profile: LanguageProfile) -> Self {
        self.profiles.insert(language, profile);
        self
    }

    /// Total lookup: unregistered languages get the generic fallback
    pub fn profile_for(&self, language: Language) -> &LanguageProfile {
        self.profiles.get(&language).unwrap_or(&self.fallback)
    }

    pub fn is_registered(&self, language: Language) -> bool {
        self.profiles.contains_key(&language)
    }

    /// Registered languages, sorted
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.profiles.keys().copied().collect();
        languages.sort();
        languages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_every_language_resolves() {
        let registry = LanguageRegistry::builtin();
        for language in Language::ALL {
            let profile = registry.profile_for(language);
            assert!(!profile.image.is_empty());
            assert!(!profile.run_command.is_empty());
        }
    }

    #[test]
    fn test_unregistered_language_falls_back() {
        let registry = LanguageRegistry::builtin();
        assert!(!registry.is_registered(Language::Haskell));

        let profile = registry.profile_for(Language::Haskell);
        assert_eq!(profile.image, "alpine:latest");
        assert_eq!(profile.shell_command(false), "echo Unsupported language");
    }

    #[test]
    fn test_compiled_languages_chain_commands() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(
            registry.profile_for(Language::Java).shell_command(false),
            "javac Main.java && java Main"
        );
        assert_eq!(
            registry.profile_for(Language::Cpp).shell_command(true),
            "g++ main.cpp -o main && ./main < input.txt"
        );
    }

    #[test]
    fn test_python_reads_input_through_prelude() {
        let python = LanguageRegistry::builtin().profile_for(Language::Python).clone();

        assert_eq!(python.shell_command(true), "python main.py");

        let source = python.prepare_source("print(input())", true);
        assert!(source.starts_with("import sys\n"));
        assert!(source.contains("open('/code/input.txt', 'r')"));
        assert!(source.ends_with("print(input())"));

        assert_eq!(python.prepare_source("print(1)", false), "print(1)");
    }

    #[test]
    fn test_load_overlays_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = serde_json::json!({
            "languages": [{
                "language": "HASKELL",
                "image": "haskell:9",
                "file_name": "main.hs",
                "extension": ".hs",
                "run_command": ["runghc", "main.hs"]
            }]
        });
        write!(file, "{}", config).unwrap();

        let registry = LanguageRegistry::load(file.path()).unwrap();
        assert!(registry.is_registered(Language::Haskell));
        assert_eq!(registry.profile_for(Language::Haskell).image, "haskell:9");
        assert_eq!(
            registry.profile_for(Language::Haskell).stdin,
            StdinStrategy::Redirect
        );
        // untouched builtin entries survive
        assert_eq!(registry.profile_for(Language::Ruby).image, "ruby:3.0-slim");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = LanguageRegistry::load(Path::new("/nonexistent/languages.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/languages.json");
        let registry = LanguageRegistry::load(&path).unwrap();
        assert_eq!(registry.languages(), LanguageRegistry::builtin().languages());
    }
}
