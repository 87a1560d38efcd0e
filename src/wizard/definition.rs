//! Wizard definition files.
//!
//! A definition declares a wizard's steps, rules, views and labels in YAML,
//! JSON or TOML (picked by file extension). Handlers and record hooks are
//! code, so hosts add them to the builder returned by
//! [`WizardDefinition::into_builder`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::wizard::config::{
    CommitPolicy, ConfigError, FormStepConfig, FormStepConfigBuilder, Mode, StepPresentation,
    Strictness,
};
use crate::wizard::render::{StepView, ViewSource};
use crate::wizard::rules::FieldRules;
use crate::wizard::step::StepId;

/// Serialization format of a definition file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
    Toml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(DefinitionFormat::Yaml),
            "json" => Some(DefinitionFormat::Json),
            "toml" => Some(DefinitionFormat::Toml),
            _ => None,
        }
    }
}

/// A step view as written in a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewSpec {
    /// Handlebars template file, relative to the definition file
    File(PathBuf),
    /// Inline handlebars template
    Template(String),
}

fn default_true() -> bool {
    true
}

/// Declarative wizard description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WizardDefinition {
    /// Form id; defaults to the file stem
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepId>,
    #[serde(default)]
    pub total_steps: Option<usize>,
    #[serde(default)]
    pub init_step: Option<StepId>,
    #[serde(default)]
    pub required_save_steps: Vec<StepId>,
    #[serde(default = "default_true")]
    pub allow_navigation: bool,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<i64>,
    #[serde(default)]
    pub session_prefix: Option<String>,
    #[serde(default)]
    /// Fields keep their declared order
    pub validation_rules: HashMap<StepId, IndexMap<String, FieldRules>>,
    #[serde(default)]
    pub views: HashMap<StepId, ViewSpec>,
    #[serde(default)]
    pub titles: HashMap<StepId, String>,
    /// Titles and button labels; a title here overrides `titles`
    #[serde(default)]
    pub presentation: HashMap<StepId, StepPresentation>,
    /// Shorthand for [`Strictness::STRICT`]
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub strictness: Option<Strictness>,
    #[serde(default)]
    pub commit_policy: Option<CommitPolicy>,
}

impl WizardDefinition {
    /// Parse a definition from text
    pub fn parse(content: &str, format: DefinitionFormat) -> Result<Self> {
        let definition = match format {
            DefinitionFormat::Yaml => serde_yaml::from_str(content)?,
            DefinitionFormat::Json => serde_json::from_str(content)?,
            DefinitionFormat::Toml => toml::from_str(content)?,
        };
        Ok(definition)
    }

    /// Read a definition file, filling in the id from the file stem
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let fail = |message: String| ConfigError::Definition {
            path: path.display().to_string(),
            message,
        };

        let format = DefinitionFormat::from_path(path)
            .ok_or_else(|| fail("unsupported file extension".to_string()))?;
        let content = fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let mut definition = Self::parse(&content, format).map_err(|e| fail(e.to_string()))?;

        if definition.id.is_empty() {
            definition.id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        if definition.id.is_empty() {
            return Err(fail("definition has no id".to_string()));
        }
        Ok(definition)
    }

    pub fn effective_strictness(&self) -> Strictness {
        match self.strictness {
            Some(strictness) => strictness,
            None if self.strict => Strictness::STRICT,
            None => Strictness::PERMISSIVE,
        }
    }

    /// Turn the definition into a builder. Relative view files resolve
    /// against `base_dir`.
    pub fn into_builder(self, base_dir: &Path) -> Result<FormStepConfigBuilder, ConfigError> {
        let strictness = self.effective_strictness();
        let mode = match self.mode.as_deref() {
            Some(mode) => mode.parse::<Mode>()?,
            None => Mode::default(),
        };

        let mut builder = FormStepConfig::builder()
            .steps(self.steps)
            .required_save_steps(self.required_save_steps)
            .allow_navigation(self.allow_navigation)
            .mode(mode)
            .strictness(strictness);

        if let Some(n) = self.total_steps {
            builder = builder.total_steps(n);
        }
        if let Some(step) = self.init_step {
            builder = builder.init_step(step);
        }
        if let Some(id) = self.correlation_id {
            builder = builder.correlation_id(id);
        }
        if let Some(prefix) = self.session_prefix {
            builder = builder.session_prefix(prefix);
        }
        if let Some(policy) = self.commit_policy {
            builder = builder.commit_policy(policy);
        }

        for (step, fields) in self.validation_rules {
            builder = builder.rules(step, fields);
        }

        for (step, spec) in self.views {
            let source = match spec {
                ViewSpec::File(path) if path.is_relative() => ViewSource::File(base_dir.join(path)),
                ViewSpec::File(path) => ViewSource::File(path),
                ViewSpec::Template(source) => ViewSource::Inline(source),
            };
            let view = source
                .load(&format!("{}_step_{}", self.id, step))
                .map_err(|e| ConfigError::Definition {
                    path: base_dir.display().to_string(),
                    message: format!("{:#}", e),
                })?;
            let view: Arc<dyn StepView> = Arc::new(view);
            builder = builder.shared_view(step, view);
        }

        let mut presentation: HashMap<StepId, StepPresentation> = self
            .titles
            .into_iter()
            .map(|(step, title)| (step, StepPresentation::titled(title)))
            .collect();
        for (step, p) in self.presentation {
            let entry = presentation.entry(step).or_default();
            let title = p.title.or_else(|| entry.title.take());
            *entry = StepPresentation { title, ..p };
        }
        for (step, p) in presentation {
            builder = builder.presentation(step, p);
        }

        Ok(builder)
    }

    pub fn into_config(self, base_dir: &Path) -> Result<FormStepConfig, ConfigError> {
        self.into_builder(base_dir)?.build()
    }
}

/// A wizard loaded from a definition file
#[derive(Debug, Clone)]
pub struct LoadedWizard {
    pub id: String,
    pub description: Option<String>,
    pub source: PathBuf,
    pub config: Arc<FormStepConfig>,
}

/// Load and build a single definition file. `default_prefix` applies when
/// the definition does not set a session prefix.
pub fn load_definition(path: &Path, default_prefix: &str) -> Result<LoadedWizard, ConfigError> {
    let mut definition = WizardDefinition::from_file(path)?;
    if definition.session_prefix.is_none() {
        definition.session_prefix = Some(default_prefix.to_string());
    }
    let id = definition.id.clone();
    let description = definition.description.clone();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let config = definition.into_config(base_dir)?;

    Ok(LoadedWizard {
        id,
        description,
        source: path.to_path_buf(),
        config: Arc::new(config),
    })
}

/// Load every definition file in a directory.
///
/// Files that fail to load are logged and skipped. A missing directory
/// yields no wizards.
pub fn load_definitions(dir: &Path, default_prefix: &str) -> Result<BTreeMap<String, LoadedWizard>> {
    let mut wizards = BTreeMap::new();

    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "Forms directory does not exist");
        return Ok(wizards);
    }

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read forms directory: {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() || DefinitionFormat::from_path(&path).is_none() {
            continue;
        }

        match load_definition(&path, default_prefix) {
            Ok(wizard) => {
                if wizards.contains_key(&wizard.id) {
                    tracing::warn!(id = %wizard.id, file = %path.display(), "Duplicate form id, skipping");
                    continue;
                }
                tracing::debug!(id = %wizard.id, steps = wizard.config.total_steps(), "Loaded form definition");
                wizards.insert(wizard.id.clone(), wizard);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to load form definition");
            }
        }
    }

    Ok(wizards)
}
