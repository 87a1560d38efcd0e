//! Step views and page chrome.
//!
//! Step markup comes from a [`StepView`]: any render function, or a
//! handlebars template via [`TemplateView`]. The wizard wraps it with a
//! progress bar, the error list and navigation buttons.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use handlebars::{html_escape, Handlebars};
use serde::Serialize;

use crate::wizard::config::{FormStepConfig, Mode};
use crate::wizard::request::StepData;
use crate::wizard::step::StepId;
use crate::wizard::FormErrors;

/// Everything a step view may use to render itself
#[derive(Debug, Clone, Serialize)]
pub struct ViewContext {
    pub step: StepId,
    pub step_index: usize,
    pub total_steps: usize,
    pub title: Option<String>,
    pub data: StepData,
    pub errors: FormErrors,
    /// Flattened error messages, handy in templates
    pub error_messages: Vec<String>,
    pub correlation_id: Option<i64>,
    pub mode: Mode,
    pub is_first: bool,
    pub is_last: bool,
}

/// Renders one step's form markup
pub trait StepView: Send + Sync {
    fn render(&self, ctx: &ViewContext) -> Result<String>;
}

impl<F> StepView for F
where
    F: Fn(&ViewContext) -> Result<String> + Send + Sync,
{
    fn render(&self, ctx: &ViewContext) -> Result<String> {
        self(ctx)
    }
}

/// A step view backed by a handlebars template
pub struct TemplateView {
    name: String,
    registry: Handlebars<'static>,
}

impl TemplateView {
    /// Compile an inline template
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry
            .register_template_string(&name, source)
            .with_context(|| format!("Failed to compile step template '{}'", name))?;
        Ok(Self { name, registry })
    }

    /// Compile a template file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read step template {}", path.display()))?;
        Self::from_source(path.display().to_string(), &source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl StepView for TemplateView {
    fn render(&self, ctx: &ViewContext) -> Result<String> {
        self.registry
            .render(&self.name, ctx)
            .with_context(|| format!("Failed to render step template '{}'", self.name))
    }
}

/// Where a step view comes from in a definition file
#[derive(Debug, Clone, PartialEq)]
pub enum ViewSource {
    File(PathBuf),
    Inline(String),
}

impl ViewSource {
    pub fn load(&self, name: &str) -> Result<TemplateView> {
        match self {
            ViewSource::File(path) => TemplateView::from_file(path),
            ViewSource::Inline(source) => TemplateView::from_source(name, source),
        }
    }
}

/// Where the user is in the wizard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub current_index: usize,
    pub total_steps: usize,
    pub step_names: Vec<String>,
    pub completed: Vec<String>,
}

impl Progress {
    pub fn new(config: &FormStepConfig, current: &StepId, completed: &[StepId]) -> Self {
        Self {
            current_index: config.index_of(current).unwrap_or(0),
            total_steps: config.total_steps(),
            step_names: config.steps().iter().map(ToString::to_string).collect(),
            completed: completed.iter().map(ToString::to_string).collect(),
        }
    }

    /// One-based position of the current step
    pub fn position(&self) -> usize {
        self.current_index + 1
    }

    /// Share of the wizard reached, counting the current step
    pub fn percentage(&self) -> u8 {
        if self.total_steps == 0 {
            100
        } else {
            ((self.position() as f32 / self.total_steps as f32) * 100.0) as u8
        }
    }

    /// Format as `1 > [2] > 3`
    pub fn format_progress(&self) -> String {
        self.step_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == self.current_index {
                    format!("[{}]", name)
                } else {
                    name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

pub(crate) fn render_progress(progress: &Progress) -> String {
    format!(
        "<div class=\"formstep-progress\"><div class=\"formstep-progress-bar\" style=\"width: {}%\"></div><span class=\"formstep-progress-text\">Step {}/{}</span></div>\n",
        progress.percentage(),
        progress.position(),
        progress.total_steps
    )
}

pub(crate) fn render_errors(errors: &FormErrors) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let mut out = String::from("<div class=\"formstep-errors\">\n");
    for message in errors.all() {
        out.push_str(&format!(
            "<p class=\"formstep-error\">{}</p>\n",
            html_escape(&message)
        ));
    }
    out.push_str("</div>\n");
    out
}

pub(crate) fn render_navigation(config: &FormStepConfig, step: &StepId) -> String {
    let presentation = config.presentation(step);
    let mut out = String::from("<div class=\"formstep-navigation\">\n");

    if !config.is_first_step(step) && config.allow_navigation() {
        out.push_str(&format!(
            "<button type=\"submit\" name=\"action\" value=\"prev\" class=\"formstep-btn formstep-btn-prev\" formnovalidate>{}</button>\n",
            html_escape(presentation.prev_label())
        ));
    }

    if config.is_last_step(step) {
        out.push_str(&format!(
            "<button type=\"submit\" name=\"action\" value=\"complete\" class=\"formstep-btn formstep-btn-submit\">{}</button>\n",
            html_escape(presentation.complete_label())
        ));
    } else {
        out.push_str(&format!(
            "<button type=\"submit\" name=\"action\" value=\"next\" class=\"formstep-btn formstep-btn-next\">{}</button>\n",
            html_escape(presentation.next_label())
        ));
    }

    out.push_str("</div>\n");
    out
}

pub(crate) fn missing_view(step: &StepId) -> String {
    format!(
        "<div class=\"formstep-alert formstep-alert-warning\">Step {} view not found</div>\n",
        html_escape(step.as_str())
    )
}
