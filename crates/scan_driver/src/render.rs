//! Control-text rendering boundary.
//!
//! Rendering is pure substitution into a template, no control logic; the
//! trait exists so the driver never depends on a concrete template engine.

use std::fmt::Write;
use std::path::PathBuf;

use scan_core::ParameterPoint;

/// Values substituted into a control-text template.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub model_path: PathBuf,
    pub scale: f64,
    pub seed: u64,
    /// Non-scale parameter assignments, in sorted key order.
    pub parameters: Vec<(String, f64)>,
    pub generate_events: bool,
    pub event_seed: u64,
}

impl RenderContext {
    pub fn new(model_path: PathBuf, point: &ParameterPoint, seed: u64) -> Self {
        Self {
            model_path,
            scale: point.scale(),
            seed,
            parameters: point
                .non_scale()
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
            generate_events: false,
            event_seed: 0,
        }
    }

    pub fn for_event_generation(mut self, event_seed: u64) -> Self {
        self.generate_events = true;
        self.event_seed = event_seed;
        self
    }
}

pub trait Renderer {
    fn render(&self, template: &str, context: &RenderContext) -> String;
}

/// Plain `{{ key }}` substitution renderer.
///
/// Known keys: `model_path`, `scale`, `seed`, `parameters` (one
/// `name = value` line per entry), `generate_events`, `event_seed`.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionRenderer;

impl SubstitutionRenderer {
    fn parameter_lines(context: &RenderContext) -> String {
        let mut lines = String::new();
        for (name, value) in &context.parameters {
            let _ = writeln!(lines, "{name} = {value}");
        }
        lines
    }
}

impl Renderer for SubstitutionRenderer {
    fn render(&self, template: &str, context: &RenderContext) -> String {
        let substitutions = [
            ("model_path", context.model_path.display().to_string()),
            ("scale", context.scale.to_string()),
            ("seed", context.seed.to_string()),
            ("parameters", Self::parameter_lines(context)),
            ("generate_events", context.generate_events.to_string()),
            ("event_seed", context.event_seed.to_string()),
        ];
        let mut rendered = template.to_string();
        for (key, value) in substitutions {
            for pattern in [format!("{{{{ {key} }}}}"), format!("{{{{{key}}}}}")] {
                rendered = rendered.replace(&pattern, &value);
            }
        }
        rendered
    }
}
