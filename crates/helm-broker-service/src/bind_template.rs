//! Bind template rendering
//!
//! A plan's bind template is a YAML document with `{{ ... }}` placeholders.
//! Rendering substitutes release, instance, chart and value references; the
//! result is handed to a [`crate::credentials::BindTemplateResolver`].
//!
//! Supported placeholders:
//! - `.Release.Name`, `.Release.Namespace`, `.Release.Service`
//! - `.Instance.ID`
//! - `.Chart.Name`, `.Chart.Version`
//! - `.Values.<dotted.path>` over chart defaults overlaid by instance values

use helm_broker_core::{BindTemplate, Chart, ChartValues, Instance};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Value rendered for `.Release.Service`
pub const RELEASE_SERVICE: &str = "Helm";

/// Errors raised while producing credentials from a bind template
#[derive(Error, Debug)]
pub enum BindTemplateError {
    #[error("rendering bind template failed: {0}")]
    Render(String),

    #[error("bind template is not valid YAML: {0}")]
    Parse(String),

    #[error("resolving credentials failed: {0}")]
    Resolve(String),
}

/// Bind template with all placeholders substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBindTemplate(String);

impl RenderedBindTemplate {
    pub fn new(rendered: impl Into<String>) -> Self {
        Self(rendered.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Renders bind templates for provisioned instances
pub trait BindTemplateRenderer: Send + Sync {
    fn render_on_bind(
        &self,
        template: &BindTemplate,
        instance: &Instance,
        chart: &Chart,
    ) -> Result<RenderedBindTemplate, BindTemplateError>;
}

/// Placeholder based renderer
pub struct TemplateRenderer {
    expression: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, BindTemplateError> {
        let expression = Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}")
            .map_err(|e| BindTemplateError::Render(e.to_string()))?;
        Ok(Self { expression })
    }

    fn evaluate(
        expr: &str,
        instance: &Instance,
        chart: &Chart,
        values: &ChartValues,
    ) -> Result<String, BindTemplateError> {
        let unsupported = || BindTemplateError::Render(format!("unsupported expression `{}`", expr));

        if expr.contains(char::is_whitespace) {
            return Err(unsupported());
        }
        let path = expr.strip_prefix('.').ok_or_else(unsupported)?;
        let (root, rest) = path.split_once('.').unwrap_or((path, ""));

        let rendered = match (root, rest) {
            ("Release", "Name") => instance.release_name.to_string(),
            ("Release", "Namespace") => instance.namespace.as_str().to_string(),
            ("Release", "Service") => RELEASE_SERVICE.to_string(),
            ("Instance", "ID") => instance.id.to_string(),
            ("Chart", "Name") => chart.name.to_string(),
            ("Chart", "Version") => chart.version.to_string(),
            ("Values", key) if !key.is_empty() => values
                .lookup(key)
                .map(scalar)
                .ok_or_else(|| BindTemplateError::Render(format!("value `{}` is not set", key)))?,
            _ => return Err(unsupported()),
        };
        Ok(rendered)
    }
}

fn push_text(out: &mut String, text: &str, trim_start: bool) {
    if trim_start {
        out.push_str(text.trim_start());
    } else {
        out.push_str(text);
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl BindTemplateRenderer for TemplateRenderer {
    fn render_on_bind(
        &self,
        template: &BindTemplate,
        instance: &Instance,
        chart: &Chart,
    ) -> Result<RenderedBindTemplate, BindTemplateError> {
        let source = template.as_str();
        let values = chart.values.merged_with(&instance.values);

        let mut rendered = String::with_capacity(source.len());
        let mut last = 0;
        let mut trim_next = false;
        for captures in self.expression.captures_iter(source) {
            let (Some(whole), Some(expr)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            push_text(&mut rendered, &source[last..whole.start()], trim_next);
            // `{{-` and `-}}` swallow the adjacent whitespace
            if whole.as_str().starts_with("{{-") {
                rendered.truncate(rendered.trim_end().len());
            }
            rendered.push_str(&Self::evaluate(expr.as_str(), instance, chart, &values)?);
            trim_next = whole.as_str().ends_with("-}}");
            last = whole.end();
        }
        push_text(&mut rendered, &source[last..], trim_next);

        Ok(RenderedBindTemplate(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    fn render(template: &str) -> Result<RenderedBindTemplate, BindTemplateError> {
        let mut instance = testing::instance("i1");
        instance.values = ChartValues::from_value(json!({"auth": {"password": "s3cret"}})).unwrap();
        let chart = testing::chart().with_values(
            ChartValues::from_value(json!({"auth": {"user": "admin"}, "port": 6379})).unwrap(),
        );
        TemplateRenderer::new()
            .unwrap()
            .render_on_bind(&BindTemplate::new(template), &instance, &chart)
    }

    #[test]
    fn test_render_release_and_values() {
        let rendered = render(
            "credential:\n  - name: HOST\n    value: {{ .Release.Name }}.{{ .Release.Namespace }}\n  - name: PORT\n    value: \"{{ .Values.port }}\"\n  - name: USER\n    value: {{ .Values.auth.user }}\n  - name: PASSWORD\n    value: {{- .Values.auth.password -}}\n",
        )
        .unwrap();

        assert!(rendered.as_str().contains("value: hb-redis-micro-i1.stage"));
        assert!(rendered.as_str().contains("value: \"6379\""));
        assert!(rendered.as_str().contains("value: admin"));
        assert!(rendered.as_str().contains("value:s3cret"));
    }

    #[test]
    fn test_render_chart_and_instance() {
        let rendered = render("{{ .Chart.Name }}-{{ .Chart.Version }}/{{ .Instance.ID }}/{{ .Release.Service }}").unwrap();
        assert_eq!(rendered.as_str(), "redis-1.0.0/i1/Helm");
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        assert!(render("{{ .Capabilities.KubeVersion }}").is_err());
        assert!(render("{{ .Values.auth.password | b64enc }}").is_err());
        assert!(render("{{ .Values.missing }}").is_err());
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let rendered = render("credential: []").unwrap();
        assert_eq!(rendered.as_str(), "credential: []");
    }
}
