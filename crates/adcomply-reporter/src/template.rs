//! Notification templates with `{{variable}}` placeholders
//!
//! Values are HTML-escaped unless the variable name ends in `_html`.
//! Unknown variables render as empty strings.

use adcomply_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub const ALERT_TEMPLATE: &str = "alert_email.html";
pub const REPORT_TEMPLATE: &str = "report_email.html";

const DEFAULT_ALERT: &str = r#"<html>
<body>
<h2>{{tier}} severity compliance alert</h2>
<p><strong>Artifact:</strong> {{artifact_id}}<br>
<strong>Rule:</strong> {{rule_id}}<br>
<strong>Severity:</strong> {{severity}}<br>
<strong>Generated:</strong> {{generated_at}}</p>
<p>{{summary}}</p>
<ul>
{{violations_html}}
</ul>
</body>
</html>
"#;

const DEFAULT_REPORT: &str = r#"<html>
<body>
<h2>Compliance report {{report_id}}</h2>
<p>Period: {{period_start}} to {{period_end}} ({{kind}})</p>
<table>
<tr><td>Total alerts</td><td>{{total_alerts}}</td></tr>
<tr><td>Resolved alerts</td><td>{{resolved_alerts}}</td></tr>
<tr><td>High severity</td><td>{{high_severity}}</td></tr>
<tr><td>Compliance rate</td><td>{{compliance_rate}}%</td></tr>
<tr><td>Resolution rate</td><td>{{resolution_rate}}%</td></tr>
<tr><td>Average resolution (hours)</td><td>{{avg_resolution_hours}}</td></tr>
</table>
<p>{{regulatory_status}}</p>
<h3>Alerts</h3>
<ul>
{{alerts_html}}
</ul>
<h3>Operational incidents</h3>
<ul>
{{incidents_html}}
</ul>
</body>
</html>
"#;

/// Named templates loaded once at startup
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: HashMap<String, String>,
}

impl TemplateRenderer {
    /// Built-in templates only
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(ALERT_TEMPLATE.to_string(), DEFAULT_ALERT.to_string());
        templates.insert(REPORT_TEMPLATE.to_string(), DEFAULT_REPORT.to_string());
        Self { templates }
    }

    /// Built-ins overridden by any template files present in `dir`
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut renderer = Self::new();
        let Some(dir) = dir else {
            return Ok(renderer);
        };
        for name in [ALERT_TEMPLATE, REPORT_TEMPLATE] {
            let path = dir.join(name);
            if !path.exists() {
                debug!(template = name, "Template file absent, using built-in");
                continue;
            }
            let body = std::fs::read_to_string(&path)
                .map_err(|e| Error::config(format!("failed to read template {}: {e}", path.display())))?;
            info!(template = name, path = %path.display(), "Loaded template");
            renderer.register(name, body);
        }
        Ok(renderer)
    }

    pub fn register(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    /// Render a template with the given variables
    pub fn render(&self, name: &str, variables: &HashMap<String, String>) -> Result<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown template {name:?}")))?;
        Ok(substitute(template, variables))
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            // Unterminated placeholder is literal text
            out.push_str(&rest[open..]);
            return out;
        };
        let name = after[..close].trim();
        if let Some(value) = variables.get(name) {
            if name.ends_with("_html") {
                out.push_str(value);
            } else {
                out.push_str(&escape_html(value));
            }
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
