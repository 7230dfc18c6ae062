//! Agent path templates.
//!
//! Templates use the `{{ .Field }}` action syntax. Only field references to
//! `PluginName`, `AccountID`, `Region` and `InstanceID` are accepted, so a
//! template that compiles always renders.

use crate::signature::InstanceClaim;
use crate::{AttestorError, Result};
use iid_attestor_common::PLUGIN_NAME;

pub const DEFAULT_AGENT_PATH_TEMPLATE: &str =
    "{{ .PluginName }}/{{ .AccountID }}/{{ .Region }}/{{ .InstanceID }}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    PluginName,
    AccountId,
    Region,
    InstanceId,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "PluginName" => Some(Field::PluginName),
            "AccountID" => Some(Field::AccountId),
            "Region" => Some(Field::Region),
            "InstanceID" => Some(Field::InstanceId),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A compiled agent path template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentPathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl AgentPathTemplate {
    pub fn compile(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| {
                AttestorError::TemplateCompile(format!(
                    "unclosed action starting at offset {}",
                    source.len() - rest.len() + open
                ))
            })?;
            segments.push(Segment::Field(parse_action(&after_open[..close])?));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        let template = Self {
            source: source.to_string(),
            segments,
        };
        // Field values are never empty, so a template whose literals alone
        // break the path can never render.
        let sample = template.render_fields("account", "region", "instance");
        normalize_path(&sample).map_err(AttestorError::TemplateCompile)?;
        Ok(template)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template against a verified claim.
    pub fn render(&self, claim: &InstanceClaim) -> String {
        self.render_fields(claim.account_id(), claim.region(), claim.instance_id())
    }

    fn render_fields(&self, account_id: &str, region: &str, instance_id: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::PluginName) => out.push_str(PLUGIN_NAME),
                Segment::Field(Field::AccountId) => out.push_str(account_id),
                Segment::Field(Field::Region) => out.push_str(region),
                Segment::Field(Field::InstanceId) => out.push_str(instance_id),
            }
        }
        out
    }
}

impl Default for AgentPathTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_AGENT_PATH_TEMPLATE.to_string(),
            segments: vec![
                Segment::Field(Field::PluginName),
                Segment::Literal("/".to_string()),
                Segment::Field(Field::AccountId),
                Segment::Literal("/".to_string()),
                Segment::Field(Field::Region),
                Segment::Literal("/".to_string()),
                Segment::Field(Field::InstanceId),
            ],
        }
    }
}

fn parse_action(action: &str) -> Result<Field> {
    let trimmed = action.trim();
    let name = trimmed.strip_prefix('.').ok_or_else(|| {
        AttestorError::TemplateCompile(format!(
            "unsupported action {:?}: only field references such as {{{{ .InstanceID }}}} are allowed",
            trimmed
        ))
    })?;
    Field::parse(name).ok_or_else(|| {
        AttestorError::TemplateCompile(format!(
            "unknown field {:?}: expected PluginName, AccountID, Region or InstanceID",
            name
        ))
    })
}

/// Build the agent SPIFFE ID for a verified claim.
///
/// Empty path segments are collapsed. Dot segments are rejected so a claim
/// value can never move the ID outside `/spire/agent/`.
pub fn render_agent_id(
    trust_domain: &str,
    template: &AgentPathTemplate,
    claim: &InstanceClaim,
) -> Result<String> {
    let rendered = template.render(claim);
    let path = normalize_path(&rendered).map_err(AttestorError::Render)?;
    Ok(format!("spiffe://{}/spire/agent{}", trust_domain, path))
}

/// Collapse empty segments and refuse dot segments or an empty result.
fn normalize_path(rendered: &str) -> std::result::Result<String, String> {
    let mut path = String::new();
    for segment in rendered.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(format!(
                "rendered path {:?} contains a dot segment",
                rendered
            ));
        }
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        return Err("rendered path is empty".to_string());
    }
    Ok(path)
}
