//! Placeholder substitution for startup configuration templates.
//!
//! Templates reference fields with `{{ .Name }}`. Only plain field references
//! are understood; every placeholder must resolve.

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A fixed set of named values a template may reference.
pub trait TemplateFields {
    /// Returns the value of the field called `name`, if it exists.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Fields of the gateway startup configuration (container and bare metal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFields {
    /// Directory holding the cloud lua module.
    pub cloud_module_dir: String,
    /// Directory holding the certificate triple.
    pub tls_dir: String,
}

impl TemplateFields for GatewayFields {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "CloudModuleDir" => Some(self.cloud_module_dir.clone()),
            "TLSDir" => Some(self.tls_dir.clone()),
            _ => None,
        }
    }
}

/// Fields of the Helm values template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmFields {
    /// Mount path of the cloud lua module inside the pod.
    pub cloud_module_dir: String,
    /// Mount path of the certificate triple inside the pod.
    pub tls_dir: String,
    /// Secret holding the certificate triple.
    pub tls_secret_name: String,
    /// Config map holding the cloud lua module files.
    pub cloud_module_config_map_name: String,
    /// Gateway image repository.
    pub image_repository: String,
    /// Gateway image tag.
    pub image_tag: String,
    /// Number of gateway replicas.
    pub replicas: u32,
}

impl TemplateFields for HelmFields {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "CloudModuleDir" => Some(self.cloud_module_dir.clone()),
            "TLSDir" => Some(self.tls_dir.clone()),
            "TLSSecretName" => Some(self.tls_secret_name.clone()),
            "CloudModuleConfigMapName" => Some(self.cloud_module_config_map_name.clone()),
            "ImageRepository" => Some(self.image_repository.clone()),
            "ImageTag" => Some(self.image_tag.clone()),
            "Replicas" => Some(self.replicas.to_string()),
            _ => None,
        }
    }
}

/// Substitutes every placeholder in `template` with its field value.
///
/// # Errors
///
/// Returns an error on an unclosed action, an action that is not a plain
/// field reference, or a reference to an unknown field.
pub fn render(template: &str, fields: &dyn TemplateFields) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;

    while let Some(start) = rest.find(OPEN) {
        let offset = consumed + start;
        out.push_str(&rest[..start]);

        let body_start = start + OPEN.len();
        let Some(len) = rest[body_start..].find(CLOSE) else {
            return Err(TemplateError::Malformed { offset });
        };

        let action = rest[body_start..body_start + len].trim();
        let name = parse_field(action).ok_or_else(|| TemplateError::UnsupportedAction {
            action: action.to_string(),
            offset,
        })?;

        let value = fields
            .lookup(name)
            .ok_or_else(|| TemplateError::UnknownPlaceholder {
                name: name.to_string(),
                offset,
            })?;
        out.push_str(&value);

        let next = body_start + len + CLOSE.len();
        consumed += next;
        rest = &rest[next..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Extracts `Name` from a `.Name` action.
fn parse_field(action: &str) -> Option<&str> {
    let name = action.strip_prefix('.')?;
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    valid.then_some(name)
}
