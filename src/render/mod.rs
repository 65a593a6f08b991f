//! Template rendering.
//!
//! Control-plane templates and the bundled install script share one
//! placeholder syntax, `{{ .Name }}`, filled from a fixed field struct per
//! target.

mod install_script;
mod template;

pub use install_script::{
    DEFAULT_INSTALLER_REPO_URL, InstallScriptFields, render_install_script, write_install_script,
};
pub use template::{GatewayFields, HelmFields, TemplateFields, render};
