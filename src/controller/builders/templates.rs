//! # Secret Payload Templates
//!
//! Kubeconfig and ArgoCD cluster config payloads, rendered with strict undefined
//! handling so a missing variable is an error rather than an empty string.

use minijinja::{Environment, UndefinedBehavior, Value};
use thiserror::Error;

pub const KUBECONFIG_TEMPLATE_NAME: &str = "kubeconfig";
pub const ARGOCD_CONFIG_TEMPLATE_NAME: &str = "argocd-config";

const KUBECONFIG_TEMPLATE: &str = r"apiVersion: v1
clusters:
    - cluster:
        certificate-authority-data: {{ ca_cert }}
        server: {{ server }}
      name: {{ cluster_name }}
contexts:
    - context:
        cluster: {{ cluster_name }}
        user: {{ cluster_name }}-super-admin
      name: {{ cluster_name }}-super-admin@{{ cluster_name }}
current-context: {{ cluster_name }}-super-admin@{{ cluster_name }}
kind: Config
users:
    - name: {{ cluster_name }}-super-admin
      user:
        client-certificate-data: {{ tls_cert }}
        client-key-data: {{ tls_key }}";

const ARGOCD_CONFIG_TEMPLATE: &str = r#"{
  "tlsClientConfig": {
    "caData": "{{ ca_cert }}",
    "certData": "{{ tls_cert }}",
    "insecure": false,
    "keyData": "{{ tls_key }}"
  }
}"#;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to render {template} template: {source}")]
    Render {
        template: &'static str,
        #[source]
        source: minijinja::Error,
    },
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

fn render(name: &'static str, source: &'static str, ctx: &Value) -> Result<String, BuildError> {
    let env = environment();
    let rendered = env
        .template_from_str(source)
        .and_then(|template| template.render(ctx));
    rendered.map_err(|source| BuildError::Render {
        template: name,
        source,
    })
}

pub fn render_kubeconfig(ctx: &Value) -> Result<String, BuildError> {
    render(KUBECONFIG_TEMPLATE_NAME, KUBECONFIG_TEMPLATE, ctx)
}

pub fn render_argocd_config(ctx: &Value) -> Result<String, BuildError> {
    render(ARGOCD_CONFIG_TEMPLATE_NAME, ARGOCD_CONFIG_TEMPLATE, ctx)
}
