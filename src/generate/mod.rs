use crate::config::Config;
use crate::rules::{compile_rules, RuleTable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

const INGRESS_API_VERSION: &str = "networking.k8s.io/v1";
// Regex rule paths need the controller's regex support switched on
const USE_REGEX_ANNOTATION: &str = "nginx.ingress.kubernetes.io/use-regex";
const DEFAULT_BACKEND_PORT: u16 = 8484;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Failed to write manifest: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to serialize manifest: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub out: PathBuf,
    pub namespace: String,
    pub service_name: String,
    pub ingress_name: String,
    pub ingress_class: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressManifest {
    api_version: String,
    kind: String,
    metadata: Metadata,
    spec: IngressSpec,
}

#[derive(Debug, Serialize)]
struct Metadata {
    name: String,
    namespace: String,
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngressSpec {
    ingress_class_name: String,
    rules: Vec<IngressRule>,
}

#[derive(Debug, Serialize)]
struct IngressRule {
    host: String,
    http: HttpRuleValue,
}

#[derive(Debug, Serialize)]
struct HttpRuleValue {
    paths: Vec<HttpPath>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpPath {
    path: String,
    path_type: String,
    backend: Backend,
}

#[derive(Debug, Serialize)]
struct Backend {
    service: ServiceBackend,
}

#[derive(Debug, Serialize)]
struct ServiceBackend {
    name: String,
    port: ServicePort,
}

#[derive(Debug, Serialize)]
struct ServicePort {
    number: u16,
}

/// Compile the ruleset and write a Kubernetes Ingress manifest covering every
/// rule host to `options.out`.
pub fn generate_ingress(config: &Config, options: &GenerateOptions) -> Result<(), GenerateError> {
    let table = compile_rules(&config.rules, &config.rule_defaults());
    let manifest = render_manifest(config, &table, options);

    info!(manifest_path = %options.out.display(), "generating manifest");
    let yaml = serde_yaml::to_string(&manifest)?;
    std::fs::write(&options.out, yaml)?;
    Ok(())
}

fn render_manifest(config: &Config, table: &RuleTable, options: &GenerateOptions) -> IngressManifest {
    let backend_port = listen_port(&config.listen_address);

    // hosts sorted for reproducible output
    let mut hosts: Vec<_> = table.iter().collect();
    hosts.sort_by(|(a, _), (b, _)| a.cmp(b));

    let rules = hosts
        .into_iter()
        .map(|(host, bucket)| IngressRule {
            host: host.clone(),
            http: HttpRuleValue {
                paths: bucket
                    .iter()
                    .map(|rule| HttpPath {
                        path: if rule.path.is_empty() {
                            "/".to_string()
                        } else {
                            rule.path.clone()
                        },
                        // regex paths are left to the ingress controller
                        path_type: "ImplementationSpecific".to_string(),
                        backend: Backend {
                            service: ServiceBackend {
                                name: options.service_name.clone(),
                                port: ServicePort {
                                    number: backend_port,
                                },
                            },
                        },
                    })
                    .collect(),
            },
        })
        .collect();

    IngressManifest {
        api_version: INGRESS_API_VERSION.to_string(),
        kind: "Ingress".to_string(),
        metadata: Metadata {
            name: options.ingress_name.clone(),
            namespace: options.namespace.clone(),
            annotations: BTreeMap::from([(
                USE_REGEX_ANNOTATION.to_string(),
                "true".to_string(),
            )]),
        },
        spec: IngressSpec {
            ingress_class_name: options.ingress_class.clone(),
            rules,
        },
    }
}

fn listen_port(listen_address: &str) -> u16 {
    listen_address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .unwrap_or(DEFAULT_BACKEND_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> GenerateOptions {
        GenerateOptions {
            out: PathBuf::from("./redirector-ingress.yml"),
            namespace: "redirector".to_string(),
            service_name: "redirector".to_string(),
            ingress_name: "redirector".to_string(),
            ingress_class: "nginx".to_string(),
        }
    }

    #[test]
    fn test_manifest_covers_all_hosts() {
        let yaml = r#"
listen_address: 0.0.0.0:9001
rules:
  - from: example.com/blog/(.+)
    to: https://blog.example/$1
  - from: example.com
    to: https://www.example/
  - from: other.example/x
    to: https://foo.com/x
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let table = compile_rules(&config.rules, &config.rule_defaults());
        let manifest = render_manifest(&config, &table, &options());

        assert_eq!(manifest.spec.rules.len(), 2);
        assert_eq!(manifest.spec.rules[0].host, "example.com");
        assert_eq!(manifest.spec.rules[0].http.paths.len(), 2);
        assert_eq!(manifest.spec.rules[0].http.paths[0].path, "/blog/(.+)");
        // hostname-only rules surface as the root path
        assert_eq!(manifest.spec.rules[0].http.paths[1].path, "/");
        assert_eq!(manifest.spec.rules[1].host, "other.example");
        assert_eq!(
            manifest.spec.rules[1].http.paths[0].backend.service.port.number,
            9001
        );
    }

    #[test]
    fn test_manifest_yaml_shape() {
        let yaml = "rules:\n  - from: example.com/x\n    to: https://foo.com/\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let table = compile_rules(&config.rules, &config.rule_defaults());
        let rendered = serde_yaml::to_string(&render_manifest(&config, &table, &options())).unwrap();

        assert!(rendered.contains("apiVersion: networking.k8s.io/v1"));
        assert!(rendered.contains("kind: Ingress"));
        assert!(rendered.contains("ingressClassName: nginx"));
        assert!(rendered.contains("pathType: ImplementationSpecific"));
        assert!(rendered.contains("nginx.ingress.kubernetes.io/use-regex"));
    }

    #[test]
    fn test_listen_port_fallback() {
        assert_eq!(listen_port("0.0.0.0:8484"), 8484);
        assert_eq!(listen_port("not-an-address"), DEFAULT_BACKEND_PORT);
    }
}
