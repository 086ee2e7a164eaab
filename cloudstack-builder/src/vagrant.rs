//! Vagrant box descriptor for templates.
//!
//! Turns an artifact id URL into a Vagrantfile that points the `cloudstack`
//! Vagrant provider at the template.

use crate::errors::VagrantError;
use serde_json::{json, Map, Value};

/// Output of [`CloudStackProvider::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct VagrantBox {
    /// Rendered Vagrantfile.
    pub vagrantfile: String,
    /// Box metadata.
    pub metadata: Map<String, Value>,
}

#[derive(Debug)]
struct VagrantfileData {
    host: String,
    path: String,
    port: u16,
    scheme: String,
    template_id: String,
}

impl VagrantfileData {
    fn render(&self) -> String {
        format!(
            r#"
Vagrant.configure("2") do |config|
  config.vm.provider "cloudstack" do |cloudstack|
    cloudstack.host = "{host}"
    cloudstack.path = "{path}"
    cloudstack.port = "{port}"
    cloudstack.scheme = "{scheme}"

    cloudstack.template_id = "{template_id}"
  end
end
"#,
            host = self.host,
            path = self.path,
            port = self.port,
            scheme = self.scheme,
            template_id = self.template_id,
        )
    }
}

/// Vagrant provider for CloudStack templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudStackProvider;

impl CloudStackProvider {
    /// The template stays in the cloud; the box only points at it.
    #[must_use]
    pub fn keep_input_artifact(&self) -> bool {
        true
    }

    /// Builds the Vagrantfile and metadata for `artifact_id`.
    pub fn process(&self, artifact_id: &str) -> Result<VagrantBox, VagrantError> {
        let url = url::Url::parse(artifact_id)
            .map_err(|_| VagrantError::InvalidArtifactId(artifact_id.to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| VagrantError::InvalidAddress(artifact_id.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| VagrantError::InvalidAddress(artifact_id.to_string()))?;
        let template_id = url
            .query_pairs()
            .find(|(key, _)| key == "templateid")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        let data = VagrantfileData {
            host: host.to_string(),
            path: url.path().to_string(),
            port,
            scheme: url.scheme().to_string(),
            template_id,
        };

        let mut metadata = Map::new();
        metadata.insert("provider".to_string(), json!("cloudstack"));

        Ok(VagrantBox {
            vagrantfile: data.render(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_renders_vagrantfile() {
        let provider = CloudStackProvider;
        let out = provider
            .process("https://cloud.example.com:8443/client/api?templateid=tpl-1")
            .unwrap();

        let expected = r#"
Vagrant.configure("2") do |config|
  config.vm.provider "cloudstack" do |cloudstack|
    cloudstack.host = "cloud.example.com"
    cloudstack.path = "/client/api"
    cloudstack.port = "8443"
    cloudstack.scheme = "https"

    cloudstack.template_id = "tpl-1"
  end
end
"#;
        assert_eq!(out.vagrantfile, expected);
        assert_eq!(out.metadata.get("provider"), Some(&json!("cloudstack")));
        assert!(provider.keep_input_artifact());
    }

    #[test]
    fn test_default_port_from_scheme() {
        let out = CloudStackProvider
            .process("http://cloud.example.com/client/api?templateid=tpl-1")
            .unwrap();
        assert!(out.vagrantfile.contains(r#"cloudstack.port = "80""#));
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert!(matches!(
            CloudStackProvider.process("no scheme here"),
            Err(VagrantError::InvalidArtifactId(_))
        ));
        assert!(matches!(
            CloudStackProvider.process("cloud://host/path?templateid=x"),
            Err(VagrantError::InvalidAddress(_))
        ));
    }
}
