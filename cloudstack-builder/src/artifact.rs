//! The template produced by a successful build.

use crate::client::CloudStackApi;
use crate::errors::ApiResult;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use url::form_urlencoded;

/// Identifies artifacts produced by this builder.
pub const BUILDER_ID: &str = "cloudstack.template";

const TEMPLATE_ID_PARAM: &str = "templateid";

/// A created template.
///
/// Artifacts exist only for fully successful builds and never change
/// afterwards.
#[derive(Clone)]
pub struct Artifact {
    template_id: String,
    template_name: String,
    client: Arc<dyn CloudStackApi>,
}

impl Artifact {
    /// Creates an artifact for a template.
    #[must_use]
    pub fn new(
        template_id: impl Into<String>,
        template_name: impl Into<String>,
        client: Arc<dyn CloudStackApi>,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            template_name: template_name.into(),
            client,
        }
    }

    /// The builder that produced this artifact.
    #[must_use]
    pub fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    /// Local files belonging to the artifact; templates have none.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &[]
    }

    /// The template id.
    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// The template name.
    #[must_use]
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// A URL identifying the template: `<api base>?templateid=<id>`.
    #[must_use]
    pub fn id(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(TEMPLATE_ID_PARAM, &self.template_id)
            .finish();
        format!("{}?{query}", self.client.base_url())
    }

    /// Recovers the template id from an artifact id.
    #[must_use]
    pub fn parse_template_id(id: &str) -> Option<String> {
        let url = url::Url::parse(id).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == TEMPLATE_ID_PARAM)
            .map(|(_, value)| value.into_owned())
    }

    /// Deletes the template.
    pub async fn destroy(&self) -> ApiResult<()> {
        self.client.delete_template(&self.template_id).await
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("builder_id".to_string(), serde_json::json!(BUILDER_ID));
        map.insert("id".to_string(), serde_json::json!(self.id()));
        map.insert("template_id".to_string(), serde_json::json!(self.template_id));
        map.insert("template_name".to_string(), serde_json::json!(self.template_name));
        map
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A template was created: UUID: {} - Name: {}",
            self.template_id, self.template_name
        )
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("template_id", &self.template_id)
            .field("template_name", &self.template_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCloudStackApi;
    use crate::errors::ApiError;

    fn mock_with_base(base: &'static str) -> MockCloudStackApi {
        let mut mock = MockCloudStackApi::new();
        mock.expect_base_url().returning(move || base.to_string());
        mock
    }

    #[test]
    fn test_id_round_trip() {
        let artifact = Artifact::new("abc", "golden", Arc::new(mock_with_base("http://x/y")));

        assert_eq!(artifact.id(), "http://x/y?templateid=abc");
        assert_eq!(Artifact::parse_template_id(&artifact.id()), Some("abc".to_string()));
    }

    #[test]
    fn test_id_escapes_template_id() {
        let artifact = Artifact::new("a b&c", "n", Arc::new(mock_with_base("http://x/y")));

        assert_eq!(artifact.id(), "http://x/y?templateid=a+b%26c");
        assert_eq!(Artifact::parse_template_id(&artifact.id()), Some("a b&c".to_string()));
    }

    #[test]
    fn test_parse_template_id_rejects_other_urls() {
        assert_eq!(Artifact::parse_template_id("not a url"), None);
        assert_eq!(Artifact::parse_template_id("http://x/y?zone=1"), None);
    }

    #[test]
    fn test_display_and_metadata() {
        let artifact = Artifact::new("abc", "golden", Arc::new(mock_with_base("http://x/y")));

        assert_eq!(
            artifact.to_string(),
            "A template was created: UUID: abc - Name: golden"
        );
        assert_eq!(artifact.builder_id(), "cloudstack.template");
        assert!(artifact.files().is_empty());
        assert_eq!(artifact.to_dict().get("template_id").unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_destroy_deletes_once() {
        let mut mock = MockCloudStackApi::new();
        mock.expect_delete_template()
            .withf(|id: &str| id == "abc")
            .times(1)
            .returning(|_| Ok(()));
        let artifact = Artifact::new("abc", "golden", Arc::new(mock));

        artifact.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_propagates_error() {
        let mut mock = MockCloudStackApi::new();
        mock.expect_delete_template()
            .times(1)
            .returning(|_| Err(ApiError::new("template in use").with_code(431)));
        let artifact = Artifact::new("abc", "golden", Arc::new(mock));

        let err = artifact.destroy().await.unwrap_err();
        assert_eq!(err, ApiError::new("template in use").with_code(431));
    }
}
