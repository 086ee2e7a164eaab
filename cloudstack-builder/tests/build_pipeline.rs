//! End-to-end builds against the in-memory cloud.

use async_trait::async_trait;
use cloudstack_builder::prelude::*;
use cloudstack_builder::testing::{
    test_config, FakeCloudStack, FakeCommunicator, FakeConnector, RecordingProvisioner,
    FAKE_BASE_URL,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn builder(config: PipelineConfig, cloud: &FakeCloudStack, connector: &FakeConnector) -> Builder {
    Builder::new(config, Arc::new(cloud.clone()), Arc::new(connector.clone()))
        .with_ui(Arc::new(NoOpUi))
}

#[derive(Debug)]
struct CancellingProvisioner {
    token: Arc<CancellationToken>,
}

#[async_trait]
impl Provisioner for CancellingProvisioner {
    fn name(&self) -> &str {
        "cancel"
    }

    async fn provision(
        &self,
        _ui: &dyn Ui,
        _communicator: &mut dyn Communicator,
    ) -> anyhow::Result<()> {
        self.token.cancel("operator pressed ctrl-c");
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_build_produces_artifact() {
    let cloud = FakeCloudStack::new();
    let communicator = FakeCommunicator::new();
    let connector = FakeConnector::new().with_communicator(communicator.clone());
    let provisioner = RecordingProvisioner::new("shell", "apt-get -y upgrade");
    let mut config = test_config();
    config
        .template_tags
        .insert("os".to_string(), "debian".to_string());

    let builder = builder(config, &cloud, &connector).with_provisioner(provisioner.clone());
    let artifact = builder.run().await.unwrap().unwrap();

    assert_eq!(artifact.template_id(), "tpl-new");
    assert_eq!(artifact.template_name(), "golden-image");
    assert_eq!(artifact.id(), format!("{FAKE_BASE_URL}?templateid=tpl-new"));
    assert_eq!(
        artifact.to_string(),
        "A template was created: UUID: tpl-new - Name: golden-image"
    );

    assert_eq!(
        cloud.calls(),
        vec![
            "deploy_virtual_machine",
            "query_virtual_machine",
            "query_virtual_machine",
            "stop_virtual_machine",
            "query_virtual_machine",
            "root_volume_id",
            "create_template",
            "create_tags",
            "destroy_virtual_machine",
        ]
    );
    assert_eq!(provisioner.runs(), 1);
    assert_eq!(communicator.commands(), vec!["apt-get -y upgrade"]);
    assert!(communicator.is_closed());
    assert_eq!(connector.attempts(), vec!["10.0.0.10:22"]);
    assert!(connector.last_config().unwrap().has_public_key());

    let deploy = cloud.last_deploy().unwrap();
    assert!(deploy.ssh_public_key.unwrap().starts_with("ssh-ed25519 "));
    assert!(deploy.user_data.is_none());

    let tags = cloud.last_tags().unwrap();
    assert_eq!(tags.resource_ids, vec!["tpl-new"]);
    assert_eq!(tags.resource_type, "Template");
}

#[tokio::test(start_paused = true)]
async fn test_deploy_failure_is_returned_and_nothing_leaks() {
    let cloud = FakeCloudStack::new().failing("deploy_virtual_machine", "Insufficient capacity");
    let connector = FakeConnector::new();

    let err = builder(test_config(), &cloud, &connector)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Error deploying virtual machine: Insufficient capacity");
    assert_eq!(cloud.calls(), vec!["deploy_virtual_machine"]);
    assert!(connector.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_state_timeout_destroys_vm() {
    let cloud = FakeCloudStack::new().with_state_script(vec!["Starting"; 1000]);
    let connector = FakeConnector::new();
    let config = PipelineConfig {
        state_timeout_seconds: 6.0,
        state_poll_interval_seconds: 2.0,
        ..test_config()
    };

    let err = builder(config, &cloud, &connector).run().await.unwrap_err();

    assert!(matches!(err, BuildError::StateTimeout { .. }));
    assert_eq!(cloud.call_count("destroy_virtual_machine"), 1);
    assert_eq!(cloud.call_count("create_template"), 0);
}

#[tokio::test]
async fn test_cancel_before_run_executes_nothing() {
    let cloud = FakeCloudStack::new();
    let connector = FakeConnector::new();
    let builder = builder(test_config(), &cloud, &connector);
    builder.cancel("shutdown");
    let err = builder.run().await.unwrap_err();

    assert!(matches!(err, BuildError::Cancelled));
    assert_eq!(err.to_string(), "Build was cancelled.");
    assert!(cloud.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_build_cleans_up() {
    let cloud = FakeCloudStack::new();
    let communicator = FakeCommunicator::new();
    let connector = FakeConnector::new().with_communicator(communicator.clone());
    let builder = builder(test_config(), &cloud, &connector);
    let token = builder.cancellation_token();
    let builder = builder.with_provisioner(CancellingProvisioner { token });

    let err = builder.run().await.unwrap_err();

    assert!(matches!(err, BuildError::Cancelled));
    assert_eq!(cloud.call_count("stop_virtual_machine"), 0);
    assert_eq!(cloud.call_count("create_template"), 0);
    assert_eq!(cloud.call_count("destroy_virtual_machine"), 1);
    assert!(communicator.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_ssh_timeout_halts() {
    let cloud = FakeCloudStack::new();
    let connector = FakeConnector::refusing();
    let config = PipelineConfig {
        ssh_timeout_seconds: 30.0,
        ssh_retry_interval_seconds: 5.0,
        ..test_config()
    };

    let err = builder(config, &cloud, &connector).run().await.unwrap_err();

    assert!(matches!(err, BuildError::SshTimeout { .. }));
    assert!(connector.attempts().len() >= 6);
    assert_eq!(cloud.call_count("destroy_virtual_machine"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debug_build_with_log_pause_completes() {
    let cloud = FakeCloudStack::new();
    let connector = FakeConnector::new();
    let config = PipelineConfig {
        debug: true,
        ..test_config()
    };

    let artifact = builder(config, &cloud, &connector).run().await.unwrap();
    assert!(artifact.is_some());
    assert_eq!(cloud.call_count("create_tags"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_iso_build_detaches_iso() {
    let cloud = FakeCloudStack::new().with_iso("iso-installer");
    let connector = FakeConnector::new();

    builder(test_config(), &cloud, &connector).run().await.unwrap();

    assert_eq!(cloud.call_count("detach_iso"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_artifact_destroy_and_vagrant_box() {
    let cloud = FakeCloudStack::new();
    let connector = FakeConnector::new();

    let artifact = builder(test_config(), &cloud, &connector)
        .run()
        .await
        .unwrap()
        .unwrap();

    let vagrant = CloudStackProvider.process(&artifact.id()).unwrap();
    assert!(vagrant.vagrantfile.contains(r#"cloudstack.host = "cloud.example.com""#));
    assert!(vagrant.vagrantfile.contains(r#"cloudstack.port = "8080""#));
    assert!(vagrant.vagrantfile.contains(r#"cloudstack.template_id = "tpl-new""#));

    artifact.destroy().await.unwrap();
    assert_eq!(cloud.call_count("delete_template"), 1);
}
