//! The library entry point.

use crate::artifact::Artifact;
use crate::cancellation::CancellationToken;
use crate::client::CloudStackApi;
use crate::config::PipelineConfig;
use crate::errors::BuildError;
use crate::pipeline::{BasicRunner, DebugPause, DebugRunner, LogPause, RunOutcome, Runner, Step};
use crate::ssh::{Connector, Provisioner};
use crate::state::StateBag;
use crate::steps::{
    StepConnectSsh, StepCreateSshKeyPair, StepCreateTags, StepCreateTemplate,
    StepDeployVirtualMachine, StepDetachIso, StepHttpServer, StepProvision,
    StepStopVirtualMachine, StepVirtualMachineState,
};
use crate::ui::{LoggingUi, Ui};
use std::sync::Arc;
use tracing::error;

/// Builds a CloudStack template from a source template or ISO.
///
/// ```rust,ignore
/// let config = PipelineConfig::from_file("build.json")?.prepare()?;
/// let builder = Builder::new(config, client, connector)
///     .with_provisioner(ShellProvisioner::new(["apt-get -y upgrade"]));
/// if let Some(artifact) = builder.run().await? {
///     println!("{artifact}");
/// }
/// ```
pub struct Builder {
    config: Arc<PipelineConfig>,
    client: Arc<dyn CloudStackApi>,
    connector: Arc<dyn Connector>,
    ui: Arc<dyn Ui>,
    provisioners: Vec<Arc<dyn Provisioner>>,
    debug_pause: Option<Box<dyn DebugPause>>,
    token: Arc<CancellationToken>,
}

impl Builder {
    /// Creates a builder for a prepared configuration.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn CloudStackApi>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            connector,
            ui: Arc::new(LoggingUi::default()),
            provisioners: Vec::new(),
            debug_pause: None,
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the progress UI.
    #[must_use]
    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    /// Appends a provisioner.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioners.push(Arc::new(provisioner));
        self
    }

    /// Sets how debug runs pause between steps. Only used when
    /// `config.debug` is set; defaults to [`LogPause`].
    #[must_use]
    pub fn with_debug_pause(mut self, pause: Box<dyn DebugPause>) -> Self {
        self.debug_pause = Some(pause);
        self
    }

    /// The build configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A handle the host can use to cancel from another task.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.token)
    }

    /// Requests cancellation at the next step boundary.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// The step sequence, in execution order.
    #[must_use]
    pub fn steps(&self) -> Vec<Box<dyn Step>> {
        vec![
            Box::new(StepHttpServer::new()),
            Box::new(StepCreateSshKeyPair),
            Box::new(StepDeployVirtualMachine::new()),
            Box::new(StepVirtualMachineState::new("Running")),
            Box::new(StepDetachIso),
            Box::new(StepConnectSsh::new(Arc::clone(&self.connector))),
            Box::new(StepProvision::new(self.provisioners.clone())),
            Box::new(StepStopVirtualMachine),
            Box::new(StepCreateTemplate),
            Box::new(StepCreateTags),
        ]
    }

    /// Runs the build. A builder runs once; its cancellation token and debug
    /// pause belong to that run.
    ///
    /// A `{{timestamp}}` left in the template name is expanded here, so a
    /// configuration that skipped [`PipelineConfig::prepare`] still gets a
    /// concrete name.
    ///
    /// Returns the artifact on success. Returns `Ok(None)` only when every
    /// step continued but no template was recorded, which is logged as an
    /// internal error.
    pub async fn run(mut self) -> Result<Option<Artifact>, BuildError> {
        Arc::make_mut(&mut self.config).expand_template_name();
        self.config.validate()?;

        let mut state = StateBag::new(
            Arc::clone(&self.config),
            Arc::clone(&self.client),
            Arc::clone(&self.ui),
        );

        let mut runner: Box<dyn Runner> = if self.config.debug {
            let pause = self
                .debug_pause
                .take()
                .unwrap_or_else(|| Box::new(LogPause) as Box<dyn DebugPause>);
            Box::new(DebugRunner::new(self.steps(), self.cancellation_token(), pause))
        } else {
            Box::new(BasicRunner::new(self.steps(), self.cancellation_token()))
        };

        let outcome = runner.run(&mut state).await;
        self.finish(outcome, state)
    }

    fn finish(&self, outcome: RunOutcome, mut state: StateBag) -> Result<Option<Artifact>, BuildError> {
        if let Some(err) = state.take_error() {
            return Err(err);
        }
        if state.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        if state.is_halted() {
            return Err(BuildError::Halted);
        }

        match state.template() {
            Some((id, name)) => Ok(Some(Artifact::new(id, name, Arc::clone(&self.client)))),
            None => {
                error!(outcome = outcome.as_str(), "Build finished without recording a template");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("debug", &self.config.debug)
            .field("provisioners", &self.provisioners)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
