//! An in-memory CloudStack.

use crate::client::{
    CloudStackApi, CreateTags, CreateTemplate, DeployVirtualMachine, DeployedVirtualMachine,
    Template, VirtualMachine,
};
use crate::errors::{ApiError, ApiResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Base URL reported by [`FakeCloudStack`].
pub const FAKE_BASE_URL: &str = "http://cloud.example.com:8080/client/api";

#[derive(Debug)]
struct Inner {
    base_url: String,
    vm_id: String,
    vm_ip: Option<String>,
    vm_state: String,
    iso_id: Option<String>,
    query_script: VecDeque<ApiResult<String>>,
    failures: HashMap<&'static str, ApiError>,
    calls: Vec<String>,
    deploys: Vec<DeployVirtualMachine>,
    templates: Vec<CreateTemplate>,
    tags: Vec<CreateTags>,
}

/// A scripted CloudStack that records every call.
///
/// Without a script the VM follows its lifecycle: deploy makes it
/// `Running`, stop makes it `Stopped`, destroy makes it `Destroyed`.
/// Clones share the same recorder.
#[derive(Debug, Clone)]
pub struct FakeCloudStack {
    inner: Arc<Mutex<Inner>>,
}

impl Default for FakeCloudStack {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloudStack {
    /// Creates a fake with a healthy lifecycle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                base_url: FAKE_BASE_URL.to_string(),
                vm_id: "vm-1".to_string(),
                vm_ip: Some("10.0.0.10".to_string()),
                vm_state: "Starting".to_string(),
                iso_id: None,
                query_script: VecDeque::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
                deploys: Vec::new(),
                templates: Vec::new(),
                tags: Vec::new(),
            })),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(self, url: impl Into<String>) -> Self {
        self.inner.lock().base_url = url.into();
        self
    }

    /// Sets the initial VM state.
    #[must_use]
    pub fn with_vm_state(self, state: impl Into<String>) -> Self {
        self.inner.lock().vm_state = state.into();
        self
    }

    /// Attaches an ISO to the VM.
    #[must_use]
    pub fn with_iso(self, iso_id: impl Into<String>) -> Self {
        self.inner.lock().iso_id = Some(iso_id.into());
        self
    }

    /// Queues states returned by the next queries, before the lifecycle state.
    #[must_use]
    pub fn with_state_script<I, S>(self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .lock()
            .query_script
            .extend(states.into_iter().map(|s| Ok(s.into())));
        self
    }

    /// Queues a failing query.
    #[must_use]
    pub fn with_query_error(self, message: impl Into<String>) -> Self {
        self.inner
            .lock()
            .query_script
            .push_back(Err(ApiError::new(message)));
        self
    }

    /// Makes every call to `call` fail with `message`.
    #[must_use]
    pub fn failing(self, call: &'static str, message: impl Into<String>) -> Self {
        self.inner.lock().failures.insert(call, ApiError::new(message));
        self
    }

    /// Names of the calls made, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    /// Number of calls to `call`.
    #[must_use]
    pub fn call_count(&self, call: &str) -> usize {
        self.inner.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Parameters of the last deploy.
    #[must_use]
    pub fn last_deploy(&self) -> Option<DeployVirtualMachine> {
        self.inner.lock().deploys.last().cloned()
    }

    /// Parameters of the last template creation.
    #[must_use]
    pub fn last_template(&self) -> Option<CreateTemplate> {
        self.inner.lock().templates.last().cloned()
    }

    /// Parameters of the last tagging call.
    #[must_use]
    pub fn last_tags(&self) -> Option<CreateTags> {
        self.inner.lock().tags.last().cloned()
    }

    fn record(&self, call: &'static str) -> ApiResult<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(call.to_string());
        match inner.failures.get(call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudStackApi for FakeCloudStack {
    fn base_url(&self) -> String {
        self.inner.lock().base_url.clone()
    }

    async fn deploy_virtual_machine(
        &self,
        params: DeployVirtualMachine,
    ) -> ApiResult<DeployedVirtualMachine> {
        self.record("deploy_virtual_machine")?;
        let mut inner = self.inner.lock();
        inner.deploys.push(params);
        inner.vm_state = "Running".to_string();
        Ok(DeployedVirtualMachine {
            id: inner.vm_id.clone(),
            ip_address: inner.vm_ip.clone(),
        })
    }

    async fn query_virtual_machine(&self, id: &str) -> ApiResult<VirtualMachine> {
        self.record("query_virtual_machine")?;
        let mut inner = self.inner.lock();
        let state = match inner.query_script.pop_front() {
            Some(scripted) => scripted?,
            None => inner.vm_state.clone(),
        };
        Ok(VirtualMachine {
            id: id.to_string(),
            state,
            ip_address: inner.vm_ip.clone(),
            iso_id: inner.iso_id.clone(),
        })
    }

    async fn stop_virtual_machine(&self, _id: &str) -> ApiResult<()> {
        self.record("stop_virtual_machine")?;
        self.inner.lock().vm_state = "Stopped".to_string();
        Ok(())
    }

    async fn destroy_virtual_machine(&self, _id: &str) -> ApiResult<()> {
        self.record("destroy_virtual_machine")?;
        self.inner.lock().vm_state = "Destroyed".to_string();
        Ok(())
    }

    async fn detach_iso(&self, _vm_id: &str) -> ApiResult<()> {
        self.record("detach_iso")?;
        self.inner.lock().iso_id = None;
        Ok(())
    }

    async fn root_volume_id(&self, vm_id: &str) -> ApiResult<String> {
        self.record("root_volume_id")?;
        Ok(format!("{vm_id}-root"))
    }

    async fn create_template(&self, params: CreateTemplate) -> ApiResult<Template> {
        self.record("create_template")?;
        let template = Template {
            id: "tpl-new".to_string(),
            name: params.name.clone(),
        };
        self.inner.lock().templates.push(params);
        Ok(template)
    }

    async fn delete_template(&self, _id: &str) -> ApiResult<()> {
        self.record("delete_template")
    }

    async fn create_tags(&self, params: CreateTags) -> ApiResult<()> {
        self.record("create_tags")?;
        self.inner.lock().tags.push(params);
        Ok(())
    }
}
