//! Runs a queue of environment launches under a [`LaunchPolicy`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use envstarter_containers::{ContainerRegistry, StartReport};
use envstarter_core::{ContainerId, EnvError, EnvResult, Environment, EventBus, LifecycleEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::policy::{plan, LaunchPolicy};

/// Where a launch request ends up. Implemented by [`ContainerRegistry`].
#[async_trait]
pub trait EnvironmentLauncher: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> EnvResult<StartReport>;
}

#[async_trait]
impl EnvironmentLauncher for ContainerRegistry {
    async fn launch(&self, request: &LaunchRequest) -> EnvResult<StartReport> {
        self.create_and_start(
            request.environment.clone(),
            request.container_id.clone(),
            request.switch_to,
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub environment: Arc<Environment>,
    pub container_id: Option<ContainerId>,
    pub switch_to: bool,
}

impl LaunchRequest {
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            container_id: None,
            switch_to: false,
        }
    }

    pub fn with_container_id(mut self, id: ContainerId) -> Self {
        self.container_id = Some(id);
        self
    }

    pub fn switching(mut self) -> Self {
        self.switch_to = true;
        self
    }

    /// One request per environment; only the last one switches when asked.
    pub fn batch<I>(environments: I, switch_to_last: bool) -> Vec<Self>
    where
        I: IntoIterator<Item = Arc<Environment>>,
    {
        let mut requests: Vec<Self> = environments.into_iter().map(Self::new).collect();
        if switch_to_last {
            if let Some(last) = requests.last_mut() {
                last.switch_to = true;
            }
        }
        requests
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// Position in the submitted queue.
    pub index: usize,
    pub environment_name: String,
    pub result: Result<StartReport, EnvError>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl LaunchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn container_id(&self) -> Option<&ContainerId> {
        self.result.as_ref().ok().map(|report| &report.container_id)
    }
}

pub struct ConcurrentLaunchCoordinator {
    launcher: Arc<dyn EnvironmentLauncher>,
    events: EventBus,
    batch_pause: Duration,
}

impl ConcurrentLaunchCoordinator {
    pub fn new(launcher: Arc<dyn EnvironmentLauncher>, events: EventBus) -> Self {
        Self {
            launcher,
            events,
            batch_pause: Duration::ZERO,
        }
    }

    pub fn for_registry(registry: Arc<ContainerRegistry>) -> Self {
        let events = registry.events().clone();
        Self::new(registry, events)
    }

    /// Pause between consecutive groups of the batched policy.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Launch every request; exactly one outcome per request, in request order.
    pub async fn launch_all(
        &self,
        requests: Vec<LaunchRequest>,
        policy: LaunchPolicy,
    ) -> Vec<LaunchOutcome> {
        let total = requests.len();
        let groups = plan(&policy, total);
        let pause = if policy.pauses_between_groups() {
            self.batch_pause
        } else {
            Duration::ZERO
        };
        info!("Launching {} environment(s), policy {}", total, policy);

        let mut pending: Vec<Option<LaunchRequest>> = requests.into_iter().map(Some).collect();
        let mut outcomes: Vec<Option<LaunchOutcome>> = (0..total).map(|_| None).collect();

        for (batch, group) in groups.iter().enumerate() {
            if batch > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            self.events.emit(LifecycleEvent::BatchStarted {
                batch,
                size: group.len(),
            });

            let mut handles = Vec::with_capacity(group.len());
            for (position, &index) in group.iter().enumerate() {
                let Some(request) = pending[index].take() else {
                    continue;
                };
                let name = request.environment.name.clone();
                let delay = policy.start_offset(position);
                let launcher = self.launcher.clone();
                let handle = tokio::spawn(launch_one(launcher, index, request, delay));
                handles.push((index, name, handle));
            }

            let (mut succeeded, mut failed) = (0, 0);
            for (index, name, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Launch task for '{}' failed: {}", name, e);
                        LaunchOutcome {
                            index,
                            environment_name: name,
                            result: Err(EnvError::Internal(format!("launch task failed: {}", e))),
                            started_at: Utc::now(),
                            duration: Duration::ZERO,
                        }
                    }
                };
                if outcome.is_success() {
                    succeeded += 1;
                } else {
                    failed += 1;
                }
                outcomes[index] = Some(outcome);
            }

            info!(
                "Batch {}/{} done: {} started, {} failed",
                batch + 1,
                groups.len(),
                succeeded,
                failed
            );
            self.events.emit(LifecycleEvent::BatchCompleted {
                batch,
                succeeded,
                failed,
            });
        }

        outcomes.into_iter().flatten().collect()
    }
}

async fn launch_one(
    launcher: Arc<dyn EnvironmentLauncher>,
    index: usize,
    request: LaunchRequest,
    delay: Duration,
) -> LaunchOutcome {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let started_at = Utc::now();
    let clock = Instant::now();
    let result = launcher.launch(&request).await;

    match &result {
        Ok(report) => info!(
            "Launched '{}' as {}: {}",
            request.environment.name,
            report.container_id,
            report.summary()
        ),
        Err(e) => warn!("Failed to launch '{}': {}", request.environment.name, e),
    }

    LaunchOutcome {
        index,
        environment_name: request.environment.name.clone(),
        result,
        started_at,
        duration: clock.elapsed(),
    }
}
