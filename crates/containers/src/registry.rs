//! Multi-environment manager: owns every container and enforces the concurrency limit.

use envstarter_core::{
    ContainerId, ContainerState, DesktopSwitcher, EnvError, EnvResult, Environment, EventBus,
    LifecycleEvent, Metrics,
};
use envstarter_supervisor::ProcessSupervisor;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::container::{Container, ContainerContext, ContainerSettings};
use crate::ledger::PidLedger;
use crate::report::{ContainerSummary, ResumeReport, StartReport, StopReport, SystemStatus};

pub const DEFAULT_MAX_CONTAINERS: usize = 10;

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub max_containers: usize,
    pub container: ContainerSettings,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_containers: DEFAULT_MAX_CONTAINERS,
            container: ContainerSettings::default(),
        }
    }
}

pub struct ContainerRegistry {
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,
    ctx: ContainerContext,
    max_containers: usize,
    /// Slots promised to resumes that are still in flight.
    reserved: AtomicUsize,
    active: parking_lot::RwLock<Option<ContainerId>>,
}

/// Releases a resume's slot reservation when dropped.
struct SlotReservation<'a>(&'a AtomicUsize);

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContainerRegistry {
    pub fn new(
        supervisor: ProcessSupervisor,
        desktop: Arc<dyn DesktopSwitcher>,
        events: EventBus,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            ctx: ContainerContext {
                supervisor,
                desktop,
                events,
                ledger: PidLedger::new(),
                metrics: Metrics::new(),
                settings: settings.container,
            },
            max_containers: settings.max_containers,
            reserved: AtomicUsize::new(0),
            active: parking_lot::RwLock::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub fn max_containers(&self) -> usize {
        self.max_containers
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    pub async fn get(&self, id: &ContainerId) -> EnvResult<Arc<Container>> {
        self.containers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EnvError::NotFound(id.clone()))
    }

    pub async fn len(&self) -> usize {
        self.containers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Slots held by live containers plus those reserved by in-flight resumes.
    /// Callers hold the map write lock.
    fn occupied_slots<'a>(&self, containers: impl Iterator<Item = &'a Arc<Container>>) -> usize {
        containers.filter(|c| c.state().occupies_slot()).count()
            + self.reserved.load(Ordering::SeqCst)
    }

    fn reject_full(&self) -> EnvError {
        warn!(
            "Container limit reached ({} active), rejecting",
            self.max_containers
        );
        self.ctx.metrics.inc_capacity_rejections();
        self.ctx.events.emit(LifecycleEvent::CapacityReached {
            max: self.max_containers,
        });
        EnvError::CapacityExceeded {
            max: self.max_containers,
        }
    }

    /// Admit a new container for `environment` and start it.
    pub async fn create_and_start(
        &self,
        environment: Arc<Environment>,
        desired_id: Option<ContainerId>,
        switch_to_on_start: bool,
    ) -> EnvResult<StartReport> {
        let container = {
            let mut containers = self.containers.write().await;

            let id = match desired_id {
                Some(id) if containers.contains_key(&id) => {
                    return Err(EnvError::DuplicateId(id));
                }
                Some(id) => id,
                None => loop {
                    let id = ContainerId::generate(&environment.name);
                    if !containers.contains_key(&id) {
                        break id;
                    }
                },
            };

            if self.occupied_slots(containers.values()) >= self.max_containers {
                return Err(self.reject_full());
            }

            let container = Arc::new(Container::new(
                id.clone(),
                environment.clone(),
                self.ctx.clone(),
            ));
            containers.insert(id, container.clone());
            container
        };
        let id = container.id().clone();

        let report = match container.start().await {
            Ok(report) => report,
            Err(e) => {
                self.remove_if_current(&container).await;
                return Err(e);
            }
        };

        match report.state {
            ContainerState::Running => {
                self.ctx.metrics.inc_containers_started();
                info!("Container {} started: {}", id, report.summary());
                if switch_to_on_start || environment.container.auto_switch {
                    self.try_switch(&container).await;
                }
                Ok(report)
            }
            ContainerState::Error => {
                self.ctx.metrics.inc_start_failures();
                self.remove_if_current(&container).await;
                Err(EnvError::StartFailed {
                    id,
                    failures: report.failures,
                })
            }
            // Stopped by someone else while starting
            _ => Ok(report),
        }
    }

    async fn try_switch(&self, container: &Arc<Container>) -> bool {
        match container.switch_to().await {
            Ok(true) => {
                *self.active.write() = Some(container.id().clone());
                true
            }
            Ok(false) => {
                debug!("Container {} has no desktop to switch to", container.id());
                false
            }
            Err(e) => {
                debug!("Switch to {} skipped: {}", container.id(), e);
                false
            }
        }
    }

    async fn remove_if_current(&self, container: &Arc<Container>) {
        let mut containers = self.containers.write().await;
        if containers
            .get(container.id())
            .is_some_and(|current| Arc::ptr_eq(current, container))
        {
            containers.remove(container.id());
        }
        drop(containers);

        let mut active = self.active.write();
        if active.as_ref() == Some(container.id()) {
            *active = None;
        }
    }

    /// Stop one container. It leaves the registry once every process is confirmed gone.
    pub async fn stop(&self, id: &ContainerId, force: bool) -> EnvResult<StopReport> {
        let container = self.get(id).await?;
        let report = container.stop(force).await?;
        if report.fully_confirmed() {
            self.remove_if_current(&container).await;
        }
        Ok(report)
    }

    /// Stop every container concurrently. One failure never prevents the rest.
    pub async fn stop_all(&self, force: bool) -> Vec<(ContainerId, EnvResult<StopReport>)> {
        let containers: Vec<Arc<Container>> =
            self.containers.read().await.values().cloned().collect();

        let handles: Vec<_> = containers
            .iter()
            .map(|container| {
                let container = container.clone();
                tokio::spawn(async move { container.stop(force).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (container, handle) in containers.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(EnvError::Internal(format!(
                    "stop task for {} failed: {}",
                    container.id(),
                    e
                ))),
            };
            if matches!(&result, Ok(report) if report.fully_confirmed()) {
                self.remove_if_current(container).await;
            }
            results.push((container.id().clone(), result));
        }
        results
    }

    /// Forced `stop_all`, for process exit.
    pub async fn shutdown_all(&self) -> usize {
        let results = self.stop_all(true).await;
        let mut stopped = 0;
        for (id, result) in &results {
            match result {
                Ok(report) => {
                    if let Some(e) = report.timeout_error() {
                        warn!("{}", e);
                    }
                    stopped += 1;
                }
                Err(e) => warn!("Failed to stop container {} during shutdown: {}", id, e),
            }
        }
        info!("Shutdown complete: {} of {} containers stopped", stopped, results.len());
        stopped
    }

    pub async fn pause(&self, id: &ContainerId) -> EnvResult<()> {
        self.get(id).await?.pause().await
    }

    /// Resuming puts the container back into a slot, so it is admission-checked.
    /// The slot is reserved under the map lock; the resume itself runs without it.
    pub async fn resume(&self, id: &ContainerId) -> EnvResult<ResumeReport> {
        let (container, _reservation) = {
            let containers = self.containers.write().await;
            let container = containers
                .get(id)
                .cloned()
                .ok_or_else(|| EnvError::NotFound(id.clone()))?;

            let state = container.state();
            if state != ContainerState::Paused {
                return Err(EnvError::InvalidTransition {
                    id: id.clone(),
                    operation: "resume",
                    state,
                });
            }
            if self.occupied_slots(containers.values()) >= self.max_containers {
                return Err(self.reject_full());
            }

            self.reserved.fetch_add(1, Ordering::SeqCst);
            (container, SlotReservation(&self.reserved))
        };

        container.resume().await
    }

    pub async fn switch_to(&self, id: &ContainerId) -> EnvResult<bool> {
        let switched = self.get(id).await?.switch_to().await?;
        if switched {
            *self.active.write() = Some(id.clone());
        }
        Ok(switched)
    }

    /// Stop a container and start its environment again under the same id.
    pub async fn restart(&self, id: &ContainerId) -> EnvResult<StartReport> {
        let container = self.get(id).await?;
        let environment = container.environment().clone();

        let report = self.stop(id, false).await?;
        if let Some(e) = report.timeout_error() {
            return Err(e);
        }
        // A retained container would make the id look taken
        self.remove_if_current(&container).await;

        info!("Restarting container {}", id);
        self.create_and_start(environment, Some(id.clone()), false)
            .await
    }

    pub async fn list_containers(&self) -> BTreeMap<ContainerId, ContainerSummary> {
        self.containers
            .read()
            .await
            .iter()
            .map(|(id, container)| (id.clone(), container.summary()))
            .collect()
    }

    pub async fn system_status(&self) -> SystemStatus {
        let containers = self.containers.read().await;
        let mut status = SystemStatus {
            total_containers: containers.len(),
            max_containers: self.max_containers,
            active_container: self.active.read().clone(),
            metrics: self.ctx.metrics.snapshot(),
            ..SystemStatus::default()
        };

        for container in containers.values() {
            let state = container.state();
            if state.is_terminal() {
                continue;
            }
            match state {
                ContainerState::Running => status.running += 1,
                ContainerState::Paused => status.paused += 1,
                _ => {}
            }
            let stats = container.get_stats();
            status.total_processes += stats.process_count;
            status.total_memory_bytes += stats.memory_bytes;
            status.total_cpu_percent += stats.cpu_percent;
            if container.desktop().is_some() {
                status.active_desktops += 1;
            }
        }
        status
    }

    /// Drop stopped or failed containers that were kept around. Returns how many went.
    pub async fn prune(&self) -> usize {
        let mut containers = self.containers.write().await;
        let before = containers.len();
        containers.retain(|_, container| !container.state().is_terminal());
        let pruned = before - containers.len();
        if pruned > 0 {
            debug!("Pruned {} terminal containers", pruned);
        }
        pruned
    }
}
