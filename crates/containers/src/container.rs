//! One running instance of an environment.

use chrono::{DateTime, Utc};
use envstarter_core::{
    ContainerId, ContainerState, ContainerStats, DesktopHandle, DesktopSwitcher, EnvError,
    EnvResult, Environment, EventBus, LaunchFailure, LaunchItem, LifecycleEvent, Metrics,
};
use envstarter_supervisor::{ProcessRecord, ProcessSupervisor, SupervisorError};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::ledger::PidLedger;
use crate::report::{ContainerSummary, LaunchedItem, ResumeReport, StartReport, StopReport};

#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub poll_interval: Duration,
    /// Pause between consecutive item launches.
    pub item_spacing: Duration,
    /// Upper bound for terminating all of a container's processes.
    pub stop_timeout: Duration,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            item_spacing: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(15),
        }
    }
}

/// Collaborators shared by every container of a registry.
#[derive(Clone)]
pub struct ContainerContext {
    pub supervisor: ProcessSupervisor,
    pub desktop: Arc<dyn DesktopSwitcher>,
    pub events: EventBus,
    pub ledger: PidLedger,
    pub metrics: Arc<Metrics>,
    pub settings: ContainerSettings,
}

struct Inner {
    records: Vec<ProcessRecord>,
    monitor: Option<AbortHandle>,
}

pub struct Container {
    id: ContainerId,
    environment: Arc<Environment>,
    ctx: ContainerContext,
    // Written only while `inner` is held; readable without awaiting.
    state: RwLock<ContainerState>,
    inner: Mutex<Inner>,
    stats: RwLock<ContainerStats>,
    desktop: RwLock<Option<DesktopHandle>>,
    failures: RwLock<Vec<LaunchFailure>>,
    started: RwLock<Option<(Instant, DateTime<Utc>)>>,
    stop_requested: Notify,
}

impl Container {
    pub fn new(id: ContainerId, environment: Arc<Environment>, ctx: ContainerContext) -> Self {
        Self {
            id,
            environment,
            ctx,
            state: RwLock::new(ContainerState::Pending),
            inner: Mutex::new(Inner {
                records: Vec::new(),
                monitor: None,
            }),
            stats: RwLock::new(ContainerStats::default()),
            desktop: RwLock::new(None),
            failures: RwLock::new(Vec::new()),
            started: RwLock::new(None),
            stop_requested: Notify::new(),
        }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn state(&self) -> ContainerState {
        *self.state.read()
    }

    pub fn desktop(&self) -> Option<DesktopHandle> {
        self.desktop.read().clone()
    }

    pub fn failures(&self) -> Vec<LaunchFailure> {
        self.failures.read().clone()
    }

    fn set_state(&self, next: ContainerState) {
        let mut state = self.state.write();
        debug!("Container {}: {} -> {}", self.id, *state, next);
        *state = next;
    }

    fn invalid(&self, operation: &'static str) -> EnvError {
        EnvError::InvalidTransition {
            id: self.id.clone(),
            operation,
            state: self.state(),
        }
    }

    /// Launch every item of the environment. Only valid from `pending`.
    pub async fn start(self: &Arc<Self>) -> EnvResult<StartReport> {
        {
            let _guard = self.inner.lock().await;
            if self.state() != ContainerState::Pending {
                return Err(self.invalid("start"));
            }
            self.set_state(ContainerState::Starting);
        }
        info!(
            "Starting container {} for environment '{}' ({} items)",
            self.id,
            self.environment.name,
            self.environment.total_items()
        );

        if self.environment.container.use_desktop_isolation {
            self.allocate_desktop().await;
        }

        if self.environment.startup_delay > 0 {
            self.pause_unless_stopped(Duration::from_secs(self.environment.startup_delay))
                .await;
        }

        let mut launched = Vec::new();
        let mut failures = Vec::new();

        for (index, item) in self.environment.items().enumerate() {
            if index > 0 {
                self.pause_unless_stopped(self.ctx.settings.item_spacing)
                    .await;
            }
            if self.state() != ContainerState::Starting {
                info!("Container {} stopped while starting, skipping remaining items", self.id);
                break;
            }

            match self.launch_item(item).await {
                Ok(record) => {
                    let entry = LaunchedItem {
                        label: record.label.clone(),
                        pid: record.pid,
                    };
                    if !self.adopt(record).await {
                        break;
                    }
                    self.ctx.events.emit(LifecycleEvent::ItemLaunched {
                        container_id: self.id.clone(),
                        item: entry.label.clone(),
                        pid: entry.pid,
                    });
                    launched.push(entry);
                }
                Err(e) => {
                    warn!("Container {}: failed to launch {}: {}", self.id, item.name(), e);
                    self.ctx.events.emit(LifecycleEvent::ItemLaunchFailed {
                        container_id: self.id.clone(),
                        item: item.name().to_string(),
                        reason: e.to_string(),
                    });
                    failures.push(LaunchFailure {
                        item: item.name().to_string(),
                        kind: item.kind(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        *self.failures.write() = failures.clone();
        self.ctx.metrics.add_items_launched(launched.len() as u64);
        self.ctx.metrics.add_item_failures(failures.len() as u64);

        let state = self.finish_start(&launched, &failures).await;
        if state == ContainerState::Running {
            self.refresh().await;
        }

        Ok(StartReport {
            container_id: self.id.clone(),
            environment: self.environment.name.clone(),
            total_items: self.environment.total_items(),
            launched,
            failures,
            state,
            desktop: self.desktop(),
        })
    }

    async fn launch_item(&self, item: LaunchItem<'_>) -> Result<ProcessRecord, SupervisorError> {
        match item {
            LaunchItem::Application(app) => {
                self.ctx.supervisor.launch_application(&self.id, app).await
            }
            LaunchItem::Website(site) => self.ctx.supervisor.launch_website(&self.id, site).await,
        }
    }

    /// Take ownership of a freshly launched process.
    ///
    /// Returns false when the container was stopped mid-start; the process is
    /// terminated in that case.
    async fn adopt(&self, record: ProcessRecord) -> bool {
        let mut inner = self.inner.lock().await;
        if self.state() != ContainerState::Starting {
            drop(inner);
            warn!(
                "Container {} stopped during launch of {}, terminating pid {}",
                self.id, record.label, record.pid
            );
            self.ctx.supervisor.terminate(&record, true).await;
            return false;
        }
        if !record.alive {
            // waitForExit item that already finished
            return true;
        }
        if let Some(previous) = self.ctx.ledger.claim(record.pid, &self.id) {
            warn!("Pid {} moved from container {} to {}", record.pid, previous, self.id);
        }
        inner.records.push(record);
        true
    }

    async fn finish_start(
        self: &Arc<Self>,
        launched: &[LaunchedItem],
        failures: &[LaunchFailure],
    ) -> ContainerState {
        let mut inner = self.inner.lock().await;
        let state = self.state();
        if state != ContainerState::Starting {
            return state;
        }

        if launched.is_empty() {
            self.set_state(ContainerState::Error);
            let handle = self.desktop.write().take();
            if let Some(handle) = handle {
                self.ctx.desktop.release(&handle).await;
            }
            let message = format!("no items launched for '{}'", self.environment.name);
            error!("Container {}: {}", self.id, message);
            self.ctx.events.emit(LifecycleEvent::ContainerError {
                container_id: self.id.clone(),
                message,
            });
            return ContainerState::Error;
        }

        *self.started.write() = Some((Instant::now(), Utc::now()));
        inner.monitor = Some(self.spawn_monitor());
        self.set_state(ContainerState::Running);
        info!(
            "Container {} running: {} launched, {} failed",
            self.id,
            launched.len(),
            failures.len()
        );
        self.ctx.events.emit(LifecycleEvent::ContainerStarted {
            container_id: self.id.clone(),
            environment: self.environment.name.clone(),
            launched: launched.len(),
            failed: failures.len(),
        });
        ContainerState::Running
    }

    async fn allocate_desktop(&self) {
        let desired = self.environment.container.desktop_index;
        match self.ctx.desktop.allocate(desired).await {
            Ok(handle) => {
                let _inner = self.inner.lock().await;
                // A stop that raced the allocation will not release it for us
                if self.state() != ContainerState::Starting {
                    self.ctx.desktop.release(&handle).await;
                    return;
                }
                info!("Container {} allocated desktop {}", self.id, handle.label);
                *self.desktop.write() = Some(handle);
            }
            Err(e) => {
                warn!(
                    "Container {}: desktop isolation unavailable ({}), continuing without it",
                    self.id, e
                );
            }
        }
    }

    async fn pause_unless_stopped(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let notified = self.stop_requested.notified();
        if self.state() != ContainerState::Starting {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
    }

    fn spawn_monitor(self: &Arc<Self>) -> AbortHandle {
        let weak = Arc::downgrade(self);
        let interval = self.ctx.settings.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(container) = weak.upgrade() else {
                    break;
                };
                match container.state() {
                    ContainerState::Running => container.refresh().await,
                    ContainerState::Paused => {}
                    _ => break,
                }
            }
        });

        let abort = task.abort_handle();
        let weak: Weak<Container> = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    if let Some(container) = weak.upgrade() {
                        container.fail(format!("monitor task failed: {}", e)).await;
                    }
                }
            }
        });
        abort
    }

    async fn fail(&self, message: String) {
        let _guard = self.inner.lock().await;
        if !matches!(self.state(), ContainerState::Running | ContainerState::Paused) {
            return;
        }
        self.set_state(ContainerState::Error);
        error!("Container {}: {}", self.id, message);
        self.ctx.events.emit(LifecycleEvent::ContainerError {
            container_id: self.id.clone(),
            message,
        });
    }

    /// Run one poll cycle now. No-op unless running.
    pub async fn refresh(&self) {
        let mut inner = self.inner.lock().await;
        if self.state() != ContainerState::Running {
            return;
        }
        self.poll_locked(&mut inner).await;
    }

    /// Sample every record, drop the dead and the disowned, update stats.
    async fn poll_locked(&self, inner: &mut Inner) -> usize {
        let samples = self.ctx.supervisor.poll_many(&inner.records).await;
        for (record, sample) in inner.records.iter_mut().zip(samples.iter()) {
            record.apply(sample);
        }

        let mut removed = Vec::new();
        let ledger = &self.ctx.ledger;
        inner.records.retain(|record| {
            let keep = record.alive && ledger.owns(record.pid, &self.id);
            if !keep {
                removed.push((record.pid, record.label.clone(), record.alive));
            }
            keep
        });

        for (pid, label, alive) in &removed {
            if *alive {
                info!("Container {}: pid {} ({}) now owned elsewhere", self.id, pid, label);
                continue;
            }
            self.ctx.ledger.release(*pid, &self.id);
            info!("Container {}: {} (pid {}) exited", self.id, label, pid);
            self.ctx.events.emit(LifecycleEvent::ProcessExited {
                container_id: self.id.clone(),
                pid: *pid,
                label: label.clone(),
            });
        }

        self.update_stats(&inner.records);
        removed.len()
    }

    fn update_stats(&self, records: &[ProcessRecord]) {
        let mut stats = self.stats.write();
        stats.process_count = records.len();
        stats.descendant_count = records.iter().map(|r| r.descendants.len()).sum();
        stats.memory_bytes = records.iter().map(|r| r.memory_bytes).sum();
        stats.cpu_percent = records.iter().map(|r| r.cpu_percent).sum();
    }

    /// Suspend every process. Only valid from `running`.
    pub async fn pause(&self) -> EnvResult<()> {
        let inner = self.inner.lock().await;
        if self.state() != ContainerState::Running {
            return Err(self.invalid("pause"));
        }

        for record in &inner.records {
            match self.ctx.supervisor.suspend(record).await {
                Ok(()) => {}
                Err(e @ SupervisorError::Unsupported(_)) => {
                    return Err(EnvError::Internal(e.to_string()));
                }
                Err(e) => warn!("Container {}: {}", self.id, e),
            }
        }

        self.set_state(ContainerState::Paused);
        info!("Paused container {} ({} processes)", self.id, inner.records.len());
        self.ctx.events.emit(LifecycleEvent::ContainerPaused {
            container_id: self.id.clone(),
        });
        Ok(())
    }

    /// Continue every surviving process. Only valid from `paused`.
    pub async fn resume(&self) -> EnvResult<ResumeReport> {
        let mut inner = self.inner.lock().await;
        if self.state() != ContainerState::Paused {
            return Err(self.invalid("resume"));
        }

        let dropped = self.poll_locked(&mut inner).await;
        for record in &inner.records {
            if let Err(e) = self.ctx.supervisor.resume(record).await {
                warn!("Container {}: {}", self.id, e);
            }
        }

        self.set_state(ContainerState::Running);
        let report = ResumeReport {
            resumed: inner.records.len(),
            dropped,
        };
        info!(
            "Resumed container {} ({} resumed, {} gone while paused)",
            self.id, report.resumed, report.dropped
        );
        self.ctx.events.emit(LifecycleEvent::ContainerResumed {
            container_id: self.id.clone(),
            dropped,
        });
        Ok(report)
    }

    /// Tear the container down. Always ends in `stopped`.
    pub async fn stop(&self, force: bool) -> EnvResult<StopReport> {
        let mut inner = self.inner.lock().await;
        match self.state() {
            ContainerState::Stopped => return Ok(StopReport::noop(self.id.clone())),
            ContainerState::Error if inner.records.is_empty() => {
                return Ok(StopReport::noop(self.id.clone()));
            }
            _ => {}
        }

        self.set_state(ContainerState::Stopping);
        self.stop_requested.notify_waiters();
        if let Some(monitor) = inner.monitor.take() {
            monitor.abort();
        }

        let records: Vec<ProcessRecord> = inner.records.drain(..).collect();
        let mut report = StopReport {
            container_id: self.id.clone(),
            ..StopReport::default()
        };

        if !force && !self.environment.container.close_on_stop {
            for record in &records {
                self.ctx.supervisor.detach(record.pid);
            }
            report.detached = records.len();
            info!("Container {}: left {} processes running", self.id, records.len());
        } else {
            let (terminated, unconfirmed) = self.terminate_all(&records, force).await;
            report.terminated = terminated;
            report.unconfirmed = unconfirmed;
        }

        for record in &records {
            self.ctx.ledger.release(record.pid, &self.id);
        }

        let handle = self.desktop.write().take();
        if let Some(handle) = handle {
            self.ctx.desktop.release(&handle).await;
        }

        {
            let uptime = self.uptime_secs();
            let mut stats = self.stats.write();
            *stats = ContainerStats {
                uptime_secs: uptime,
                ..ContainerStats::default()
            };
        }
        *self.started.write() = None;
        self.set_state(ContainerState::Stopped);
        drop(inner);

        self.ctx.metrics.inc_containers_stopped();
        if !report.unconfirmed.is_empty() {
            self.ctx.metrics.inc_termination_timeouts();
            warn!(
                "Container {} stopped with unconfirmed pids {:?}",
                self.id, report.unconfirmed
            );
        } else {
            info!(
                "Stopped container {} ({} terminated, {} detached)",
                self.id, report.terminated, report.detached
            );
        }
        self.ctx.events.emit(LifecycleEvent::ContainerStopped {
            container_id: self.id.clone(),
            unconfirmed: report.unconfirmed.clone(),
        });
        Ok(report)
    }

    /// Terminate all records concurrently, bounded by the stop timeout.
    async fn terminate_all(&self, records: &[ProcessRecord], force: bool) -> (usize, Vec<u32>) {
        let mut set = JoinSet::new();
        let mut pending: HashSet<u32> = HashSet::new();
        for record in records {
            pending.insert(record.pid);
            let supervisor = self.ctx.supervisor.clone();
            let record = record.clone();
            set.spawn(async move {
                let confirmed = supervisor.terminate(&record, force).await;
                (record.pid, confirmed)
            });
        }

        let mut terminated = 0;
        let mut unconfirmed = Vec::new();
        let collected = tokio::time::timeout(self.ctx.settings.stop_timeout, async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((pid, true)) => {
                        pending.remove(&pid);
                        terminated += 1;
                    }
                    Ok((pid, false)) => {
                        pending.remove(&pid);
                        unconfirmed.push(pid);
                    }
                    Err(e) => error!("Container {}: terminate task failed: {}", self.id, e),
                }
            }
        })
        .await;

        if collected.is_err() {
            warn!(
                "Container {}: termination exceeded {:?}",
                self.id, self.ctx.settings.stop_timeout
            );
            set.abort_all();
        }
        unconfirmed.extend(pending);
        unconfirmed.sort_unstable();
        (terminated, unconfirmed)
    }

    /// Foreground this container's desktop. Only valid from `running`.
    pub async fn switch_to(&self) -> EnvResult<bool> {
        if self.state() != ContainerState::Running {
            return Err(self.invalid("switch to"));
        }
        let Some(handle) = self.desktop() else {
            return Ok(false);
        };

        let switched = self.ctx.desktop.switch_to(&handle).await;
        if switched {
            info!("Switched to container {} on desktop {}", self.id, handle.label);
            self.ctx.events.emit(LifecycleEvent::ContainerSwitched {
                container_id: self.id.clone(),
                desktop_index: handle.index,
            });
        }
        Ok(switched)
    }

    fn uptime_secs(&self) -> u64 {
        self.started
            .read()
            .map(|(instant, _)| instant.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Last polled stats plus wall-clock uptime. Makes no OS calls.
    pub fn get_stats(&self) -> ContainerStats {
        let mut stats = self.stats.read().clone();
        if matches!(
            self.state(),
            ContainerState::Running | ContainerState::Paused
        ) {
            stats.uptime_secs = self.uptime_secs();
        }
        stats
    }

    pub fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            environment_id: self.environment.id.clone(),
            environment_name: self.environment.name.clone(),
            state: self.state(),
            desktop: self.desktop(),
            stats: self.get_stats(),
            failures: self.failures(),
            started_at: self.started.read().map(|(_, at)| at),
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Some(monitor) = self.inner.get_mut().monitor.take() {
            monitor.abort();
        }
    }
}
