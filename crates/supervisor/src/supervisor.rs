//! Launching, polling and terminating supervised processes.

use envstarter_core::{Application, ContainerId, Website};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{SupervisorError, SupervisorResult};
use crate::record::{LaunchSpec, ProcessRecord, ProcessSample};
use crate::resolve::{expand_placeholders, resolve_executable};
use crate::table::ProcessTable;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// How long SIGTERM'd processes get before SIGKILL.
    pub grace_period: Duration,
    /// How long to wait for SIGKILL'd processes to disappear.
    pub kill_wait: Duration,
    /// Browser command used for websites without an override.
    pub browser: Option<String>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            kill_wait: Duration::from_secs(2),
            browser: None,
        }
    }
}

/// Starts external programs and keeps track of them.
///
/// Cloning shares the child handles and the process table, so a single
/// supervisor can be handed to every container.
#[derive(Clone)]
pub struct ProcessSupervisor {
    table: ProcessTable,
    children: Arc<Mutex<HashMap<u32, Child>>>,
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            table: ProcessTable::new(),
            children: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub async fn launch(
        &self,
        container_id: &ContainerId,
        spec: &LaunchSpec,
    ) -> SupervisorResult<ProcessRecord> {
        let program = resolve_executable(&spec.command)?;

        let mut command = Command::new(&program);
        command
            .args(&spec.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(dir) = &spec.working_directory {
            let dir = PathBuf::from(expand_placeholders(&dir.to_string_lossy()));
            if dir.is_dir() {
                command.current_dir(dir);
            } else {
                warn!(
                    "Working directory {} for {} does not exist, ignoring",
                    dir.display(),
                    spec.label
                );
            }
        }

        // Own process group, so a terminal Ctrl-C does not reach the children
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| SupervisorError::SpawnRejected {
                command: program.display().to_string(),
                source,
            })?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::NoProcessId(spec.label.clone()))?;
        info!(container = %container_id, pid, "Launched {}", spec.label);

        let mut record = ProcessRecord::new(pid, container_id.clone(), &spec.label);

        if spec.wait_for_exit {
            match child.wait().await {
                Ok(status) => info!("{} (pid {}) exited with {}", spec.label, pid, status),
                Err(e) => warn!("Failed waiting for {} (pid {}): {}", spec.label, pid, e),
            }
            record.alive = false;
        } else {
            self.children.lock().insert(pid, child);
        }

        Ok(record)
    }

    pub async fn launch_application(
        &self,
        container_id: &ContainerId,
        app: &Application,
    ) -> SupervisorResult<ProcessRecord> {
        let mut record = self.launch(container_id, &LaunchSpec::from(app)).await?;
        record.application = Some(app.clone());
        Ok(record)
    }

    pub async fn launch_website(
        &self,
        container_id: &ContainerId,
        site: &Website,
    ) -> SupervisorResult<ProcessRecord> {
        site.validate_url().map_err(SupervisorError::InvalidUrl)?;
        let url = site.url.trim();

        let spec = match &site.browser {
            Some(browser) => {
                let mut args = Vec::new();
                if !site.new_tab {
                    args.push("--new-window".to_string());
                }
                args.push(url.to_string());
                LaunchSpec::new(&site.name, browser.to_string_lossy()).with_args(args)
            }
            None => self.default_opener(&site.name, url),
        };

        self.launch(container_id, &spec).await
    }

    fn default_opener(&self, label: &str, url: &str) -> LaunchSpec {
        let configured = self.settings.browser.clone().or_else(|| {
            std::env::var("BROWSER")
                .ok()
                .and_then(|value| value.split(':').next().map(str::to_string))
                .filter(|value| !value.trim().is_empty())
        });

        if let Some(browser) = configured {
            return LaunchSpec::new(label, browser).with_args([url]);
        }

        if cfg!(target_os = "macos") {
            LaunchSpec::new(label, "open").with_args([url])
        } else if cfg!(windows) {
            LaunchSpec::new(label, "cmd").with_args(["/C", "start", "", url])
        } else {
            LaunchSpec::new(label, "xdg-open").with_args([url])
        }
    }

    pub async fn poll(&self, record: &ProcessRecord) -> ProcessSample {
        self.poll_many(std::slice::from_ref(record))
            .await
            .pop()
            .unwrap_or_else(|| ProcessSample::dead(record.pid))
    }

    /// Sample every record against a single process table refresh.
    pub async fn poll_many(&self, records: &[ProcessRecord]) -> Vec<ProcessSample> {
        let exited: HashSet<u32> = records
            .iter()
            .filter(|r| self.reap(r.pid))
            .map(|r| r.pid)
            .collect();
        let snapshot = self.table.snapshot().await;

        records
            .iter()
            .map(|record| {
                if !record.alive || exited.contains(&record.pid) || !snapshot.is_alive(record.pid)
                {
                    return ProcessSample::dead(record.pid);
                }
                let descendants = snapshot.descendants(record.pid);
                let (cpu_percent, memory_bytes) = snapshot.usage(record.pid, &descendants);
                ProcessSample {
                    pid: record.pid,
                    alive: true,
                    cpu_percent,
                    memory_bytes,
                    descendants,
                }
            })
            .collect()
    }

    /// Terminate a process and its descendants.
    ///
    /// Returns true once every pid is confirmed gone.
    pub async fn terminate(&self, record: &ProcessRecord, force: bool) -> bool {
        self.reap(record.pid);
        let snapshot = self.table.snapshot().await;

        // An exited root's pid may already belong to someone else
        let root_alive = record.alive && snapshot.is_alive(record.pid);
        let mut targets: BTreeSet<u32> = record
            .descendants
            .iter()
            .copied()
            .filter(|pid| snapshot.is_alive(*pid))
            .collect();
        if root_alive {
            targets.extend(snapshot.descendants(record.pid));
        }
        let mut targets: Vec<u32> = targets.into_iter().collect();
        if root_alive {
            targets.push(record.pid);
        }

        if targets.is_empty() {
            self.children.lock().remove(&record.pid);
            return true;
        }

        debug!(
            "Terminating {} (pid {}) with {} process(es), force={}",
            record.label,
            record.pid,
            targets.len(),
            force
        );
        let gone = self.signal_and_wait(record.pid, &targets, force).await;
        if gone {
            self.children.lock().remove(&record.pid);
            info!("Terminated {} (pid {})", record.label, record.pid);
        } else {
            warn!(
                "{} (pid {}) still has live processes after SIGKILL",
                record.label, record.pid
            );
        }
        gone
    }

    #[cfg(unix)]
    async fn signal_and_wait(&self, _root: u32, targets: &[u32], force: bool) -> bool {
        use crate::signals::{send_all, Signal};

        if !force {
            send_all(targets, Signal::SIGTERM);
            // A stopped process cannot act on SIGTERM until continued
            send_all(targets, Signal::SIGCONT);
            if self.wait_gone(targets, self.settings.grace_period).await {
                return true;
            }
            warn!(
                "{} process(es) ignored SIGTERM for {:?}, sending SIGKILL",
                targets.len(),
                self.settings.grace_period
            );
        }

        let remaining = self.still_alive(targets).await;
        send_all(&remaining, Signal::SIGKILL);
        self.wait_gone(&remaining, self.settings.kill_wait).await
    }

    #[cfg(not(unix))]
    async fn signal_and_wait(&self, root: u32, targets: &[u32], _force: bool) -> bool {
        if let Some(child) = self.children.lock().get_mut(&root) {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill pid {}: {}", root, e);
            }
        }
        self.wait_gone(targets, self.settings.kill_wait).await
    }

    async fn still_alive(&self, pids: &[u32]) -> Vec<u32> {
        for &pid in pids {
            self.reap(pid);
        }
        let snapshot = self.table.snapshot().await;
        pids.iter()
            .copied()
            .filter(|pid| snapshot.is_alive(*pid))
            .collect()
    }

    async fn wait_gone(&self, pids: &[u32], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.still_alive(pids).await.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Stop the process tree (SIGSTOP), root first.
    #[cfg(unix)]
    pub async fn suspend(&self, record: &ProcessRecord) -> SupervisorResult<()> {
        use crate::signals::{send, send_all, Signal};

        let snapshot = self.table.snapshot().await;
        if !snapshot.is_alive(record.pid) {
            return Ok(());
        }
        send(record.pid, Signal::SIGSTOP)?;
        send_all(&snapshot.descendants(record.pid), Signal::SIGSTOP);
        debug!("Suspended {} (pid {})", record.label, record.pid);
        Ok(())
    }

    /// Continue the process tree (SIGCONT), descendants first.
    #[cfg(unix)]
    pub async fn resume(&self, record: &ProcessRecord) -> SupervisorResult<()> {
        use crate::signals::{send, send_all, Signal};

        let snapshot = self.table.snapshot().await;
        send_all(&snapshot.descendants(record.pid), Signal::SIGCONT);
        send(record.pid, Signal::SIGCONT)?;
        debug!("Resumed {} (pid {})", record.label, record.pid);
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn suspend(&self, _record: &ProcessRecord) -> SupervisorResult<()> {
        Err(SupervisorError::Unsupported("suspending processes"))
    }

    #[cfg(not(unix))]
    pub async fn resume(&self, _record: &ProcessRecord) -> SupervisorResult<()> {
        Err(SupervisorError::Unsupported("resuming processes"))
    }

    /// Stop tracking a process without touching it.
    pub fn detach(&self, pid: u32) {
        if self.children.lock().remove(&pid).is_some() {
            debug!("Detached pid {}", pid);
        }
    }

    /// Collect the exit status of an owned child, if it has exited.
    fn reap(&self, pid: u32) -> bool {
        let mut children = self.children.lock();
        let Some(child) = children.get_mut(&pid) else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Reaped pid {} ({})", pid, status);
                children.remove(&pid);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to query pid {}: {}", pid, e);
                false
            }
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(SupervisorSettings::default())
    }
}
