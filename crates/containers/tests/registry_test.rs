#![cfg(unix)]

use envstarter_containers::{ContainerRegistry, ContainerSettings, RegistrySettings};
use envstarter_core::{
    Application, ContainerId, ContainerState, DesktopSwitcher, EnvError, Environment, EventBus,
    LifecycleEvent, NoDesktop, Website,
};
use envstarter_desktop::HyprlandDesktop;
use envstarter_supervisor::{ProcessSupervisor, SupervisorSettings};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn registry_with(max: usize, desktop: Arc<dyn DesktopSwitcher>) -> ContainerRegistry {
    let supervisor = ProcessSupervisor::new(SupervisorSettings {
        grace_period: Duration::from_secs(1),
        kill_wait: Duration::from_secs(2),
        browser: None,
    });
    ContainerRegistry::new(
        supervisor,
        desktop,
        EventBus::new(64),
        RegistrySettings {
            max_containers: max,
            container: ContainerSettings {
                poll_interval: Duration::from_millis(100),
                item_spacing: Duration::ZERO,
                stop_timeout: Duration::from_secs(5),
            },
        },
    )
}

fn registry(max: usize) -> ContainerRegistry {
    registry_with(max, Arc::new(NoDesktop))
}

fn sleeper(name: &str) -> Application {
    Application::new(name, "sleep").with_arguments("30")
}

fn sleepy_env(name: &str, count: usize) -> Arc<Environment> {
    let mut env = Environment::new(name);
    for i in 0..count {
        env.applications.push(sleeper(&format!("Sleeper {}", i)));
    }
    Arc::new(env)
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_dev_environment_editor_and_browser() {
    let dir = TempDir::new().unwrap();
    let browser = write_script(dir.path(), "browser.sh", "sleep 30");

    let env = Environment::new("Dev")
        .with_application(Application::new("Editor", "/bin/true"))
        .with_website(Website::new("Docs", "https://example.com").with_browser(&browser));

    let registry = registry(10);
    let report = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap();

    assert_eq!(report.state, ContainerState::Running);
    assert_eq!(report.launched.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.summary(), "2 of 2 items launched");
    assert!(report.container_id.as_str().starts_with("dev-"));

    // The editor exits right away; the browser keeps running
    let container = registry.get(&report.container_id).await.unwrap();
    let mut stats = container.get_stats();
    for _ in 0..50 {
        container.refresh().await;
        stats = container.get_stats();
        if stats.process_count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(stats.process_count, 1);
    assert_eq!(container.state(), ContainerState::Running);

    let stop = registry.stop(&report.container_id, false).await.unwrap();
    assert!(stop.fully_confirmed());
    assert_eq!(container.state(), ContainerState::Stopped);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_partial_failure_still_runs() {
    let env = Environment::new("Chat")
        .with_application(sleeper("Terminal"))
        .with_application(Application::new("Discord", "/nonexistent/discord-4821"));

    let registry = registry(10);
    let mut events = registry.events().subscribe();
    let report = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap();

    assert_eq!(report.state, ContainerState::Running);
    assert_eq!(report.launched.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report
        .summary()
        .starts_with("1 of 2 items launched; Discord failed: executable not found"));

    let mut saw_failure = false;
    let mut saw_started = false;
    while let Ok(event) = events.try_recv() {
        match event {
            LifecycleEvent::ItemLaunchFailed { item, .. } => saw_failure = item == "Discord",
            LifecycleEvent::ContainerStarted { launched, failed, .. } => {
                saw_started = launched == 1 && failed == 1
            }
            _ => {}
        }
    }
    assert!(saw_failure);
    assert!(saw_started);

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_all_items_failing_is_start_failed() {
    let env = Environment::new("Broken")
        .with_application(Application::new("Missing", "/nonexistent/app-4821"))
        .with_website(Website::new("Bad", "not a url"));

    let registry = registry(10);
    let err = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap_err();

    match err {
        EnvError::StartFailed { failures, .. } => assert_eq!(failures.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    assert!(registry.is_empty().await);
    assert_eq!(registry.metrics().snapshot().start_failures, 1);
}

#[tokio::test]
async fn test_capacity_admits_exactly_max() {
    let registry = Arc::new(registry(2));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .create_and_start(sleepy_env(&format!("Env {}", i), 1), None, false)
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(EnvError::CapacityExceeded { max }) => {
                assert_eq!(max, 2);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(ok, 2);
    assert_eq!(rejected, 1);

    let status = registry.system_status().await;
    assert_eq!(status.running, 2);
    assert_eq!(status.total_processes, 2);

    let results = registry.stop_all(false).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_pause_resume_preserves_processes() {
    let registry = registry(10);
    let report = registry
        .create_and_start(sleepy_env("Work", 2), None, false)
        .await
        .unwrap();
    let id = report.container_id.clone();

    registry.pause(&id).await.unwrap();
    let container = registry.get(&id).await.unwrap();
    assert_eq!(container.state(), ContainerState::Paused);

    let err = registry.pause(&id).await.unwrap_err();
    assert!(matches!(
        err,
        EnvError::InvalidTransition {
            state: ContainerState::Paused,
            ..
        }
    ));

    let resumed = registry.resume(&id).await.unwrap();
    assert_eq!(resumed.resumed, 2);
    assert_eq!(resumed.dropped, 0);
    assert_eq!(container.get_stats().process_count, 2);
    for item in &report.launched {
        assert!(pid_alive(item.pid));
    }

    registry.stop(&id, false).await.unwrap();
    for item in &report.launched {
        assert!(!pid_alive(item.pid));
    }
}

#[tokio::test]
async fn test_process_killed_while_paused_is_dropped_on_resume() {
    let registry = registry(10);
    let report = registry
        .create_and_start(sleepy_env("Work", 2), None, false)
        .await
        .unwrap();
    let id = report.container_id.clone();
    registry.pause(&id).await.unwrap();

    let victim = report.launched[0].pid;
    std::process::Command::new("kill")
        .args(["-9", &victim.to_string()])
        .status()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let resumed = registry.resume(&id).await.unwrap();
    assert_eq!(resumed.dropped, 1);
    assert_eq!(resumed.resumed, 1);

    registry.stop(&id, true).await.unwrap();
}

#[tokio::test]
async fn test_forced_stop_is_bounded() {
    let dir = TempDir::new().unwrap();
    let stubborn = write_script(dir.path(), "stubborn.sh", "trap '' TERM\nsleep 30");
    let env = Environment::new("Stubborn")
        .with_application(Application::new("Stubborn", stubborn.display().to_string()));

    let registry = registry(10);
    let report = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap();
    let container = registry.get(&report.container_id).await.unwrap();

    let started = Instant::now();
    let stop = registry.stop(&report.container_id, true).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(stop.timeout_error().is_none());
    assert_eq!(stop.terminated, 1);
    assert_eq!(container.state(), ContainerState::Stopped);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let registry = registry(10);
    let report = registry
        .create_and_start(sleepy_env("Once", 1), None, false)
        .await
        .unwrap();
    let container = registry.get(&report.container_id).await.unwrap();

    let first = container.stop(false).await.unwrap();
    assert!(!first.noop);
    let second = container.stop(false).await.unwrap();
    assert!(second.noop);
    assert_eq!(container.state(), ContainerState::Stopped);

    // Stopped directly, so the registry kept it until pruned
    assert_eq!(registry.prune().await, 1);
    assert!(matches!(
        registry.stop(&report.container_id, false).await,
        Err(EnvError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_duplicate_desired_id_is_rejected() {
    let registry = registry(10);
    let id = ContainerId::new("fixed");
    registry
        .create_and_start(sleepy_env("A", 1), Some(id.clone()), false)
        .await
        .unwrap();

    let err = registry
        .create_and_start(sleepy_env("B", 1), Some(id.clone()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, EnvError::DuplicateId(dup) if dup == id));

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_close_on_stop_false_detaches() {
    let mut env = Environment::new("Keep").with_application(sleeper("Survivor"));
    env.container.close_on_stop = false;

    let registry = registry(10);
    let report = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap();
    let pid = report.launched[0].pid;

    let stop = registry.stop(&report.container_id, false).await.unwrap();
    assert_eq!(stop.detached, 1);
    assert_eq!(stop.terminated, 0);
    assert!(pid_alive(pid));

    std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
}

#[tokio::test]
async fn test_resume_is_admission_checked() {
    let registry = registry(1);
    let a = registry
        .create_and_start(sleepy_env("A", 1), None, false)
        .await
        .unwrap();
    registry.pause(&a.container_id).await.unwrap();

    // Paused containers do not hold a slot
    registry
        .create_and_start(sleepy_env("B", 1), None, false)
        .await
        .unwrap();

    let err = registry.resume(&a.container_id).await.unwrap_err();
    assert!(matches!(err, EnvError::CapacityExceeded { max: 1 }));

    registry.shutdown_all().await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_resume_during_stop_does_not_block_registry() {
    let dir = TempDir::new().unwrap();
    let stubborn = write_script(
        dir.path(),
        "stubborn.sh",
        "trap '' TERM\nwhile true; do sleep 1; done",
    );
    let env = Environment::new("Stubborn")
        .with_application(Application::new("Stubborn", stubborn.display().to_string()));

    let registry = Arc::new(registry(10));
    let id = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap()
        .container_id;
    let container = registry.get(&id).await.unwrap();

    let stop = tokio::spawn({
        let registry = registry.clone();
        let id = id.clone();
        async move { registry.stop(&id, true).await }
    });
    let deadline = Instant::now() + Duration::from_secs(2);
    while container.state() != ContainerState::Stopping && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(container.state(), ContainerState::Stopping);

    let resume = tokio::spawn({
        let registry = registry.clone();
        let id = id.clone();
        async move { registry.resume(&id).await }
    });

    let started = Instant::now();
    let listed = registry.list_containers().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(listed.contains_key(&id));
    assert!(!stop.is_finished());

    let err = resume.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        EnvError::InvalidTransition {
            operation: "resume",
            ..
        }
    ));

    stop.await.unwrap().unwrap();
    assert_eq!(container.state(), ContainerState::Stopped);
}

#[tokio::test]
async fn test_restart_keeps_id() {
    let registry = registry(10);
    let id = ContainerId::new("restartable");
    let first = registry
        .create_and_start(sleepy_env("Again", 1), Some(id.clone()), false)
        .await
        .unwrap();

    let second = registry.restart(&id).await.unwrap();
    assert_eq!(second.container_id, id);
    assert_ne!(first.launched[0].pid, second.launched[0].pid);
    assert!(!pid_alive(first.launched[0].pid));

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let registry = registry(10);
    let id = ContainerId::new("ghost");
    assert!(matches!(registry.pause(&id).await, Err(EnvError::NotFound(_))));
    assert!(matches!(registry.resume(&id).await, Err(EnvError::NotFound(_))));
    assert!(matches!(registry.switch_to(&id).await, Err(EnvError::NotFound(_))));
    assert!(matches!(registry.restart(&id).await, Err(EnvError::NotFound(_))));
}

#[tokio::test]
async fn test_desktop_isolation_and_switch() {
    let desktop = Arc::new(HyprlandDesktop::with_command("true"));
    let registry = registry_with(10, desktop.clone());

    let mut env = Environment::new("Isolated").with_application(sleeper("App"));
    env.container.use_desktop_isolation = true;
    env.container.desktop_index = Some(5);

    let report = registry
        .create_and_start(Arc::new(env), None, true)
        .await
        .unwrap();
    assert_eq!(report.desktop.as_ref().map(|d| d.index), Some(5));

    let status = registry.system_status().await;
    assert_eq!(status.active_desktops, 1);
    assert_eq!(status.active_container.as_ref(), Some(&report.container_id));
    assert!(registry.switch_to(&report.container_id).await.unwrap());

    registry.stop(&report.container_id, false).await.unwrap();
    assert_eq!(desktop.in_use(), 0);
}

#[tokio::test]
async fn test_switch_without_desktop_is_false() {
    let registry = registry(10);
    let report = registry
        .create_and_start(sleepy_env("Plain", 1), None, false)
        .await
        .unwrap();
    assert!(!registry.switch_to(&report.container_id).await.unwrap());

    registry.pause(&report.container_id).await.unwrap();
    assert!(matches!(
        registry.switch_to(&report.container_id).await,
        Err(EnvError::InvalidTransition { .. })
    ));
    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_stop_during_startup_delay_cancels_launch() {
    let registry = Arc::new(registry(10));
    let mut env = Environment::new("Slow").with_application(sleeper("Late"));
    env.startup_delay = 10;
    let id = ContainerId::new("slow");

    let starter = {
        let registry = registry.clone();
        let id = id.clone();
        tokio::spawn(async move {
            registry
                .create_and_start(Arc::new(env), Some(id), false)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let stop = registry.stop(&id, false).await.unwrap();
    assert_eq!(stop.terminated, 0);

    let report = starter.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.state, ContainerState::Stopped);
    assert!(report.launched.is_empty());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_monitor_drops_exited_processes_without_stopping() {
    let env = Environment::new("Short")
        .with_application(Application::new("Blip", "sh").with_arguments("-c 'sleep 0.2'"))
        .with_application(sleeper("Stay"));

    let registry = registry(10);
    let mut events = registry.events().subscribe();
    let report = registry
        .create_and_start(Arc::new(env), None, false)
        .await
        .unwrap();
    let container = registry.get(&report.container_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(container.get_stats().process_count, 1);
    assert_eq!(container.state(), ContainerState::Running);

    let mut exited = None;
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::ProcessExited { label, .. } = event {
            exited = Some(label);
        }
    }
    assert_eq!(exited.as_deref(), Some("Blip"));

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_list_containers_and_summary() {
    let registry = registry(10);
    let report = registry
        .create_and_start(sleepy_env("Listed", 1), None, false)
        .await
        .unwrap();

    let listed = registry.list_containers().await;
    let summary = listed.get(&report.container_id).unwrap();
    assert_eq!(summary.environment_name, "Listed");
    assert_eq!(summary.state, ContainerState::Running);
    assert_eq!(summary.stats.process_count, 1);
    assert!(summary.started_at.is_some());

    let json = serde_json::to_value(summary).unwrap();
    assert_eq!(json["state"], "running");

    registry.shutdown_all().await;
}
