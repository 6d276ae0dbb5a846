use anyhow::{bail, Context, Result};
use envstarter_containers::{ContainerRegistry, ContainerSummary, SystemStatus};
use envstarter_core::{ContainerId, EnvError, Environment};
use envstarter_launcher::{ConcurrentLaunchCoordinator, LaunchOutcome, LaunchRequest};
use envstarter_storage::StorageError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cli::LaunchArgs;
use crate::config::Config;

pub async fn run(config: &Config, args: &LaunchArgs) -> Result<()> {
    let mut launch = config.launch.clone();
    args.apply_to(&mut launch);
    launch.validate()?;

    let environments = resolve(config, args).await?;
    let registry = Arc::new(crate::build_registry(config));
    let coordinator = ConcurrentLaunchCoordinator::for_registry(registry.clone())
        .with_batch_pause(launch.batch_pause());

    let requests = LaunchRequest::batch(environments, args.switch);
    let outcomes = coordinator.launch_all(requests, launch.policy()).await;

    let started = outcomes.iter().filter(|o| o.is_success()).count();
    for outcome in &outcomes {
        print_outcome(outcome);
    }
    println!("\n{} of {} environment(s) started", started, outcomes.len());

    if started == 0 {
        bail!("No environment started");
    }

    if args.monitor {
        monitor(&registry, config.poll_interval()).await?;
    }
    Ok(())
}

async fn resolve(config: &Config, args: &LaunchArgs) -> Result<Vec<Arc<Environment>>> {
    let store = config.environment_store()?;
    if args.launches_all() {
        let environments = store.load().await?;
        if environments.is_empty() {
            bail!("No environments defined in {}", store.path().display());
        }
        return Ok(environments.into_iter().map(Arc::new).collect());
    }

    match store.find(&args.target).await {
        Ok(env) => Ok(vec![Arc::new(env)]),
        Err(StorageError::NotFound(key)) => Err(EnvError::EnvironmentNotFound(key).into()),
        Err(e) => Err(e).with_context(|| format!("Cannot launch '{}'", args.target)),
    }
}

fn print_outcome(outcome: &LaunchOutcome) {
    match &outcome.result {
        Ok(report) if report.is_running() => println!(
            "✅ {} [{}]: {}",
            outcome.environment_name,
            report.container_id,
            report.summary()
        ),
        Ok(report) => println!(
            "⚠️  {} [{}] ended {}: {}",
            outcome.environment_name,
            report.container_id,
            report.state,
            report.summary()
        ),
        Err(e) => println!("❌ {}: {}", outcome.environment_name, e),
    }
}

async fn monitor(registry: &ContainerRegistry, every: Duration) -> Result<()> {
    println!("\nMonitoring, press Ctrl-C to stop everything");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = registry.system_status().await;
                let containers = registry.list_containers().await;
                print_status(&status, &containers);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!("Stopping all containers");
    let stopped = registry.shutdown_all().await;
    registry.prune().await;
    println!("Stopped {} container(s)", stopped);
    Ok(())
}

fn print_status(status: &SystemStatus, containers: &BTreeMap<ContainerId, ContainerSummary>) {
    println!(
        "\n📊 {}/{} containers ({} running, {} paused), {} processes, {:.1} MB, {:.1}% CPU",
        status.total_containers,
        status.max_containers,
        status.running,
        status.paused,
        status.total_processes,
        status.total_memory_bytes as f64 / (1024.0 * 1024.0),
        status.total_cpu_percent
    );
    for (id, summary) in containers {
        let marker = if status.active_container.as_ref() == Some(id) {
            "*"
        } else {
            " "
        };
        println!(
            "  {} {} {:<10} {:>3} procs {:>8.1} MB  up {}s",
            marker,
            summary.environment_name,
            summary.state.as_str(),
            summary.stats.process_count + summary.stats.descendant_count,
            summary.stats.memory_mb(),
            summary.stats.uptime_secs
        );
    }
}
