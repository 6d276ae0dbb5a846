use anyhow::Result;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    let store = config.environment_store()?;
    let environments = store.load().await?;

    if environments.is_empty() {
        println!("No environments in {}", store.path().display());
        return Ok(());
    }

    println!("📋 Environments ({})\n", environments.len());
    for env in &environments {
        println!(
            "  {}  [{} apps, {} sites]",
            env.name,
            env.applications.len(),
            env.websites.len()
        );
        if !env.description.is_empty() {
            println!("      {}", env.description);
        }
        if env.container.use_desktop_isolation {
            match env.container.desktop_index {
                Some(index) => println!("      desktop {}", index),
                None => println!("      own desktop"),
            }
        }
    }
    Ok(())
}
