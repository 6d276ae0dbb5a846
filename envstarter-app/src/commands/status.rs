use anyhow::Result;
use envstarter_desktop::{DesktopKind, HyprlandDesktop};
use std::path::Path;

use crate::config::Config;

pub async fn run(config: &Config, config_path: Option<&Path>) -> Result<()> {
    println!("⚙️  Configuration\n");

    match config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => {
            let default = Config::default_path()?;
            if default.exists() {
                println!("Config file: {}", default.display());
            } else {
                println!("Config file: none (defaults)");
            }
        }
    }

    let store = config.environment_store()?;
    match store.load().await {
        Ok(environments) => println!(
            "Environments: {} ({} defined)",
            store.path().display(),
            environments.len()
        ),
        Err(e) => println!("Environments: {} ✗ ({})", store.path().display(), e),
    }

    let hyprland = HyprlandDesktop::is_available();
    let desktop = match config.desktop {
        DesktopKind::None => "none".to_string(),
        DesktopKind::Hyprland if hyprland => "hyprland ✓".to_string(),
        DesktopKind::Hyprland => "hyprland ✗ (no session detected)".to_string(),
        DesktopKind::Auto if hyprland => "auto -> hyprland".to_string(),
        DesktopKind::Auto => "auto -> none".to_string(),
    };
    println!("Desktop backend: {}", desktop);
    println!();
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
