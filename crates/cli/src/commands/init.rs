//! `causeway init` — Write a default configuration.

use std::path::Path;

use causeway_config::AppConfig;

pub async fn run(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_file(path);

    println!("Causeway — Setup");
    println!("================\n");

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("  Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created {}", config_path.display());
    println!("\n  Next steps:");
    println!("    1. Pick a condenser strategy and budget under [condenser] and [controller.budget]");
    println!("    2. Turn on [security] confirmation_mode if actions should be approved");
    println!("    3. Run: causeway run --script task.toml\n");

    Ok(())
}
