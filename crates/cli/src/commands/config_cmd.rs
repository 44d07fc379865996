//! `stepweave config` — Configuration commands.

use stepweave_config::AppConfig;

/// Print a config file with every default filled in.
pub async fn print_default() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            if config.default_backend != "mock"
                && config.default_backend != "echo"
                && !config.has_api_key()
            {
                warnings.push("No API key set (set STEPWEAVE_API_KEY or OPENAI_API_KEY env var)");
            }
            if config.gateway.host == "0.0.0.0" {
                warnings.push("Gateway bound to 0.0.0.0 (reachable from other hosts)");
            }

            for w in &warnings {
                println!("   Warning: {w}");
            }

            println!();
            println!("   Backend:   {}", config.default_backend);
            println!("   Model:     {}", config.default_model);
            println!("   Max iters: {}", config.react.max_iters);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Print the effective configuration (file plus environment overrides).
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
