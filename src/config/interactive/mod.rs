
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, ConfigError, ProviderConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Knowledge Embeddings Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Configure the OpenAI-compatible endpoint used to embed knowledge records.");
    eprintln!();

    configure_provider(&mut config.provider)?;

    let delay_ms: u64 = Input::new()
        .with_prompt("Delay between embedded records (ms)")
        .default(config.backfill.delay_ms)
        .interact_text()?;
    config.backfill.set_delay_ms(delay_ms)?;

    eprintln!();
    match config.provider.api_key() {
        Ok(_) => eprintln!(
            "{}",
            style(format!("✓ API key found in ${}", config.provider.api_key_env)).green()
        ),
        Err(e) => {
            eprintln!("{}", style(format!("⚠ Warning: {}", e)).yellow());
            eprintln!("You can continue, but export the key before running a backfill.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Provider Settings:").bold().yellow());
    match config.provider.embeddings_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.provider.model).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.provider.embedding_dimension).cyan()
    );
    eprintln!(
        "  API Key Variable: {}",
        style(&config.provider.api_key_env).cyan()
    );
    eprintln!(
        "  Timeout: {}",
        style(format!("{}s", config.provider.timeout_seconds)).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Backfill Settings:").bold().yellow());
    eprintln!(
        "  Delay: {}",
        style(format!("{}ms", config.backfill.delay_ms)).cyan()
    );
    eprintln!("  Token Budget: {}", style(config.backfill.max_tokens).cyan());

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!("  Limit: {}", style(config.search.default_limit).cyan());
    eprintln!(
        "  Threshold: {}",
        style(config.search.default_threshold).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Database: {}", style(config.database_path().display()).dim());

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Config::with_base_dir(config_dir)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(provider.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ProviderConfig {
                base_url: input.clone(),
                ..ProviderConfig::default()
            };
            temp_config.embeddings_url()?;
            Ok(())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(provider.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(provider.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(provider.api_key_env.clone())
        .interact_text()?;

    provider.set_base_url(base_url)?;
    provider.set_model(model)?;
    provider.set_embedding_dimension(embedding_dimension)?;
    provider.set_api_key_env(api_key_env)?;

    Ok(())
}
