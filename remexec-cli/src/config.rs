use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remexec_core::RemexecConfig;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a commented config template
    Init(InitArgs),
    /// Show the effective configuration
    Show,
    /// Validate paths, profiles and secrets
    Validate,
    /// Show config file path
    Path,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force overwrite existing config
    #[arg(long, short)]
    pub force: bool,
}

pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Init(args) => run_init(args),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Validate => run_validate(),
        ConfigCommands::Path => run_path(),
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    let config_path = RemexecConfig::config_path();

    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {:?}\n\nUse --force to overwrite",
            config_path
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let template_content = include_str!("../config.template.toml");
    std::fs::write(&config_path, template_content)
        .context(format!("Failed to write config file: {:?}", config_path))?;

    println!("✅ Created config at: {:?}", config_path);
    println!("\nNext steps:");
    println!("  1. Edit the config: $EDITOR {:?}", config_path);
    println!("  2. Run: remexec config validate");
    println!("  3. Run: remexec detect");

    Ok(())
}

fn run_show() -> Result<()> {
    let config = RemexecConfig::load()?;

    let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?;
    println!("{}", toml_str);

    Ok(())
}

fn run_validate() -> Result<()> {
    println!("🔍 Validating configuration...");

    let config = RemexecConfig::load()?;
    println!("   ✓ Config loaded from {}", RemexecConfig::config_path().display());
    println!("   {} host profile(s)", config.hosts.len());

    let errors = config.validate();
    if !errors.is_empty() {
        eprintln!("\n❌ Validation failed:");
        for error in &errors {
            eprintln!("  ✗ {}", error);
        }
        std::process::exit(1);
    }

    let secret_warnings = config.validate_secrets();
    if !secret_warnings.is_empty() {
        println!("\n⚠️  Security warnings:");
        for warning in &secret_warnings {
            println!("   {}", warning);
        }
        println!("\n   Config should use password_env for secrets.");
    }

    println!("\n✅ Configuration valid!");

    Ok(())
}

fn run_path() -> Result<()> {
    println!("{}", RemexecConfig::config_path().display());
    Ok(())
}
