use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{bail, Result};
use colored::Colorize;
use toolpin::checksum::ChecksumLedger;
use toolpin::config::{checksum_file_path, ProjectConfig, CONFIG_FILE_NAME};
use toolpin::context::InstallContext;
use toolpin::download::HttpClient;
use toolpin::generate::{insert_packages, list_packages, render_packages, resolve, GenerateOptions};
use toolpin::global::utils::{get_bin_dir, get_root_dir};
use toolpin::installer::Installer;
use toolpin::platform::PlatformInfo;
use toolpin::registry::RegistryIndex;
use toolpin::session::InstallSession;
use toolpin::shims::find_shim;
use crate::cli::{ToolpinCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => std::env::current_dir()?.join(CONFIG_FILE_NAME),
    };
    if cli.command != ToolpinCommand::Init && !config_path.exists() {
        bail!("{} not found. Run `toolpin init` to create one.", config_path.display())
    }
    match cli.command {
        ToolpinCommand::Init => {
            execute_init(&config_path)
        }
        ToolpinCommand::Install { only } => {
            execute_install(&config_path, only.as_deref())
        }
        ToolpinCommand::Generate { insert, pin, detail, identifiers } => {
            execute_generate(&config_path, &identifiers, insert, GenerateOptions { pin, detail })
        }
        ToolpinCommand::List => {
            execute_list(&config_path)
        }
        ToolpinCommand::Which { name } => {
            execute_which(&name)
        }
    }
}

pub fn execute_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display())
    }
    ProjectConfig::default().save(config_path)?;
    println!("{} {}", "Created".green().bold(), config_path.display());
    Ok(())
}

fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load_index(config: &ProjectConfig, config_path: &Path, http: &HttpClient) -> Result<RegistryIndex> {
    Ok(RegistryIndex::load(&config.registries, &base_dir(config_path), http)?)
}

pub fn execute_install(config_path: &Path, only: Option<&str>) -> Result<()> {
    let config = ProjectConfig::load(config_path)?;
    let http = HttpClient::new()?;
    let index = load_index(&config, config_path, &http)?;

    let ledger_path = checksum_file_path(config_path);
    let ledger = if config.checksum.enabled {
        Some(Arc::new(ChecksumLedger::load(&ledger_path)?))
    } else {
        None
    };
    let installer = Installer::new(
        get_root_dir()?,
        PlatformInfo::current(),
        Arc::new(http.clone()),
        Arc::new(http),
    )
    .with_policy(config.policy.clone())
    .trust_on_first_use(!config.checksum.require_checksum);

    let session = InstallSession::new(Arc::new(installer), Arc::new(index), ledger.clone());
    let packages = session.descriptors(&config.packages, only)?;
    let result = session.run(&InstallContext::new(), &packages);
    if let Some(ledger) = &ledger {
        ledger.persist_or_log(&ledger_path);
    }
    result?;
    println!("{} {} package(s)", "Installed".green().bold(), packages.len());
    Ok(())
}

pub fn execute_generate(
    config_path: &Path,
    identifiers: &[String],
    insert: bool,
    options: GenerateOptions,
) -> Result<()> {
    let config = ProjectConfig::load(config_path)?;
    let http = HttpClient::new()?;
    let index = load_index(&config, config_path, &http)?;
    let packages = resolve(identifiers, &index, &config.packages, &http, options)?;
    if packages.is_empty() {
        return Ok(());
    }
    if insert {
        let count = packages.len();
        insert_packages(config_path, packages)?;
        println!("{} {} package(s) to {}", "Added".green().bold(), count, config_path.display());
    } else {
        print!("{}", render_packages(&packages)?);
    }
    Ok(())
}

pub fn execute_list(config_path: &Path) -> Result<()> {
    let config = ProjectConfig::load(config_path)?;
    let http = HttpClient::new()?;
    let index = load_index(&config, config_path, &http)?;
    for package in list_packages(&index) {
        println!("{package}");
    }
    Ok(())
}

pub fn execute_which(name: &str) -> Result<()> {
    let bin_dir = get_bin_dir(&get_root_dir()?);
    let Some(shim) = find_shim(&bin_dir, name) else {
        println!("{}", format!("{name} is not installed").yellow());
        return Ok(());
    };
    println!("Found link at: {}", shim.display());
    if let Ok(target) = std::fs::read_link(&shim) {
        println!("Found executable at: {}", target.display());
    }
    Ok(())
}
