use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    courier_config::CourierConfig,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration (file, env overrides and flags applied).
    Show {
        /// Print JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },
    /// Print the path of the config file in use, or where one would be created.
    Path,
}

/// Load the config the server would run with.
///
/// An explicit path must load; discovery falls back to defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<CourierConfig> {
    match explicit {
        Some(path) => {
            let mut config = courier_config::load_config(path)?;
            courier_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(courier_config::discover_and_load()),
    }
}

pub fn handle_config(
    action: ConfigAction,
    config: &CourierConfig,
    explicit: Option<PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            println!("{}", render(config, json)?);
            Ok(())
        },
        ConfigAction::Path => {
            let path = explicit.unwrap_or_else(courier_config::find_or_default_config_path);
            println!("{}", path.display());
            Ok(())
        },
    }
}

fn render(config: &CourierConfig, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(config).context("failed to render config as JSON")
    } else {
        toml::to_string_pretty(config).context("failed to render config as TOML")
    }
}
