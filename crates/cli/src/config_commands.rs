use {anyhow::Result, clap::Subcommand, wapanel_config::PanelConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file in use, if any.
    Path,
}

pub fn handle_config(action: ConfigAction, config: &PanelConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut effective = config.clone();
            effective.data_dir = Some(config.resolved_data_dir());
            effective.media_dir = Some(config.resolved_media_dir());
            print!("{}", toml::to_string_pretty(&effective)?);
        },
        ConfigAction::Path => match wapanel_config::find_config_file() {
            Some(path) => println!("{}", path.display()),
            None => eprintln!("No config file found; using defaults."),
        },
    }
    Ok(())
}
