use std::path::Path;

use crate::config::Config;

pub fn cmd_init(path: Option<&Path>) -> anyhow::Result<()> {
    if Config::create_default_if_missing(path)? {
        println!("Created default config file.");
    } else {
        println!("Config file already exists, leaving it untouched.");
    }
    Ok(())
}
