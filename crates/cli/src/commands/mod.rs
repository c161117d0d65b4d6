//! Command implementations for gadgetctl

pub mod gadget;
pub mod runtime;

use anyhow::Result;
use gadget_configfs::GadgetManager;

use crate::config::AppConfig;

/// What every command needs: the loaded config and the output mode.
#[derive(Debug)]
pub struct Context {
    pub config: AppConfig,
    pub json: bool,
}

impl Context {
    pub fn new(config: AppConfig, json: bool) -> Self {
        Self { config, json }
    }

    /// Manager over the live configfs at the configured paths.
    pub fn manager(&self) -> Result<GadgetManager> {
        Ok(GadgetManager::system(self.config.gadget.clone())?)
    }
}
