use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Rewrites the credential tag of stored artifacts when a tenant's key rotates
#[derive(Parser, Debug)]
#[command(name = "meta-migrator", version)]
pub struct Cli {
    /// Address to bind the HTTP server to (overrides BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory for log files (overrides LOG_DIR)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Root of the object store (overrides STORE_ROOT)
    #[arg(long)]
    pub store_root: Option<PathBuf>,

    /// Tenant registry document (overrides APPS_FILE)
    #[arg(long)]
    pub apps_file: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Command-line flags win over the environment
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        if let Some(store_root) = &self.store_root {
            config.store_root = store_root.clone();
        }
        if let Some(apps_file) = &self.apps_file {
            config.apps_file = apps_file.clone();
        }
    }
}
