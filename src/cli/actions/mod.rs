mod run;

use crate::config::ProbeConfig;
use std::net::IpAddr;

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    /// Serve `/metrics`, probing once per scrape
    Serve {
        config: ProbeConfig,
        listen: Option<IpAddr>,
        port: u16,
    },
    /// Probe once and print the report
    Check { config: ProbeConfig },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
