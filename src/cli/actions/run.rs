use super::Action;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Serve {
            config,
            listen,
            port,
        } => crate::pulse::start(config, listen, port).await,
        Action::Check { config } => crate::pulse::once(&config).await,
    }
}
