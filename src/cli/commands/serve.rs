//! Serve Command
//!
//! Recovers runs orphaned by a previous process, checks the model provider,
//! then serves the HTTP API.

use std::time::Duration;
use tracing::{info, warn};

use crate::ai::with_timeout;
use crate::cli::util::CommandContext;
use crate::config::ServerConfig;
use crate::server::{AppState, RfpServer};
use crate::types::Result;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(ctx: CommandContext, host: Option<String>, port: Option<u16>) -> Result<()> {
    let provider = ctx.provider()?;
    match with_timeout(HEALTH_CHECK_TIMEOUT, provider.health_check(), "provider health check").await
    {
        Ok(true) => info!("Provider {} ({}) is reachable", provider.name(), provider.model()),
        Ok(false) => warn!(
            "Provider {} reported unhealthy; steps will fail until it recovers",
            provider.name()
        ),
        Err(e) => warn!("Provider health check failed: {}", e),
    }

    let coordinator = ctx.coordinator_with(provider);
    if ctx.config.workflow.recover_on_startup {
        let recovered = coordinator.recover_interrupted_runs()?;
        if recovered > 0 {
            warn!("Marked {} interrupted run(s) as errored", recovered);
        }
    }

    let server_config = ServerConfig {
        host: host.unwrap_or_else(|| ctx.config.server.host.clone()),
        port: port.unwrap_or(ctx.config.server.port),
    };
    info!("Step timeout {}s", ctx.config.workflow.step_timeout_secs);

    let state = AppState::new(coordinator, ctx.insights(), ctx.db.clone());
    RfpServer::new(server_config, state).serve().await
}
