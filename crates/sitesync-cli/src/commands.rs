use anyhow::Context;
use sitesync_agent::{AgentConfig, AgentOverrides, SiteAgent};
use sitesync_server::{ServerConfig, SiteSyncServer};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{AgentArgs, Cli, Command, ConfigArgs, ConfigTarget, LogFormat, ServeArgs};

pub fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Agent(args) => cmd_agent(args).await,
        Command::Config(args) => cmd_config(args),
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading server config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if config.sites.is_empty() {
        warn!("no sites configured; agents will be refused until sites are added");
    }

    let server = SiteSyncServer::new(config)?;
    server.serve_with_shutdown(shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}

async fn cmd_agent(args: AgentArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("loading agent config {}", path.display()))?,
        None => AgentConfig::default(),
    };
    let config = config.with_overrides(AgentOverrides {
        site_id: args.site_id,
        site_name: args.site_name,
        api_server_url: args.api_server,
        spire_socket_path: args.spire_socket,
        sync_interval_secs: args.sync_interval,
        max_entries: args.max_entries,
    });
    let agent = SiteAgent::from_config(&config).context("invalid agent configuration")?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    if args.once {
        let report = agent.run_cycle(&rx).await;
        info!(
            applied = report.applied,
            apply_failed = report.apply_failed,
            revoked = report.revoked,
            revoke_failed = report.revoke_failed,
            "single cycle finished"
        );
        return Ok(());
    }

    let cycles = agent.run(rx).await?;
    info!(cycles, "site agent stopped");
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let rendered = match args.target {
        ConfigTarget::Server => toml::to_string_pretty(&ServerConfig::default())?,
        ConfigTarget::Agent => toml::to_string_pretty(&AgentConfig::default())?,
    };
    print!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configs_round_trip_through_toml() {
        let server = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        assert_eq!(
            ServerConfig::from_toml(&server).unwrap(),
            ServerConfig::default()
        );

        let agent = toml::to_string_pretty(&AgentConfig::default()).unwrap();
        assert_eq!(
            AgentConfig::from_toml(&agent).unwrap(),
            AgentConfig::default()
        );
    }

    #[tokio::test]
    async fn agent_without_site_id_is_rejected() {
        let args = AgentArgs {
            config: None,
            site_id: None,
            site_name: None,
            api_server: None,
            spire_socket: None,
            sync_interval: None,
            max_entries: None,
            once: true,
        };
        let err = cmd_agent(args).await.unwrap_err();
        assert!(format!("{err:#}").contains("site_id"));
    }
}
