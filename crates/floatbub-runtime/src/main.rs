//! floatbub: floating bubble overlay coordinator binary.
//! Hosts the bubble core behind a UDS JSON-RPC socket and provides CLI
//! client subcommands.

use std::sync::Arc;

use clap::Parser;

use floatbub_core::SimulatedPlatform;

mod cli;
mod client;
mod server;

fn simulated_platform(opts: &cli::DaemonOpts) -> SimulatedPlatform {
    let platform = SimulatedPlatform::new()
        .with_capability_level(opts.capability_level)
        .with_overlay_granted(opts.grant_overlay)
        .with_post_notifications_granted(opts.grant_notifications);
    platform.set_reject_overlay(opts.reject_overlay);
    platform
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("FLOATBUB_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!(
                capability_level = opts.capability_level,
                grant_overlay = opts.grant_overlay,
                grant_notifications = opts.grant_notifications,
                "floatbub daemon starting"
            );

            let platform = Arc::new(simulated_platform(&opts));
            let state = Arc::new(server::ServerState::new(platform));
            server::run_server(&socket_path, state).await?;
        }
        cli::Command::Call(opts) => {
            client::cmd_call(&socket_path, &opts.method, &opts.params).await?;
        }
        cli::Command::Listen => {
            client::cmd_listen(&socket_path).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use floatbub_core::OverlayPlatform;

    use super::*;

    #[test]
    fn daemon_opts_configure_simulated_device() {
        let opts = cli::DaemonOpts {
            capability_level: 30,
            grant_overlay: true,
            grant_notifications: false,
            reject_overlay: true,
        };
        let platform = simulated_platform(&opts);
        assert_eq!(platform.capability_level(), 30);
        assert!(platform.is_overlay_granted());
        assert!(!platform.is_post_notifications_granted());
        assert!(
            platform
                .request_overlay(&Default::default(), &Default::default())
                .is_err()
        );
    }
}
