//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "floatbub", about = "floating bubble overlay coordinator")]
pub struct Cli {
    /// UDS socket path (default: /tmp/floatbub-$USER/floatbubd.sock)
    #[arg(long, short = 's', global = true, env = "FLOATBUB_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon over a simulated device
    Daemon(DaemonOpts),
    /// Send one command to the daemon and print the result (JSON)
    Call(CallOpts),
    /// Bind as the requester context and print interaction events
    Listen,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct DaemonOpts {
    /// Platform API level reported by the simulated device
    #[arg(long, default_value = "34")]
    pub capability_level: u32,

    /// Start with the overlay permission already granted
    #[arg(long)]
    pub grant_overlay: bool,

    /// Start with the post-notifications permission already granted
    #[arg(long)]
    pub grant_notifications: bool,

    /// Make the simulated window manager refuse overlay windows
    #[arg(long)]
    pub reject_overlay: bool,
}

#[derive(clap::Args)]
pub struct CallOpts {
    /// Method name, e.g. `startBubble` or `platform/permission_result`
    pub method: String,

    /// JSON params object
    #[arg(long, default_value = "null")]
    pub params: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/floatbub/floatbubd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/floatbub-{user}/floatbubd.sock")
}
