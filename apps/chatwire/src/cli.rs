use clap::{Args, Parser, Subcommand};

use chatwire_common::GlobalConfigPatch;

#[derive(Parser)]
#[command(name = "chatwire", version, about = "Streaming AI chat relay")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Chat with a running server from the terminal.
    Chat(ChatArgs),
}

/// Every flag also reads `CHATWIRE_*`; values stored in the database fill
/// whatever neither sets.
#[derive(Args)]
pub(crate) struct ServeArgs {
    #[arg(long, env = "CHATWIRE_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "CHATWIRE_PORT")]
    pub(crate) port: Option<u16>,
    #[arg(long, env = "CHATWIRE_DSN")]
    pub(crate) dsn: Option<String>,
    #[arg(long)]
    pub(crate) data_dir: Option<String>,
    #[arg(long, env = "CHATWIRE_ADMIN_KEY")]
    pub(crate) admin_key: Option<String>,
    #[arg(long, env = "CHATWIRE_PROXY")]
    pub(crate) proxy: Option<String>,
    #[arg(long, env = "CHATWIRE_SITE_URL")]
    pub(crate) site_url: Option<String>,
}

impl ServeArgs {
    pub(crate) fn patch(&self, dsn: &str, data_dir: &str) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host.clone(),
            port: self.port,
            admin_key: self.admin_key.clone(),
            dsn: Some(dsn.to_string()),
            proxy: self.proxy.clone(),
            site_url: self.site_url.clone(),
            data_dir: Some(data_dir.to_string()),
        }
    }
}

#[derive(Args)]
pub(crate) struct ChatArgs {
    #[arg(long, env = "CHATWIRE_SERVER", default_value = "http://127.0.0.1:8787")]
    pub(crate) server: String,
    #[arg(long, env = "CHATWIRE_TOKEN")]
    pub(crate) token: Option<String>,
    /// Registry id of the model; the first listed model otherwise.
    #[arg(long)]
    pub(crate) model: Option<String>,
    /// Chat without a session; nothing is saved.
    #[arg(long)]
    pub(crate) guest: bool,
    /// Continue a stored conversation.
    #[arg(long, conflicts_with = "guest")]
    pub(crate) conversation: Option<String>,
}
