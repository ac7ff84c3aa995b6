use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use postbridge::config::{
    BlueskyConfig, BridgeConfig, DEFAULT_BLUESKY_SERVICE, DEFAULT_GRAPH_API_VERSION, FacebookConfig,
};

mod cmd;

#[derive(Parser)]
#[command(name = "postbridge")]
#[command(version, about = "Republish the images of your latest Facebook post to Bluesky")]
pub struct Cli {
    /// Debug-level logging for the bridge and HTTP layer
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the local web bridge
    Serve {
        #[command(flatten)]
        settings: Settings,

        /// Address to bind
        #[arg(long, env = "POSTBRIDGE_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to serve on
        #[arg(short, long, env = "POSTBRIDGE_PORT", default_value = "5000")]
        port: u16,

        /// Open the browser once the server is up
        #[arg(long)]
        open: bool,
    },
    /// Show how a caption will be split into text and hashtags
    Tag {
        /// Caption text, hashtags included
        caption: String,

        /// Print segments and facets as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration and validate it
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

/// Credentials and endpoints, read from flags, the environment or `.env`.
#[derive(Args, Clone, Debug)]
pub struct Settings {
    #[arg(long, env = "FACEBOOK_APP_ID")]
    pub facebook_app_id: Option<String>,

    #[arg(long, env = "FACEBOOK_APP_SECRET", hide_env_values = true)]
    pub facebook_app_secret: Option<String>,

    #[arg(long, env = "FACEBOOK_REDIRECT_URI")]
    pub facebook_redirect_uri: Option<String>,

    #[arg(long, env = "GRAPH_API_VERSION", default_value = DEFAULT_GRAPH_API_VERSION)]
    pub graph_api_version: String,

    #[arg(long, env = "BLUESKY_HANDLE")]
    pub bluesky_handle: Option<String>,

    #[arg(long, env = "BLUESKY_APP_PASSWORD", hide_env_values = true)]
    pub bluesky_app_password: Option<String>,

    #[arg(long, env = "BLUESKY_SERVICE", default_value = DEFAULT_BLUESKY_SERVICE)]
    pub bluesky_service: String,
}

impl Settings {
    pub fn into_config(self) -> BridgeConfig {
        BridgeConfig {
            facebook: FacebookConfig {
                app_id: self.facebook_app_id.unwrap_or_default(),
                app_secret: self.facebook_app_secret.unwrap_or_default(),
                redirect_uri: self.facebook_redirect_uri.unwrap_or_default(),
                api_version: self.graph_api_version,
            },
            bluesky: BlueskyConfig {
                identifier: self.bluesky_handle.unwrap_or_default(),
                app_password: self.bluesky_app_password.unwrap_or_default(),
                service: self.bluesky_service,
            },
        }
    }
}

fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let default = if verbose {
        "postbridge=debug,tower_http=debug"
    } else {
        "postbridge=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; everything can come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs)?;

    match cli.command {
        Commands::Serve {
            settings,
            host,
            port,
            open,
        } => {
            cmd::cmd_serve(settings.into_config(), host, port, open).await?;
        }
        Commands::Tag { caption, json } => cmd::cmd_tag(&caption, json)?,
        Commands::Config { settings } => cmd::cmd_config(&settings.into_config())?,
    }

    Ok(())
}
