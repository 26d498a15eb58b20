use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "auto-ai-router", version, about = "OpenAI-compatible multi-provider gateway")]
pub struct Args {
    /// Path to the gateway configuration document.
    #[arg(long, default_value = "config.yaml")]
    pub config: String,
    /// Override the configured bind host.
    #[arg(long)]
    pub host: Option<String>,
    /// Override the configured bind port.
    #[arg(long)]
    pub port: Option<u16>,
}
