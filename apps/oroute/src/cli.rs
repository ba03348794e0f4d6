use clap::Parser;

#[derive(Parser)]
#[command(name = "oroute")]
pub(crate) struct Cli {
    /// Path to the YAML config file.
    #[arg(long, default_value = "./config.yaml")]
    pub(crate) config: String,
    /// Print the configured upstreams and exit.
    #[arg(long)]
    pub(crate) list: bool,
    /// Do not check the incoming Authorization header.
    #[arg(long)]
    pub(crate) noauth: bool,
    /// Enable verbose database logging.
    #[arg(long)]
    pub(crate) dblog: bool,
}
