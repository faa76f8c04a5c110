use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "signup_service")]
#[command(about = "Account registration service", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, short, default_value = "signup.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override `server.port`
        #[arg(long)]
        port: Option<u16>,
        /// Override `storage.db_path`
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Write the default config file and exit
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
