use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "zerg_email_worker")]
#[command(about = "Poll the email job queue and deliver messages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run a single poll cycle and print the report as JSON
    RunOnce,

    /// Run poll cycles on a cron schedule until SIGINT/SIGTERM
    Schedule {
        /// Cron expression (seconds field included). Overrides QUEUE_CRON.
        #[arg(short, long)]
        cron: Option<String>,
    },
}
