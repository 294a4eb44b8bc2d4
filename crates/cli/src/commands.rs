use clap::{Args, Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a query and stream its results through the protocol
    Run {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        simulation: SimulationArgs,

        #[arg(long, help = "Byte target requested on every poll")]
        target_bytes: Option<u64>,

        #[arg(long, help = "Maximum wait per poll in milliseconds")]
        max_wait_ms: Option<u64>,

        #[arg(
            long,
            help = "If specified, writes every batch as JSON lines to this file instead of stdout"
        )]
        output: Option<String>,

        #[arg(long, help = "Print only the stream summary")]
        quiet: bool,
    },
    /// Print the effective protocol settings
    Config {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
pub struct CommonArgs {
    #[arg(
        long,
        help = "Settings file path (defaults to ~/.rowstream/config.json when present)"
    )]
    pub config: Option<String>,

    #[arg(long, help = "Env file with ROWSTREAM_* overrides")]
    pub env_file: Option<String>,
}

#[derive(Args)]
pub struct SimulationArgs {
    #[arg(long, value_enum, default_value_t = Statement::Select)]
    pub statement: Statement,

    #[arg(long, default_value_t = 2, help = "Number of output locations")]
    pub locations: usize,

    #[arg(long, default_value_t = 5)]
    pub pages: usize,

    #[arg(long, default_value_t = 100)]
    pub rows: usize,

    #[arg(long, default_value_t = 5, help = "Delay between pages in milliseconds")]
    pub delay_ms: u64,

    #[arg(long, default_value_t = 0, help = "Affected rows reported by an update")]
    pub update_rows: u64,

    #[arg(long, help = "Global page index whose first row is corrupt")]
    pub corrupt_page: Option<usize>,

    #[arg(long, help = "Location index that fails after its first page")]
    pub failing_location: Option<usize>,

    #[arg(long, help = "Query id (defaults to a timestamp-based id)")]
    pub query_id: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Statement {
    Select,
    Ddl,
    Update,
}
