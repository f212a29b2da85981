use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// sqlrag — natural-language questions to checked SQL, grounded on a corpus of examples
#[derive(Parser, Debug)]
#[command(
    name = "sqlrag",
    version,
    about = "Retrieve similar schema/question examples and generate validated SQL",
    long_about = None
)]
pub struct Cli {
    /// Path to a TOML configuration file
    /// (default: ~/.sqlrag/sqlrag.toml)
    #[arg(short, long, global = true, env = "SQLRAG_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project directory holding the .sqlrag corpus (default: current working directory)
    #[arg(short = 'D', long = "dir", global = true, value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the corpus chunks most similar to a question (no LLM involved)
    Retrieve(RetrieveArgs),

    /// Generate SQL for a question: retrieval, LLM generation, validation
    Ask(AskArgs),

    /// Interactive session in retrieval-only or full mode
    Chat(ChatArgs),

    /// Run a SQL statement through the safety and syntax gate
    Validate(ValidateArgs),

    /// Build the corpus from a JSON file of {question, context, answer} records
    Build(BuildArgs),

    /// Show corpus statistics (chunk count, embedding dimensions)
    Stats,

    /// Serve retrieval, generation and validation over HTTP
    Serve(ServeArgs),

    /// Print the resolved configuration as JSON and exit
    Config,
}

#[derive(Args, Debug)]
pub struct RetrieveArgs {
    /// Natural language question
    pub query: String,

    /// Number of chunks to return (default: retrieval.default_k)
    #[arg(short, long, allow_negative_numbers = true)]
    pub k: Option<i64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Natural language question
    pub query: String,

    /// Number of example chunks to ground the prompt on (default: retrieval.default_k)
    #[arg(short, long, allow_negative_numbers = true)]
    pub k: Option<i64>,

    /// Skip the plain-language answer
    #[arg(long)]
    pub no_explain: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[arg(long, value_enum, default_value_t = ChatMode::Full)]
    pub mode: ChatMode,

    /// Initial result count; change it mid-session with `k=<N>`
    #[arg(short, long, allow_negative_numbers = true)]
    pub k: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// SQL text to check
    pub sql: String,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// JSON array of {question, context, answer} records
    pub records: PathBuf,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Ranked chunks only
    Retrieval,
    /// Retrieval, generation and validation
    Full,
}

impl ChatMode {
    pub fn label(self) -> &'static str {
        match self {
            ChatMode::Retrieval => "retrieval-only",
            ChatMode::Full => "full pipeline",
        }
    }
}
