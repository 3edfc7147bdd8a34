use clap::{Args, Parser, Subcommand};

use crate::config::BiTool;
use crate::demo::SimulatedSource;

#[derive(Debug, Parser)]
#[command(name = "finwise")]
#[command(about = "Personal-finance dashboard client", long_about = None)]
pub struct Cli {
    /// Override FinWise home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "FINWISE_HOME")]
    pub home: Option<std::path::PathBuf>,

    /// Backend base URL (overrides `api_base` from the config file).
    #[arg(long, env = "FINWISE_API_BASE")]
    pub api_base: Option<String>,

    /// API key for the conversational AI service.
    #[arg(long, env = "FINWISE_AI_API_KEY", hide_env_values = true)]
    pub ai_key: Option<String>,

    /// Fail instead of showing demo data when the backend is unreachable.
    #[arg(long)]
    pub no_demo: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a session (authentication is simulated locally).
    Login(LoginArgs),
    Logout,
    Whoami,

    /// Totals, cumulative balance trend and top spending categories.
    Dashboard,
    #[command(subcommand)]
    Tx(TxCmd),
    #[command(subcommand)]
    Budget(BudgetCmd),
    #[command(subcommand)]
    Bill(BillCmd),

    /// Backend forecast, or an AI forecast with `--ai`.
    Forecast {
        #[arg(long)]
        ai: bool,
    },
    /// Backend risk assessment.
    Risk,
    /// Three short pieces of advice from the AI service.
    Advice,
    /// Ask the backend-hosted advisor (it reads the database itself).
    Advisor { question: Option<String> },
    /// Chat with the AI advisor; without a message, prints the transcript.
    Chat(ChatArgs),

    /// Print the embed URL of a BI dashboard.
    Bi {
        #[arg(value_enum)]
        tool: BiTool,
        #[arg(long)]
        url: Option<String>,
    },
    /// Simulate an incoming notification and show the resulting state.
    Inject {
        #[arg(value_enum)]
        source: SimulatedSource,
    },
    /// Recent activity, newest first.
    Log,
    #[command(subcommand)]
    Config(ConfigCmd),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum TxCmd {
    List {
        /// Case-insensitive match on description or category.
        #[arg(long, short = 's')]
        search: Option<String>,
    },
    Add(TxAddArgs),
    /// Run the backend anomaly scan and flag suspicious transactions.
    Scan,
}

#[derive(Debug, Args)]
pub struct TxAddArgs {
    /// Whole đồng; "1.200.000" and "1,200,000" are accepted.
    pub amount: String,

    /// Category label or English alias (food, transport, shopping, ...).
    #[arg(long, default_value = "other")]
    pub category: String,

    #[arg(long, short = 'm', default_value = "")]
    pub description: String,

    #[arg(long)]
    pub income: bool,

    #[arg(long, default_value = "Thủ công")]
    pub source: String,

    /// `YYYY-MM-DDTHH:MM`; defaults to now.
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum BudgetCmd {
    List,
    /// A budget and the transactions of its category.
    Show { category: String },
    Add { category: String, limit: String },
    SetLimit { id: String, limit: String },
    /// Ask the AI service for per-category limits.
    Suggest {
        /// Monthly income; defaults to the income found in the transactions.
        #[arg(long)]
        income: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum BillCmd {
    List,
    Add {
        name: String,
        amount: String,
        /// `YYYY-MM-DD`
        #[arg(long)]
        due: String,
        #[arg(long)]
        recurring: bool,
    },
    Pay {
        id: String,
        /// Ask for confirmation before paying.
        #[arg(long)]
        confirm: bool,
    },
    /// Extract a bill from e-mail text with the AI service; `--save` stores it.
    Extract {
        text: String,
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    pub message: Option<String>,

    /// Start a new conversation.
    #[arg(long)]
    pub reset: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    Show,
    Set { key: String, value: String },
}
