//! CLI module for costmesh
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `cost` - Projected, actual and what-if costs for a resource set
//! - `recommendations` - List recommendations and manage their lifecycle
//! - `budget` - Check spend against configured budgets
//! - `cache` - Inspect or clear the result cache
//! - `config` - Configuration utilities (init, validate)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Projected monthly cost of a resource set
//! costmesh cost projected resources.json
//!
//! # Fail CI when a budget is exceeded
//! costmesh budget check resources.json
//!
//! # Generate shell completions
//! costmesh completions bash > ~/.bash_completion.d/costmesh
//! ```

pub mod budget;
pub mod cache;
pub mod completions;
pub mod config;
pub mod context;
pub mod cost;
pub mod output;
pub mod recommendations;

pub use completions::handle_completions;
pub use config::{handle_config_init, handle_config_validate};
pub use context::Context;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// costmesh - Cloud cost CLI backed by pluggable cost plugins
#[derive(Parser, Debug)]
#[command(
    name = "costmesh",
    version,
    about = "Routes cloud cost, budget and recommendation queries to cost plugins"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to configuration file (defaults to ./costmesh.toml when present)
    #[arg(short, long, global = true, env = "COSTMESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Bypass the result cache for this invocation
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute costs for a resource set
    #[command(subcommand)]
    Cost(CostCommands),
    /// List and manage cost-saving recommendations
    #[command(subcommand)]
    Recommendations(RecommendationsCommands),
    /// Budget checks
    #[command(subcommand)]
    Budget(BudgetCommands),
    /// Manage the result cache
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum CostCommands {
    /// Projected monthly cost
    Projected(ProjectedArgs),
    /// Historical cost over a time window
    Actual(ActualArgs),
    /// What-if estimate for property changes
    Estimate(EstimateArgs),
}

#[derive(Args, Debug)]
pub struct ProjectedArgs {
    /// JSON file with an array of resource descriptors
    pub resources: PathBuf,

    /// Skip fetching recommendations
    #[arg(long)]
    pub no_recommendations: bool,

    /// Include dismissed and snoozed recommendations
    #[arg(long)]
    pub include_dismissed: bool,
}

#[derive(Args, Debug)]
pub struct ActualArgs {
    /// JSON file with an array of resource descriptors
    pub resources: PathBuf,

    /// Window start (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub from: String,

    /// Window end (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long)]
    pub to: Option<String>,

    /// Grouping passed through to plugins (e.g. daily, monthly)
    #[arg(long)]
    pub group_by: Option<String>,
}

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// JSON file with estimate items (`[{"resource": {...}, "overrides": {...}}]`)
    /// or a single resource descriptor combined with --set
    pub input: PathBuf,

    /// Property override applied to a single resource (key=value, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum RecommendationsCommands {
    /// Fetch recommendations for a resource set
    List(RecommendationsListArgs),
    /// Dismiss a recommendation
    Dismiss(DismissArgs),
    /// Hide a recommendation until a date
    Snooze(SnoozeArgs),
    /// Restore a dismissed or snoozed recommendation
    Undismiss(UndismissArgs),
    /// Show the lifecycle history of a recommendation
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct RecommendationsListArgs {
    /// JSON file with an array of resource descriptors
    pub resources: PathBuf,

    /// Only show these action types (repeatable)
    #[arg(short = 'a', long = "action-type")]
    pub action_types: Vec<String>,

    /// Only show recommendations saving at least this much per month
    #[arg(long)]
    pub min_savings: Option<f64>,

    /// Include dismissed and snoozed recommendations
    #[arg(long)]
    pub include_dismissed: bool,

    /// Print only the summary
    #[arg(long)]
    pub summary: bool,
}

#[derive(Args, Debug)]
pub struct DismissArgs {
    /// Recommendation ID
    pub id: String,

    /// Reason (not_applicable, already_implemented, business_constraint,
    /// technical_constraint, deferred, inaccurate_recommendation, other)
    #[arg(short, long, default_value = "not_applicable")]
    pub reason: String,

    /// Free-form note kept in the history
    #[arg(short, long)]
    pub note: Option<String>,

    /// Resource set used to locate the recommendation's source plugin
    #[arg(long)]
    pub resources: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SnoozeArgs {
    /// Recommendation ID
    pub id: String,

    /// Snooze until (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub until: String,

    /// Reason (defaults to deferred)
    #[arg(short, long)]
    pub reason: Option<String>,

    /// Free-form note kept in the history
    #[arg(short, long)]
    pub note: Option<String>,

    /// Resource set used to locate the recommendation's source plugin
    #[arg(long)]
    pub resources: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UndismissArgs {
    /// Recommendation ID
    pub id: String,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Recommendation ID
    pub id: String,
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// Evaluate budgets and exit non-zero when configured to
    Check(BudgetCheckArgs),
}

#[derive(Args, Debug)]
pub struct BudgetCheckArgs {
    /// JSON file with an array of resource descriptors
    pub resources: PathBuf,

    /// Never exit non-zero, even when a budget is exceeded
    #[arg(long)]
    pub warn_only: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache size and entry counts
    Stats,
    /// Delete every cache entry
    Clear,
    /// Delete expired entries
    Prune,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
    /// Validate the configuration and print every problem found
    Validate,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "costmesh.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
