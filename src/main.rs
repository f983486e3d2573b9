use clap::Parser;
use costmesh::cli::{
    budget, cache, cost, handle_completions, handle_config_init, handle_config_validate,
    recommendations, BudgetCommands, Cli, Commands, ConfigCommands, Context, CostCommands,
    RecommendationsCommands,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Completions(args) => {
            handle_completions(&args);
            Ok(())
        }
        Commands::Config(ConfigCommands::Init(args)) => handle_config_init(&args).map(print),
        command => match Context::load(&cli.global) {
            Ok(ctx) => {
                if let Err(e) = costmesh::logging::init_tracing(&ctx.config.logging) {
                    eprintln!("Warning: Failed to initialize logging: {}", e);
                }
                ctx.cancel_on_ctrl_c();
                run(command, &ctx).await
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print(output: String) {
    println!("{}", output);
}

async fn run(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Cost(cmd) => match cmd {
            CostCommands::Projected(args) => cost::handle_projected(&args, ctx).await.map(print),
            CostCommands::Actual(args) => cost::handle_actual(&args, ctx).await.map(print),
            CostCommands::Estimate(args) => cost::handle_estimate(&args, ctx).await.map(print),
        },
        Commands::Recommendations(cmd) => match cmd {
            RecommendationsCommands::List(args) => {
                recommendations::handle_list(&args, ctx).await.map(print)
            }
            RecommendationsCommands::Dismiss(args) => {
                recommendations::handle_dismiss(&args, ctx).await.map(print)
            }
            RecommendationsCommands::Snooze(args) => {
                recommendations::handle_snooze(&args, ctx).await.map(print)
            }
            RecommendationsCommands::Undismiss(args) => {
                recommendations::handle_undismiss(&args, ctx).map(print)
            }
            RecommendationsCommands::History(args) => {
                recommendations::handle_history(&args, ctx).map(print)
            }
        },
        Commands::Budget(BudgetCommands::Check(args)) => {
            let output = budget::handle_budget_check(&args, ctx).await?;
            print(output.rendered);
            if let Some(signal) = output.signal {
                eprintln!("{}", signal);
                std::process::exit(signal.exit_code);
            }
            Ok(())
        }
        Commands::Cache(cmd) => cache::handle_cache(&cmd, ctx).map(print),
        Commands::Config(ConfigCommands::Validate) => handle_config_validate(ctx).map(print),
        Commands::Config(ConfigCommands::Init(args)) => handle_config_init(&args).map(print),
        Commands::Completions(args) => {
            handle_completions(&args);
            Ok(())
        }
    }
}
