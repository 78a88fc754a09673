mod config;
mod plan_cmds;
mod usage_cmds;

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};

use fitplan_core::Locale;
use fitplan_core::fallback::{Equipment, Goal, Level};
use fitplan_core::validate::{MacroTargets, NutritionTargets};
use fitplan_db::models::PlanTier;
use fitplan_db::pool;

use config::FitplanConfig;

#[derive(Parser)]
#[command(name = "fitplan", about = "Validate, repair and bill LLM-generated fitness plans")]
struct Cli {
    /// Database URL (overrides FITPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Locale for day labels and retry instructions (es, en)
    #[arg(long, global = true)]
    locale: Option<Locale>,

    #[command(subcommand)]
    command: Commands,
}

/// Daily calorie and macro targets for a nutrition plan.
#[derive(Args, Debug, Clone, Copy)]
pub struct TargetArgs {
    /// Daily calorie target (kcal)
    #[arg(long)]
    target_kcal: u32,
    /// Meals per day
    #[arg(long, default_value_t = 3)]
    meals_per_day: u32,
    /// Daily protein target (g)
    #[arg(long)]
    protein: f64,
    /// Daily carbohydrate target (g)
    #[arg(long)]
    carbs: f64,
    /// Daily fat target (g)
    #[arg(long)]
    fats: f64,
}

impl TargetArgs {
    fn macros(&self) -> MacroTargets {
        MacroTargets {
            protein_g: self.protein,
            carbs_g: self.carbs,
            fats_g: self.fats,
        }
    }

    fn targets(&self) -> NutritionTargets {
        NutritionTargets {
            target_kcal: self.target_kcal,
            meals_per_day: self.meals_per_day,
            macro_targets: self.macros(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a fitplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/fitplan")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the fitplan database (requires config file or env vars)
    DbInit,
    /// Extract the JSON value from a raw model response
    Extract {
        /// Response file (`-` for stdin)
        file: String,
        /// Take the largest JSON value instead of the first
        #[arg(long)]
        largest: bool,
    },
    /// Parse, normalize, validate and resolve a nutrition plan response
    Nutrition {
        /// Response file (`-` for stdin)
        file: String,
        /// First plan date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Number of days in the plan
        #[arg(long, default_value_t = 7)]
        days: usize,
        #[command(flatten)]
        targets: TargetArgs,
        /// Recipe catalog (JSON array)
        #[arg(long)]
        recipes: Option<PathBuf>,
        /// Take the largest JSON value instead of the first
        #[arg(long)]
        largest: bool,
    },
    /// Parse, normalize and resolve a training plan response
    Training {
        /// Response file (`-` for stdin)
        file: String,
        /// First plan date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Number of days in the plan
        #[arg(long, default_value_t = 7)]
        days: usize,
        /// Exercise catalog (JSON array)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Take the largest JSON value instead of the first
        #[arg(long)]
        largest: bool,
    },
    /// Print the standing meal guidance for an initial prompt
    Guidance {
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Build a deterministic training plan without a model
    Fallback {
        /// Training days per week (1-7)
        #[arg(long)]
        days_per_week: u32,
        /// beginner, intermediate or advanced
        #[arg(long, default_value = "beginner")]
        level: Level,
        /// strength, hypertrophy, fat_loss, endurance or general
        #[arg(long, default_value = "general")]
        goal: Goal,
        /// First plan date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// home or gym
        #[arg(long, default_value = "gym")]
        equipment: Equipment,
        /// Exercise catalog (JSON array)
        #[arg(long)]
        catalog: PathBuf,
    },
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Debit a user for one generation and record the usage row
    Charge {
        /// User ID
        user_id: String,
        /// Feature name (e.g. nutrition_plan)
        #[arg(long)]
        feature: String,
        /// Generation outcome JSON (payload, model, usage, requestId)
        #[arg(long)]
        outcome: PathBuf,
    },
    /// Show a user's usage history
    Usage {
        /// User ID
        user_id: String,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user
    Add {
        /// Unique email address
        email: String,
        /// free or pro
        #[arg(long, default_value = "free")]
        tier: PlanTier,
        /// Initial token balance
        #[arg(long, default_value_t = 0)]
        balance: i64,
    },
    /// Show a user's tier and balance
    Show {
        /// User ID
        user_id: String,
    },
    /// Change a user's tier
    SetTier {
        /// User ID
        user_id: String,
        /// free or pro
        tier: PlanTier,
    },
    /// Check whether a user may generate right now
    Check {
        /// User ID
        user_id: String,
    },
}

/// Execute the `fitplan init` command: write config file.
fn cmd_init(db_url: &str, locale: Option<Locale>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut pipeline = fitplan_core::PipelineConfig::default();
    if let Some(locale) = locale {
        pipeline.locale = locale;
    }
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        pipeline,
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  pipeline.locale = {}", cfg.pipeline.locale);
    println!();
    println!("Add [pipeline.pricing.<model>] tables to enable cost tracking.");
    println!("Next: run `fitplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `fitplan db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &FitplanConfig) -> anyhow::Result<()> {
    println!("Initializing fitplan database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect and migrate.
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let result = pool::run_migrations(&db_pool).await;
    db_pool.close().await;
    result?;

    println!("fitplan db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that need no resolved config.
    match &cli.command {
        Commands::Init { db_url, force } => return cmd_init(db_url, cli.locale, *force),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "fitplan", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let resolved = FitplanConfig::resolve(cli.database_url.as_deref(), cli.locale)
        .context("failed to resolve configuration")?;
    let pipeline = &resolved.pipeline;
    tracing::debug!(
        locale = %pipeline.locale,
        priced_models = pipeline.pricing.len(),
        "configuration resolved"
    );

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => {}
        Commands::DbInit => {
            cmd_db_init(&resolved).await?;
        }
        Commands::Extract { file, largest } => {
            plan_cmds::run_extract(&file, largest, pipeline)?;
        }
        Commands::Nutrition {
            file,
            start,
            days,
            targets,
            recipes,
            largest,
        } => {
            let args = plan_cmds::NutritionArgs {
                path: &file,
                start,
                days,
                targets: targets.targets(),
                recipes: recipes.as_deref(),
                largest,
            };
            plan_cmds::run_nutrition(args, pipeline)?;
        }
        Commands::Training {
            file,
            start,
            days,
            catalog,
            largest,
        } => {
            plan_cmds::run_training(&file, start, days, catalog.as_deref(), largest, pipeline)?;
        }
        Commands::Guidance { targets } => {
            plan_cmds::run_guidance(
                targets.target_kcal,
                targets.meals_per_day,
                targets.macros(),
                pipeline,
            )?;
        }
        Commands::Fallback {
            days_per_week,
            level,
            goal,
            start,
            equipment,
            catalog,
        } => {
            let request =
                plan_cmds::fallback_request(days_per_week, level, goal, start, equipment);
            plan_cmds::run_fallback(&request, &catalog, pipeline)?;
        }
        Commands::User { command } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = usage_cmds::run_user_command(command, &db_pool, pipeline).await;
            db_pool.close().await;
            result?;
        }
        Commands::Charge {
            user_id,
            feature,
            outcome,
        } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result =
                usage_cmds::run_charge(&db_pool, &user_id, &feature, &outcome, pipeline).await;
            db_pool.close().await;
            result?;
        }
        Commands::Usage { user_id } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = usage_cmds::run_usage(&db_pool, &user_id).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
