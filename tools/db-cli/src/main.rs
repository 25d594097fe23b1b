use anyhow::Context;
use clap::{Parser, Subcommand};
use kivendi_api::boost::ExpirationJob;
use kivendi_common::DatabaseConfig;
use kivendi_database::{create_pool, DbPool, MigrationRunner};

#[derive(Parser)]
#[command(name = "db-cli")]
#[command(about = "Kivendi database CLI tool")]
struct Cli {
    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Check migration status
    Status,
    /// Seed the first admin account and the default boost offers
    Seed {
        #[arg(long, env = "SEED_ADMIN_EMAIL", default_value = "admin@kivendi.com")]
        admin_email: String,
        #[arg(long, env = "SEED_ADMIN_PASSWORD")]
        admin_password: String,
    },
    /// Run one boost expiration pass
    ExpireBoosts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let pool = connect(cli.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            MigrationRunner::new(pool).run_all_migrations().await?;
            println!("✅ Migrations completed successfully");
        }
        Commands::Status => {
            let status = MigrationRunner::new(pool).check_migration_status().await?;
            println!("📊 {}", status);

            if status.is_up_to_date {
                println!("✅ Database is up to date");
            } else {
                println!("⚠️  Database needs migration");
            }
        }
        Commands::Seed {
            admin_email,
            admin_password,
        } => {
            let runner = MigrationRunner::new(pool);
            runner.run_all_migrations().await?;
            runner.seed_initial_data(&admin_email, &admin_password).await?;
            println!("✅ Initial data seeded successfully");
        }
        Commands::ExpireBoosts => {
            let summary = ExpirationJob::new(pool).run_once().await?;
            println!(
                "✅ Expiration pass done: {} boosts ended, {} ads cleared, {} ads repaired",
                summary.deactivated, summary.cleared, summary.repaired
            );
        }
    }

    Ok(())
}

async fn connect(database_url: Option<String>) -> anyhow::Result<DbPool> {
    let mut config = DatabaseConfig::from_env();
    if database_url.is_some() {
        config.url = database_url;
    }
    create_pool(&config)
        .await
        .context("failed to connect to the database")
}
