use clap::{Parser, Subcommand};
use ossm_web::harness::Harness;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Prepare and launch the OSSM user API for black-box testing", long_about = None)]
struct Cli {
    /// Path to the API binary
    api_binary: PathBuf,

    /// Path to the API's JSON config file
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the schema, then seed the root location
    Reset {
        /// Also insert the known test user
        #[arg(long)]
        with_test_user: bool,
    },

    /// Reset the database and run the API until interrupted
    Run {
        /// Also insert the known test user
        #[arg(long)]
        with_test_user: bool,
    },
}

async fn seed_test_user(harness: &Harness) -> anyhow::Result<()> {
    let user = harness.insert_test_user().await?;
    println!("  Test user: pk {} / {} / {}", user.pk, user.email, user.password);
    println!("  Token:     {}", user.auth_token);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ossm_web=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let harness = Harness::from_paths(cli.api_binary, cli.config).await?;

    match cli.command {
        Commands::Reset { with_test_user } => {
            harness.reset_database().await?;
            println!("✅ Database reset");
            if with_test_user {
                seed_test_user(&harness).await?;
            }
        }

        Commands::Run { with_test_user } => {
            let api = harness.start_api().await?;
            println!("✅ API running at {}", harness.api_url());
            if with_test_user {
                seed_test_user(&harness).await?;
            }
            println!("Press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            api.stop().await?;
            println!("API stopped");
        }
    }

    Ok(())
}
