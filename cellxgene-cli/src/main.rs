use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_ref())?;

    let config_file = cli.config.as_deref();
    match &cli.command {
        Some(Commands::Validate) => {
            match commands::handle_validate(config_file) {
                Ok(messages) => {
                    for message in messages {
                        println!("{}", message);
                    }
                    println!("✅ Configuration is valid");
                    Ok(())
                }
                Err(e) => {
                    println!("❌ Configuration validation failed: {:#}", e);
                    Err(e)
                }
            }
        }
        Some(Commands::Write { output, force }) => {
            commands::handle_write(config_file, output, *force)?;
            println!("✅ Configuration written to {}", output.display());
            Ok(())
        }
        Some(Commands::Diff { format }) => {
            print!("{}", commands::handle_diff(config_file, *format)?);
            Ok(())
        }
        Some(Commands::CreateDb { database_url }) => {
            commands::handle_create_db(config_file, database_url.as_deref()).await?;
            println!("✅ Annotation database created");
            Ok(())
        }
        None => {
            // If no subcommand is provided, print help
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(())
        }
    }
}

/// Initialize tracing; records from the `log` facade are forwarded as well
fn init_tracing(log_level: Option<&String>) -> Result<()> {
    let env_filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", level);
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    debug!("Tracing initialized");
    Ok(())
}
