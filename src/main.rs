use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::info;

use pbx_dao::backend::database::lookup;
use pbx_dao::config::AppConfig;
use pbx_dao::logging::init_tracing;
use pbx_dao::{Backend, SqliteBackend};

#[derive(Parser, Debug)]
#[command(name = "pbx-dao")]
#[command(about = "Maintenance and lookup commands for the PBX database")]
struct Args {
    /// Configuration file path (default: config.yaml)
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the tables and seed the lookup rows
    InitSchema,
    /// Check that the database answers
    HealthCheck,
    /// Print the line interface dialed by an extension
    Interface { exten: String, context: String },
    /// Print the main extension of a line interface
    Extension { protocol: String, name: String },
    /// Print the peer name of the line provisioned on a device
    PeerName { device_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let app_config = if args.config == "config.yaml" && !Path::new("config.yaml").exists() {
        AppConfig::default_config()
    } else {
        AppConfig::load_from_file(&args.config)?
    };
    init_tracing(&app_config.logging);

    let backend = SqliteBackend::connect(&app_config.to_backend_config()?).await?;

    match args.command {
        Command::InitSchema => {
            backend.init_schema().await?;
            info!("schema initialised");
        }
        Command::HealthCheck => {
            backend.health_check().await?;
            println!("ok");
        }
        Command::Interface { exten, context } => {
            let mut conn = backend.pool().acquire().await?;
            let interface =
                lookup::get_interface_from_exten_and_context(&mut conn, &exten, &context).await?;
            println!("{}", interface);
        }
        Command::Extension { protocol, name } => {
            let mut conn = backend.pool().acquire().await?;
            let (exten, context) =
                lookup::get_extension_from_protocol_interface(&mut conn, &protocol, &name).await?;
            println!("{}@{}", exten, context);
        }
        Command::PeerName { device_id } => {
            let mut conn = backend.pool().acquire().await?;
            println!("{}", lookup::get_peer_name(&mut conn, &device_id).await?);
        }
    }

    backend.cleanup().await?;
    Ok(())
}
