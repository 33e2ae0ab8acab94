use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use comprot_cli::comprot;
use comprot_cli::config::Settings;
use comprot_cli::db::{self, controle};
use comprot_cli::ingestao::{self, Layout};
use comprot_cli::{qualis, sharepoint};

#[derive(Parser)]
#[command(name = "comprot-cli")]
#[command(about = "COMPROT RPA bot", long_about = None)]
struct Cli {
    /// Path of the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: ingest the spreadsheet, poll COMPROT, download documents
    Run {
        #[arg(long, value_enum, default_value = "auto")]
        layout: Layout,

        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        headless: bool,
    },

    /// Ingest the spreadsheet from the network folder into the work tables
    Ingest {
        #[arg(long, value_enum, default_value = "auto")]
        layout: Layout,
    },

    /// Poll COMPROT for every pending CNPJ/date range
    Poll,

    /// Download pending SharePoint links from the GED table
    Sharepoint {
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        headless: bool,

        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Authenticate against the Qualis portal (login-flow variant)
    Qualis {
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        headless: bool,
    },

    /// List the most recent control-table records
    Pendentes {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    info!("Projeto: {}", settings.project.name);

    match cli.command {
        Commands::Run { layout, headless } => {
            let pool = db::conectar(&settings).await?;
            db::preparar_tabelas(&pool, &settings).await?;

            ingestao::executar(&pool, &settings, layout).await?;
            comprot::poller::executar(&pool, &settings).await?;
            sharepoint::executar(&pool, &settings, headless, None).await?;

            info!("Pipeline concluído");
        }

        Commands::Ingest { layout } => {
            let pool = db::conectar(&settings).await?;
            db::preparar_tabelas(&pool, &settings).await?;
            ingestao::executar(&pool, &settings, layout).await?;
        }

        Commands::Poll => {
            let pool = db::conectar(&settings).await?;
            db::preparar_tabelas(&pool, &settings).await?;
            comprot::poller::executar(&pool, &settings).await?;
        }

        Commands::Sharepoint { headless, limit } => {
            let pool = db::conectar(&settings).await?;
            db::preparar_tabelas(&pool, &settings).await?;

            if sharepoint::executar(&pool, &settings, headless, limit).await? {
                info!("Registros processados com sucesso na tabela documentos_ged");
            }
        }

        Commands::Qualis { headless } => {
            qualis::executar_acesso_portal(&settings, headless).await?;
        }

        Commands::Pendentes { limit } => {
            let pool = db::conectar(&settings).await?;
            db::preparar_tabelas(&pool, &settings).await?;

            let registros = controle::listar_recentes(&pool, &settings, limit).await?;
            if registros.is_empty() {
                info!("Nenhum registro encontrado");
            } else {
                println!(
                    "{:<6} {:<16} {:<12} {:<12} {:<14} {}",
                    "ID", "CNPJ", "DE", "ATE", "STATUS", "MENSAGEM"
                );
                for registro in registros {
                    println!(
                        "{:<6} {:<16} {:<12} {:<12} {:<14} {}",
                        registro.id,
                        registro.cnpj,
                        registro.data_de.as_deref().unwrap_or("-"),
                        registro.data_ate.as_deref().unwrap_or("-"),
                        registro.status.as_deref().unwrap_or("-"),
                        registro.status_mensagem.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }

    Ok(())
}
