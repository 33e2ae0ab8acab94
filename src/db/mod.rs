pub mod controle;
pub mod documentos;
pub mod relatorios;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::Settings;

/// Open the shared connection pool. The bot is sequential, so a handful of
/// connections is plenty.
pub async fn conectar(settings: &Settings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.env.database_url)
        .await
        .context("Falha ao conectar ao banco de dados")?;

    info!("Conexão com o banco estabelecida");
    Ok(pool)
}

/// Create the schema and the three working tables when they do not exist yet.
pub async fn preparar_tabelas(pool: &PgPool, settings: &Settings) -> Result<()> {
    let schema = &settings.database.schema;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await
        .with_context(|| format!("Falha ao criar schema {}", schema))?;

    let ddl_controle = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id SERIAL PRIMARY KEY,
            id_controle_execucao INTEGER,
            cnpj VARCHAR(20) NOT NULL,
            data_de VARCHAR(50),
            data_ate VARCHAR(50),
            created_at TIMESTAMP DEFAULT now(),
            started_at TIMESTAMP,
            finished_at TIMESTAMP,
            status VARCHAR(100) DEFAULT 'PENDENTE',
            status_mensagem TEXT,
            arquivo VARCHAR(255)
        )
        "#,
        settings.tabela_controle()
    );

    let ddl_relatorios = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id SERIAL PRIMARY KEY,
            id_controle_dado INTEGER,
            documento VARCHAR(255),
            nome_interessado VARCHAR(255),
            data_protocolo VARCHAR(255),
            situacao VARCHAR(255),
            uf VARCHAR(255),
            numero_processo VARCHAR(255),
            documento_origem VARCHAR(255),
            procedencia VARCHAR(255),
            nome_assunto VARCHAR(255),
            tipo VARCHAR(255),
            sistema_profisc VARCHAR(255),
            sistema_processo VARCHAR(255),
            sistema_sief VARCHAR(255),
            orgao_origem VARCHAR(255),
            orgao_destino VARCHAR(255),
            orgao_outro VARCHAR(255),
            data_movimentado VARCHAR(255),
            sequencia INTEGER,
            relacao INTEGER,
            data_disjuntada VARCHAR(255),
            numero_sequencia_disjuntada VARCHAR(255),
            numero_aviso VARCHAR(255),
            numero_processo_principal VARCHAR(255),
            nome_orgao_disjuntada VARCHAR(255),
            codigo_tipo_movimento_processo VARCHAR(255),
            created_at TIMESTAMP DEFAULT now(),
            status VARCHAR(50),
            status_mensagem TEXT
        )
        "#,
        settings.tabela_relatorios()
    );

    let ddl_documentos = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id SERIAL PRIMARY KEY,
            unidade VARCHAR(255) NOT NULL,
            setor VARCHAR(255),
            tipo_documento VARCHAR(255),
            link TEXT NOT NULL,
            tipo_aba VARCHAR(100),
            status VARCHAR(50) DEFAULT 'PENDENTE',
            status_mensagem TEXT,
            created_at TIMESTAMP DEFAULT now(),
            updated_at TIMESTAMP DEFAULT now()
        )
        "#,
        settings.tabela_documentos()
    );

    for (nome, ddl) in [
        (settings.tabela_controle(), ddl_controle),
        (settings.tabela_relatorios(), ddl_relatorios),
        (settings.tabela_documentos(), ddl_documentos),
    ] {
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Falha ao criar tabela {}", nome))?;
        info!("Tabela {} verificada", nome);
    }

    Ok(())
}
