use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::info;

use crate::config::Settings;

/// Row of the control table. Dates are kept as text (YYYY-MM-DD), the way the
/// ingestion writes them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegistroControle {
    pub id: i32,
    pub cnpj: String,
    pub data_de: Option<String>,
    pub data_ate: Option<String>,
    pub status: Option<String>,
    pub status_mensagem: Option<String>,
    pub arquivo: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
}

pub const STATUS_PENDENTE: &str = "PENDENTE";
pub const STATUS_CONCLUIDO: &str = "CONCLUIDO";
pub const STATUS_ABORTADO: &str = "ABORTADO";
pub const STATUS_SEM_PROCESSO: &str = "SEMPROCESSO";

/// Insert a new pending record unless the exact (cnpj, data_de, data_ate)
/// triple is already present. Returns true when a row was inserted.
pub async fn inserir_se_ausente(
    pool: &PgPool,
    settings: &Settings,
    cnpj: &str,
    data_de: &str,
    data_ate: &str,
    arquivo: &str,
) -> Result<bool> {
    let tabela = settings.tabela_controle();

    let existe: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE cnpj = $1 AND data_de = $2 AND data_ate = $3",
        tabela
    ))
    .bind(cnpj)
    .bind(data_de)
    .bind(data_ate)
    .fetch_one(pool)
    .await
    .context("Falha ao verificar registro existente na tabela de controle")?;

    if existe > 0 {
        info!(
            "Registro já inserido anteriormente - CNPJ: {}, Data De: {}, Data Até: {}",
            cnpj, data_de, data_ate
        );
        return Ok(false);
    }

    sqlx::query(&format!(
        r#"
        INSERT INTO {}
            (id_controle_execucao, cnpj, data_de, data_ate, created_at, started_at,
             status, status_mensagem, arquivo)
        VALUES (0, $1, $2, $3, now(), now(), $4, 'AGUARDANDO PROCESSAR', $5)
        "#,
        tabela
    ))
    .bind(cnpj)
    .bind(data_de)
    .bind(data_ate)
    .bind(STATUS_PENDENTE)
    .bind(arquivo)
    .execute(pool)
    .await
    .context("Falha ao inserir registro na tabela de controle")?;

    Ok(true)
}

/// Pending records created within the last 3 days, oldest first.
pub async fn pendentes_recentes(
    pool: &PgPool,
    settings: &Settings,
) -> Result<Vec<RegistroControle>> {
    let registros = sqlx::query_as::<_, RegistroControle>(&format!(
        r#"
        SELECT id, cnpj, data_de, data_ate, status, status_mensagem, arquivo,
               created_at, started_at, finished_at
        FROM {}
        WHERE created_at >= now() - INTERVAL '3 days'
          AND status = $1
        ORDER BY created_at ASC
        "#,
        settings.tabela_controle()
    ))
    .bind(STATUS_PENDENTE)
    .fetch_all(pool)
    .await
    .context("Falha ao consultar CNPJs pendentes")?;

    Ok(registros)
}

/// Set the status of the record matching the (cnpj, data_de, data_ate) triple.
pub async fn atualizar_status(
    pool: &PgPool,
    settings: &Settings,
    cnpj: &str,
    data_de: &str,
    data_ate: &str,
    status: &str,
    mensagem: &str,
) -> Result<u64> {
    let resultado = sqlx::query(&format!(
        r#"
        UPDATE {}
        SET status = $1, status_mensagem = $2, finished_at = now()
        WHERE cnpj = $3 AND data_de = $4 AND data_ate = $5
        "#,
        settings.tabela_controle()
    ))
    .bind(status)
    .bind(mensagem)
    .bind(cnpj)
    .bind(data_de)
    .bind(data_ate)
    .execute(pool)
    .await
    .context("Falha ao atualizar status na tabela de controle")?;

    Ok(resultado.rows_affected())
}

/// Records stuck in PENDENTE for more than 3 days are abandoned.
pub async fn abortar_pendentes_antigos(pool: &PgPool, settings: &Settings) -> Result<u64> {
    let resultado = sqlx::query(&format!(
        r#"
        UPDATE {}
        SET status = $1, status_mensagem = 'EXCEDIDO TENTATIVAS DURANTE 3 DIAS'
        WHERE created_at < now() - INTERVAL '3 days'
          AND status = $2
        "#,
        settings.tabela_controle()
    ))
    .bind(STATUS_ABORTADO)
    .bind(STATUS_PENDENTE)
    .execute(pool)
    .await
    .context("Falha ao abortar registros pendentes antigos")?;

    let afetados = resultado.rows_affected();
    if afetados > 0 {
        info!("{} registros atualizados para ABORTADO", afetados);
    }
    Ok(afetados)
}

/// Most recent records, for the `pendentes` listing command.
pub async fn listar_recentes(
    pool: &PgPool,
    settings: &Settings,
    limite: i64,
) -> Result<Vec<RegistroControle>> {
    let registros = sqlx::query_as::<_, RegistroControle>(&format!(
        r#"
        SELECT id, cnpj, data_de, data_ate, status, status_mensagem, arquivo,
               created_at, started_at, finished_at
        FROM {}
        ORDER BY created_at DESC
        LIMIT $1
        "#,
        settings.tabela_controle()
    ))
    .bind(limite)
    .fetch_all(pool)
    .await
    .context("Falha ao listar registros de controle")?;

    Ok(registros)
}
