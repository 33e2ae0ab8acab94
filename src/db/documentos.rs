use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};

use crate::config::Settings;
use crate::planilha::LinhaGed;

pub const STATUS_PENDENTE: &str = "PENDENTE";
pub const STATUS_PROCESSADO: &str = "PROCESSADO";
pub const STATUS_FALHOU: &str = "FALHOU";

/// Row of the GED documents table: one SharePoint link to download.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentoGed {
    pub id: i32,
    pub unidade: String,
    pub setor: Option<String>,
    pub tipo_documento: Option<String>,
    pub link: String,
    pub tipo_aba: Option<String>,
    pub status: Option<String>,
    pub status_mensagem: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Summary of one ingestion pass over the GED worksheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResumoInsercao {
    pub inseridos: usize,
    pub existentes: usize,
    pub erros: usize,
}

/// Insert the worksheet rows, skipping duplicates by link. Rows missing the
/// mandatory link or unidade are counted as errors and skipped.
pub async fn inserir_linhas(
    pool: &PgPool,
    settings: &Settings,
    linhas: &[LinhaGed],
) -> Result<ResumoInsercao> {
    let tabela = settings.tabela_documentos();
    let mut resumo = ResumoInsercao::default();

    for linha in linhas {
        if linha.link.trim().is_empty() {
            warn!("Link vazio encontrado, pulando registro: {:?}", linha);
            resumo.erros += 1;
            continue;
        }
        if linha.unidade.trim().is_empty() {
            warn!("Unidade vazia encontrada, pulando registro: {:?}", linha);
            resumo.erros += 1;
            continue;
        }

        let existe: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE link = $1",
            tabela
        ))
        .bind(&linha.link)
        .fetch_one(pool)
        .await
        .context("Falha ao verificar link existente")?;

        if existe > 0 {
            info!("Registro já inserido anteriormente - Link: {}", linha.link);
            resumo.existentes += 1;
            continue;
        }

        // setor pode ser NULL para registros da aba UNIDADE
        let setor = Some(linha.setor.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        sqlx::query(&format!(
            r#"
            INSERT INTO {}
                (unidade, setor, tipo_documento, link, tipo_aba, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            "#,
            tabela
        ))
        .bind(linha.unidade.trim())
        .bind(setor)
        .bind(linha.tipo_documento.trim())
        .bind(linha.link.trim())
        .bind(linha.tipo_aba.trim())
        .bind(STATUS_PENDENTE)
        .execute(pool)
        .await
        .context("Falha ao inserir registro de documento GED")?;

        info!(
            "Registro inserido com sucesso - Unidade: {}, Link: {}",
            linha.unidade, linha.link
        );
        resumo.inseridos += 1;
    }

    info!(
        "Processamento concluído - Inseridos: {}, Já existentes: {}, Erros: {}",
        resumo.inseridos, resumo.existentes, resumo.erros
    );
    Ok(resumo)
}

/// Links in a given status, oldest first, optionally limited.
pub async fn links_por_status(
    pool: &PgPool,
    settings: &Settings,
    status: &str,
    limite: Option<i64>,
) -> Result<Vec<String>> {
    let mut sql = format!(
        "SELECT link FROM {} WHERE status = $1 ORDER BY created_at ASC",
        settings.tabela_documentos()
    );
    if limite.is_some() {
        sql.push_str(" LIMIT $2");
    }

    let mut consulta = sqlx::query_scalar::<_, String>(&sql).bind(status);
    if let Some(limite) = limite {
        consulta = consulta.bind(limite);
    }

    consulta
        .fetch_all(pool)
        .await
        .context("Falha ao consultar links de documentos GED")
}

/// Update the status (and optional message) of one link after a download attempt.
pub async fn atualizar_status(
    pool: &PgPool,
    settings: &Settings,
    link: &str,
    status: &str,
    mensagem: Option<&str>,
) -> Result<u64> {
    let resultado = sqlx::query(&format!(
        r#"
        UPDATE {}
        SET status = $1, status_mensagem = $2, updated_at = now()
        WHERE link = $3
        "#,
        settings.tabela_documentos()
    ))
    .bind(status)
    .bind(mensagem)
    .bind(link)
    .execute(pool)
    .await
    .context("Falha ao atualizar status do documento GED")?;

    Ok(resultado.rows_affected())
}
