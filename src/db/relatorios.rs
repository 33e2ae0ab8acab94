use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::debug;

use crate::comprot::ProcessoComprot;
use crate::config::Settings;

/// Upsert one process into the report table, keyed by numero_processo:
/// update when the row exists, insert otherwise.
pub async fn upsert_processo(
    pool: &PgPool,
    settings: &Settings,
    id_controle_dado: i32,
    processo: &ProcessoComprot,
) -> Result<()> {
    let tabela = settings.tabela_relatorios();

    let atualizados = sqlx::query(&format!(
        r#"
        UPDATE {}
        SET documento = $1,
            nome_interessado = $2,
            data_protocolo = $3,
            situacao = $4,
            uf = $5,
            documento_origem = $6,
            procedencia = $7,
            nome_assunto = $8,
            tipo = $9,
            sistema_profisc = $10,
            sistema_processo = $11,
            sistema_sief = $12,
            orgao_origem = $13,
            orgao_destino = $14,
            orgao_outro = $15,
            data_movimentado = $16,
            sequencia = $17,
            relacao = $18,
            data_disjuntada = $19,
            numero_sequencia_disjuntada = $20,
            numero_aviso = $21,
            numero_processo_principal = $22,
            nome_orgao_disjuntada = $23,
            codigo_tipo_movimento_processo = $24,
            id_controle_dado = $25
        WHERE numero_processo = $26
        "#,
        tabela
    ))
    .bind(&processo.documento)
    .bind(&processo.nome_interessado)
    .bind(&processo.data_protocolo)
    .bind(&processo.situacao)
    .bind(&processo.uf)
    .bind(&processo.documento_origem)
    .bind(&processo.procedencia)
    .bind(&processo.nome_assunto)
    .bind(&processo.tipo)
    .bind(&processo.sistema_profisc)
    .bind(&processo.sistema_processo)
    .bind(&processo.sistema_sief)
    .bind(&processo.orgao_origem)
    .bind(&processo.orgao_destino)
    .bind(&processo.orgao_outro)
    .bind(&processo.data_movimentado)
    .bind(processo.sequencia)
    .bind(processo.relacao)
    .bind(&processo.data_disjuntada)
    .bind(&processo.numero_sequencia_disjuntada)
    .bind(&processo.numero_aviso)
    .bind(&processo.numero_processo_principal)
    .bind(&processo.nome_orgao_disjuntada)
    .bind(&processo.codigo_tipo_movimento_processo)
    .bind(id_controle_dado)
    .bind(&processo.numero_processo)
    .execute(pool)
    .await
    .context("Falha ao atualizar relatório de processo")?
    .rows_affected();

    if atualizados > 0 {
        debug!(
            "Processo {} atualizado no relatório",
            processo.numero_processo
        );
        return Ok(());
    }

    sqlx::query(&format!(
        r#"
        INSERT INTO {}
            (id_controle_dado, documento, nome_interessado, data_protocolo, situacao,
             uf, numero_processo, documento_origem, procedencia, nome_assunto, tipo,
             sistema_profisc, sistema_processo, sistema_sief, orgao_origem,
             orgao_destino, orgao_outro, data_movimentado, sequencia, relacao,
             data_disjuntada, numero_sequencia_disjuntada, numero_aviso,
             numero_processo_principal, nome_orgao_disjuntada,
             codigo_tipo_movimento_processo, created_at, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, now(), 'COLETADO')
        "#,
        tabela
    ))
    .bind(id_controle_dado)
    .bind(&processo.documento)
    .bind(&processo.nome_interessado)
    .bind(&processo.data_protocolo)
    .bind(&processo.situacao)
    .bind(&processo.uf)
    .bind(&processo.numero_processo)
    .bind(&processo.documento_origem)
    .bind(&processo.procedencia)
    .bind(&processo.nome_assunto)
    .bind(&processo.tipo)
    .bind(&processo.sistema_profisc)
    .bind(&processo.sistema_processo)
    .bind(&processo.sistema_sief)
    .bind(&processo.orgao_origem)
    .bind(&processo.orgao_destino)
    .bind(&processo.orgao_outro)
    .bind(&processo.data_movimentado)
    .bind(processo.sequencia)
    .bind(processo.relacao)
    .bind(&processo.data_disjuntada)
    .bind(&processo.numero_sequencia_disjuntada)
    .bind(&processo.numero_aviso)
    .bind(&processo.numero_processo_principal)
    .bind(&processo.nome_orgao_disjuntada)
    .bind(&processo.codigo_tipo_movimento_processo)
    .execute(pool)
    .await
    .context("Falha ao inserir relatório de processo")?;

    debug!(
        "Processo {} inserido no relatório",
        processo.numero_processo
    );
    Ok(())
}
