use anyhow::{bail, Result};
use chrono::{Local, Timelike};
use rand::Rng;
use sqlx::PgPool;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::arquivos;
use crate::comprot::{ComprotClient, ConsultaPagina};
use crate::config::Settings;
use crate::db::controle::{self, RegistroControle};
use crate::db::relatorios;
use crate::util::{formatar_cnpj, parse_data_iso, somente_digitos, total_paginas};

/// Queries only run inside this local-time window.
const HORA_INICIO: u32 = 7;
const HORA_FIM: u32 = 22;

fn dentro_da_janela(hora: u32) -> bool {
    (HORA_INICIO..HORA_FIM).contains(&hora)
}

/// Poll every pending CNPJ against COMPROT, page by page, and settle the
/// control-table status of each one.
pub async fn executar(pool: &PgPool, settings: &Settings) -> Result<()> {
    let hora_atual = Local::now().hour();
    if !dentro_da_janela(hora_atual) {
        warn!(
            "Consulta ignorada por estar fora do horário permitido: {}h",
            hora_atual
        );
        return Ok(());
    }

    controle::abortar_pendentes_antigos(pool, settings).await?;
    arquivos::limpar_jsons(&settings.folders.foldertemp)?;

    let registros = controle::pendentes_recentes(pool, settings).await?;
    if registros.is_empty() {
        warn!("Nenhum CNPJ pendente encontrado nos últimos 3 dias");
        return Ok(());
    }
    info!("{} CNPJs pendentes para consultar", registros.len());

    let cliente = ComprotClient::new(settings)?;
    cliente.aquecer_sessao().await?;

    let total = registros.len();
    for (idx, registro) in registros.iter().enumerate() {
        info!(
            "[{}/{}] Iniciando consulta para o CNPJ {}",
            idx + 1,
            total,
            registro.cnpj
        );

        // Per-record failures are logged and the loop moves on; the record
        // stays PENDENTE for a later run.
        if let Err(e) = consultar_registro(pool, settings, &cliente, registro).await {
            error!("Erro ao consultar CNPJ {}: {:#}", registro.cnpj, e);
        }

        if idx + 1 < total {
            let pausa = rand::thread_rng().gen_range(2..=5);
            sleep(Duration::from_secs(pausa)).await;
        }
    }

    info!("Consulta de pendentes concluída");
    Ok(())
}

async fn consultar_registro(
    pool: &PgPool,
    settings: &Settings,
    cliente: &ComprotClient,
    registro: &RegistroControle,
) -> Result<()> {
    let cnpj = somente_digitos(&registro.cnpj);
    let cnpj_formatado = formatar_cnpj(&cnpj)?;

    let (data_de, data_ate) = match (&registro.data_de, &registro.data_ate) {
        (Some(de), Some(ate)) => (de.clone(), ate.clone()),
        _ => bail!("Registro {} sem intervalo de datas", registro.id),
    };
    let dt_de = parse_data_iso(&data_de)?;
    let dt_ate = parse_data_iso(&data_ate)?;

    info!(
        "Iniciando consulta para o cnpj {} na data de {} ate {}",
        cnpj_formatado, data_de, data_ate
    );

    let mut cursor: Option<String> = None;
    let mut paginas_lidas = 0u32;
    let mut processos_gravados = 0usize;

    loop {
        let pagina = cliente
            .consultar_pagina(&cnpj, &cnpj_formatado, dt_de, dt_ate, cursor.as_deref())
            .await;

        match pagina {
            Ok(ConsultaPagina::SemProcesso) => {
                controle::atualizar_status(
                    pool,
                    settings,
                    &cnpj,
                    &data_de,
                    &data_ate,
                    controle::STATUS_SEM_PROCESSO,
                    "CONSULTA ABORTADA",
                )
                .await?;
                info!("Nenhum processo encontrado para {}", cnpj_formatado);
                return Ok(());
            }
            Ok(ConsultaPagina::Processos(resposta)) => {
                paginas_lidas += 1;
                let paginas = total_paginas(resposta.total_de_processos_encontrados);
                info!(
                    "Página {}/{}: {} processos no total",
                    paginas_lidas, paginas, resposta.total_de_processos_encontrados
                );

                for processo in &resposta.processos {
                    if processo.numero_processo.is_empty() {
                        warn!("Processo sem número no payload, ignorado");
                        continue;
                    }
                    relatorios::upsert_processo(pool, settings, registro.id, processo).await?;
                    processos_gravados += 1;
                }

                cursor = resposta
                    .processos
                    .last()
                    .and_then(|p| p.numero_processo_principal.clone())
                    .filter(|c| !c.is_empty());

                controle::atualizar_status(
                    pool,
                    settings,
                    &cnpj,
                    &data_de,
                    &data_ate,
                    controle::STATUS_CONCLUIDO,
                    "COLETADO PROCESSOS",
                )
                .await?;

                // Last page reached, or cursor unavailable to go further
                if paginas_lidas >= paginas || paginas <= 1 || cursor.is_none() {
                    break;
                }
            }
            Err(e) => {
                // Retry budget exhausted; leave the record PENDENTE
                error!(
                    "Consulta falhou para {} ({} a {}): {}",
                    cnpj_formatado, data_de, data_ate, e
                );
                return Ok(());
            }
        }
    }

    info!(
        "Consulta concluída para o cnpj {}: {} processos gravados em {} páginas",
        cnpj_formatado, processos_gravados, paginas_lidas
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn janela_de_consulta_das_7_as_22() {
        assert!(!dentro_da_janela(6));
        assert!(dentro_da_janela(7));
        assert!(dentro_da_janela(21));
        assert!(!dentro_da_janela(22));
        assert!(!dentro_da_janela(0));
    }
}
