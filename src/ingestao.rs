use anyhow::Result;
use clap::ValueEnum;
use sqlx::PgPool;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::db::{controle, documentos};
use crate::planilha;
use crate::util::{parse_data_ddmmyyyy, somente_digitos};

/// Which worksheet layout to ingest. `Auto` decides by the number of header
/// columns: the control layout has 3, the GED layout has 4 or more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    Auto,
    Controle,
    Ged,
}

/// Pick up the spreadsheet from the network folder and feed the matching
/// table. No file found is a no-op with a critical log, not an error.
pub async fn executar(pool: &PgPool, settings: &Settings, layout: Layout) -> Result<()> {
    let caminho = match planilha::capturar_da_rede(settings)? {
        Some(caminho) => caminho,
        None => {
            error!("Planilha de Processamento não encontrada ou Vazia");
            return Ok(());
        }
    };

    let layout = match layout {
        Layout::Auto => detectar_layout(&caminho)?,
        explicito => explicito,
    };

    let resultado = match layout {
        Layout::Controle => ingerir_controle(pool, settings, &caminho).await,
        Layout::Ged => ingerir_ged(pool, settings, &caminho).await,
        Layout::Auto => unreachable!("layout já resolvido"),
    };

    match resultado {
        Ok(()) => {
            planilha::mover_para_processados(settings, &caminho)?;
            Ok(())
        }
        Err(e) => {
            // The file is moved aside either way so a broken spreadsheet does
            // not poison every following run.
            error!("Falha ao ingerir planilha {:?}: {:#}", caminho, e);
            if let Err(e) = planilha::mover_para_erros(settings, &caminho) {
                warn!("Falha ao mover planilha com erro: {:#}", e);
            }
            Ok(())
        }
    }
}

fn detectar_layout(caminho: &Path) -> Result<Layout> {
    let colunas = planilha::contar_colunas(caminho)?;
    let layout = if colunas >= 4 {
        Layout::Ged
    } else {
        Layout::Controle
    };
    info!("Layout detectado: {:?} ({} colunas)", layout, colunas);
    Ok(layout)
}

/// Normalize and insert each (cnpj, dataini, datafim) row, skipping rows with
/// bad dates and exact duplicates.
async fn ingerir_controle(pool: &PgPool, settings: &Settings, caminho: &Path) -> Result<()> {
    let linhas = planilha::carregar_controle(caminho)?;
    let arquivo = caminho.to_string_lossy();

    let mut inseridos = 0usize;
    let mut existentes = 0usize;

    for linha in &linhas {
        let cnpj = somente_digitos(&linha.cnpj);

        let (data_de, data_ate) =
            match (parse_data_ddmmyyyy(&linha.dataini), parse_data_ddmmyyyy(&linha.datafim)) {
                (Ok(de), Ok(ate)) => (de.to_string(), ate.to_string()),
                (de, ate) => {
                    error!(
                        "Formato de data inválido para CNPJ {}. DataIni: {} ({:?}), DataFim: {} ({:?})",
                        cnpj,
                        linha.dataini,
                        de.err(),
                        linha.datafim,
                        ate.err()
                    );
                    continue;
                }
            };

        if controle::inserir_se_ausente(pool, settings, &cnpj, &data_de, &data_ate, &arquivo)
            .await?
        {
            info!(
                "Registro inserido com sucesso - CNPJ: {}, Data De: {}, Data Até: {}",
                cnpj, data_de, data_ate
            );
            inseridos += 1;
        } else {
            existentes += 1;
        }
    }

    info!(
        "Processamento concluído - Inseridos: {}, Já existentes: {}",
        inseridos, existentes
    );
    Ok(())
}

async fn ingerir_ged(pool: &PgPool, settings: &Settings, caminho: &Path) -> Result<()> {
    let linhas = planilha::carregar_ged(caminho)?;
    info!(
        "Iniciando inserção de {} registros na tabela documentos_ged",
        linhas.len()
    );

    let resumo = documentos::inserir_linhas(pool, settings, &linhas).await?;
    if resumo.inseridos == 0 && resumo.existentes == 0 {
        warn!("Nenhum registro aproveitado da planilha de documentos GED");
    }
    Ok(())
}
