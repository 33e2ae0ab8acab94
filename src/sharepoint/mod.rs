use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use std::fs;
use std::path::{Path, PathBuf};
use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::arquivos;
use crate::browser;
use crate::config::Settings;
use crate::db::documentos;
use crate::util::slug_de_link;

/// Attempts for the whole stage (browser + login) and per link.
const MAX_TENTATIVAS: u32 = 3;
const MAX_TENTATIVAS_LINK: u32 = 3;

/// Downloads land in a staging folder first and are moved into the per-link
/// folder once complete.
const PASTA_STAGING: &str = "_staging";

/// Walk every PENDENTE link of the GED table through the SharePoint download
/// flow, updating the status of each one. Returns false when there was
/// nothing to process.
pub async fn executar(
    pool: &PgPool,
    settings: &Settings,
    headless: bool,
    limite: Option<i64>,
) -> Result<bool> {
    let staging = settings.folders.folderdownloads.join(PASTA_STAGING);

    for tentativa in 1..=MAX_TENTATIVAS {
        // Re-read the pending list each attempt: links settled earlier
        // (PROCESSADO or FALHOU) never run a second time.
        let links =
            documentos::links_por_status(pool, settings, documentos::STATUS_PENDENTE, limite)
                .await?;
        if links.is_empty() {
            if tentativa == 1 {
                warn!("Nenhum link encontrado para processamento");
                return Ok(false);
            }
            info!("Todos os links foram tratados em tentativas anteriores");
            return Ok(true);
        }
        info!("{} links pendentes para download", links.len());

        let (email, senha) = settings.env.credenciais_robo()?;

        info!("=== TENTATIVA {} DE {} ===", tentativa, MAX_TENTATIVAS);
        match executar_sessao(pool, settings, &links, headless, &email, &senha, &staging).await {
            Ok(()) => return Ok(true),
            Err(e) => {
                error!("Erro geral na tentativa {}: {:#}", tentativa, e);
            }
        }
    }

    bail!("Acesso ao SharePoint falhou após {} tentativas", MAX_TENTATIVAS)
}

async fn executar_sessao(
    pool: &PgPool,
    settings: &Settings,
    links: &[String],
    headless: bool,
    email: &str,
    senha: &str,
    staging: &Path,
) -> Result<()> {
    info!("Abrindo o navegador");
    let driver =
        browser::criar_driver(&settings.env.webdriver_url, headless, Some(staging)).await?;

    let resultado =
        processar_links(pool, settings, &driver, links, email, senha, staging).await;

    browser::finalizar(driver).await;
    resultado
}

async fn processar_links(
    pool: &PgPool,
    settings: &Settings,
    driver: &WebDriver,
    links: &[String],
    email: &str,
    senha: &str,
    staging: &Path,
) -> Result<()> {
    let primeiro = &links[0];
    info!("Acessando URL: {}", primeiro);
    driver.goto(primeiro).await.context("Falha ao acessar primeiro link")?;
    sleep(Duration::from_secs(3)).await;

    browser::login_microsoft(driver, email, senha)
        .await
        .context("Falha ao efetuar login")?;
    sleep(Duration::from_secs(5)).await;

    let total = links.len();
    for (idx, link) in links.iter().enumerate() {
        let mut sucesso = false;

        for tentativa_link in 1..=MAX_TENTATIVAS_LINK {
            info!(
                "Processando link {}/{} (tentativa {}/{})",
                idx + 1,
                total,
                tentativa_link,
                MAX_TENTATIVAS_LINK
            );

            match processar_link(settings, driver, link, staging).await {
                Ok(()) => {
                    atualizar_status(pool, settings, link, documentos::STATUS_PROCESSADO, None)
                        .await;
                    sucesso = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        "Tentativa {}/{} falhou para link {}/{}: {:#}",
                        tentativa_link,
                        MAX_TENTATIVAS_LINK,
                        idx + 1,
                        total,
                        e
                    );
                }
            }
        }

        if !sucesso {
            error!(
                "Link {}/{} ignorado após {} falhas: {}",
                idx + 1,
                total,
                MAX_TENTATIVAS_LINK,
                link
            );
            atualizar_status(
                pool,
                settings,
                link,
                documentos::STATUS_FALHOU,
                Some("Máximo de tentativas atingido"),
            )
            .await;
        }
    }

    Ok(())
}

/// Navigate, select all rows, trigger the download, move the file into the
/// per-link folder and extract any zip found there.
async fn processar_link(
    settings: &Settings,
    driver: &WebDriver,
    link: &str,
    staging: &Path,
) -> Result<()> {
    driver.goto(link).await.context("Falha ao acessar SharePoint")?;
    sleep(Duration::from_secs(5)).await;

    esvaziar_staging(staging)?;

    let selecionar = match driver
        .find(By::XPath(
            "//div[@role='gridcell' and contains(@aria-label, 'Selecionar todas')]",
        ))
        .await
    {
        Ok(elem) => elem,
        Err(_) => driver
            .find(By::Css("div[data-automationid='DetailsHeaderCheck']"))
            .await
            .context("Seletor de linhas não encontrado")?,
    };
    selecionar.click().await?;
    sleep(Duration::from_secs(2)).await;

    info!("Realizando o download do link...");
    let baixar = match driver.find(By::XPath("//button[@name='Baixar']")).await {
        Ok(elem) => elem,
        Err(_) => driver
            .find(By::XPath("//button[contains(., 'Baixar')]"))
            .await
            .context("Botão Baixar não encontrado")?,
    };
    baixar.click().await?;

    let baixado = aguardar_download(staging, Duration::from_secs(120)).await?;

    let pasta_link = settings
        .folders
        .folderdownloads
        .join(slug_de_link(link));
    fs::create_dir_all(&pasta_link)
        .with_context(|| format!("Falha ao criar pasta {:?}", pasta_link))?;

    let destino = pasta_link.join(
        baixado
            .file_name()
            .context("Download sem nome de arquivo")?,
    );
    fs::rename(&baixado, &destino)
        .with_context(|| format!("Falha ao mover download para {:?}", destino))?;

    let tamanho = fs::metadata(&destino).map(|m| m.len()).unwrap_or(0);
    info!("Download salvo em: {:?} (tamanho: {} bytes)", destino, tamanho);

    arquivos::extrair_zips_em_pasta(&pasta_link);
    info!("Extração concluída na pasta: {:?}", pasta_link);

    Ok(())
}

/// Poll the staging folder until a finished download shows up (no
/// `.crdownload`/`.tmp` suffix and stable size) or the timeout passes.
async fn aguardar_download(staging: &Path, timeout: Duration) -> Result<PathBuf> {
    let inicio = std::time::Instant::now();
    let mut tamanho_anterior: Option<(PathBuf, u64)> = None;

    while inicio.elapsed() < timeout {
        sleep(Duration::from_secs(2)).await;

        let candidato = fs::read_dir(staging)
            .context("Falha ao listar pasta de staging")?
            .flatten()
            .map(|e| e.path())
            .find(|p| {
                p.is_file()
                    && !matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("crdownload") | Some("tmp")
                    )
            });

        if let Some(caminho) = candidato {
            let tamanho = fs::metadata(&caminho).map(|m| m.len()).unwrap_or(0);
            match &tamanho_anterior {
                Some((anterior, bytes)) if *anterior == caminho && *bytes == tamanho => {
                    return Ok(caminho);
                }
                _ => tamanho_anterior = Some((caminho, tamanho)),
            }
        }
    }

    bail!("Download não concluído em {:?}", timeout)
}

fn esvaziar_staging(staging: &Path) -> Result<()> {
    if !staging.is_dir() {
        return Ok(());
    }
    for entrada in fs::read_dir(staging).context("Falha ao listar staging")?.flatten() {
        let caminho = entrada.path();
        if caminho.is_file() {
            if let Err(e) = fs::remove_file(&caminho) {
                warn!("Falha ao limpar staging {:?}: {}", caminho, e);
            }
        }
    }
    Ok(())
}

/// Status updates never abort the stage; failures are only logged.
async fn atualizar_status(
    pool: &PgPool,
    settings: &Settings,
    link: &str,
    status: &str,
    mensagem: Option<&str>,
) {
    match documentos::atualizar_status(pool, settings, link, status, mensagem).await {
        Ok(_) => info!("Status do link {} atualizado para {}", link, status),
        Err(e) => error!(
            "Erro ao atualizar status do link {} para {}: {:#}",
            link, status, e
        ),
    }
}
