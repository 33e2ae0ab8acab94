use anyhow::{bail, Context, Result};
use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use crate::browser;
use crate::config::Settings;

const MAX_TENTATIVAS: u32 = 3;

/// Variant of the document flow targeting the Qualis portal: open the portal,
/// pick the Microsoft login option and authenticate with the robot account.
pub async fn executar_acesso_portal(settings: &Settings, headless: bool) -> Result<()> {
    let url_qualis = settings
        .env
        .url_qualis
        .as_deref()
        .context("URL_QUALIS deve estar definida no ambiente")?;
    let (email, senha) = settings.env.credenciais_robo()?;

    for tentativa in 1..=MAX_TENTATIVAS {
        info!("=== TENTATIVA {} DE {} ===", tentativa, MAX_TENTATIVAS);

        match executar_sessao(settings, url_qualis, &email, &senha, headless).await {
            Ok(()) => return Ok(()),
            Err(e) => error!("Erro geral na tentativa {}: {:#}", tentativa, e),
        }
    }

    bail!("Acesso ao portal Qualis falhou após {} tentativas", MAX_TENTATIVAS)
}

async fn executar_sessao(
    settings: &Settings,
    url_qualis: &str,
    email: &str,
    senha: &str,
    headless: bool,
) -> Result<()> {
    info!("Abrindo o navegador");
    let driver = browser::criar_driver(&settings.env.webdriver_url, headless, None).await?;

    let resultado = acessar_e_logar(&driver, url_qualis, email, senha).await;

    browser::finalizar(driver).await;
    resultado
}

async fn acessar_e_logar(
    driver: &WebDriver,
    url_qualis: &str,
    email: &str,
    senha: &str,
) -> Result<()> {
    info!("Acessando página inicial");
    driver.goto(url_qualis).await.context("Falha ao acessar portal Qualis")?;
    sleep(Duration::from_secs(3)).await;

    let login_ms = driver
        .find(By::XPath("//*[contains(text(), 'Login com')]"))
        .await
        .context("Opção de login Microsoft não encontrada")?;
    login_ms.click().await?;
    sleep(Duration::from_secs(3)).await;

    browser::login_microsoft(driver, email, senha).await?;
    sleep(Duration::from_secs(5)).await;

    info!("Portal Qualis autenticado com sucesso");
    Ok(())
}
