use anyhow::{Context, Result};
use std::path::Path;
use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Open a Chrome session against the configured WebDriver endpoint, with the
/// usual automation flags and, when given, a fixed download folder.
pub async fn criar_driver(
    webdriver_url: &str,
    headless: bool,
    pasta_download: Option<&Path>,
) -> Result<WebDriver> {
    let mut caps = DesiredCapabilities::chrome();
    if headless {
        caps.add_chrome_arg("--headless")?;
    }
    caps.add_chrome_arg("--no-sandbox")?;
    caps.add_chrome_arg("--disable-dev-shm-usage")?;
    caps.add_chrome_arg("--disable-gpu")?;
    caps.add_chrome_arg("--window-size=1280,1024")?;
    caps.add_chrome_arg("--disable-blink-features=AutomationControlled")?;

    if let Some(pasta) = pasta_download {
        std::fs::create_dir_all(pasta)
            .with_context(|| format!("Falha ao criar pasta de downloads {:?}", pasta))?;
        caps.add_chrome_option(
            "prefs",
            serde_json::json!({
                "download.default_directory": pasta.to_string_lossy(),
                "download.prompt_for_download": false,
                "safebrowsing.enabled": true,
            }),
        )?;
    }

    let driver = WebDriver::new(webdriver_url, caps)
        .await
        .context("Failed to connect to WebDriver")?;

    driver
        .set_page_load_timeout(std::time::Duration::from_secs(120))
        .await?;
    driver
        .set_implicit_wait_timeout(std::time::Duration::from_secs(10))
        .await?;

    Ok(driver)
}

/// Walk through the Microsoft sign-in sequence: email → Avançar → senha →
/// Entrar → "Não mostrar isso novamente" → Sim.
pub async fn login_microsoft(driver: &WebDriver, email: &str, senha: &str) -> Result<()> {
    info!("Efetuando login...");

    let campo_email = match driver.find(By::Css("input[type='email']")).await {
        Ok(elem) => elem,
        Err(_) => driver
            .find(By::Id("i0116"))
            .await
            .context("Campo de e-mail do login não encontrado")?,
    };
    campo_email.send_keys(email).await?;

    clicar_botao_principal(driver).await?;
    sleep(Duration::from_secs(3)).await;

    let campo_senha = match driver.find(By::Css("input[type='password']")).await {
        Ok(elem) => elem,
        Err(_) => driver
            .find(By::Id("i0118"))
            .await
            .context("Campo de senha do login não encontrado")?,
    };
    campo_senha.send_keys(senha).await?;

    clicar_botao_principal(driver).await?;
    sleep(Duration::from_secs(3)).await;

    // "Continuar conectado?" page; skipping it is not fatal
    if let Ok(chk) = driver.find(By::Id("KmsiCheckboxField")).await {
        if let Err(e) = chk.click().await {
            warn!("Não foi possível marcar 'Não mostrar novamente': {}", e);
        }
        if let Err(e) = clicar_botao_principal(driver).await {
            warn!("Não foi possível confirmar 'Sim': {}", e);
        }
        sleep(Duration::from_secs(2)).await;
    }

    info!("Login efetuado com sucesso!");
    Ok(())
}

/// The Microsoft login reuses one primary button id for Avançar/Entrar/Sim.
async fn clicar_botao_principal(driver: &WebDriver) -> Result<()> {
    let botao = match driver.find(By::Id("idSIButton9")).await {
        Ok(elem) => elem,
        Err(_) => driver
            .find(By::Css("input[type='submit']"))
            .await
            .context("Botão principal do login não encontrado")?,
    };
    botao.click().await?;
    Ok(())
}

/// Close the browser, logging instead of failing when the session is gone.
pub async fn finalizar(driver: WebDriver) {
    if let Err(e) = driver.quit().await {
        warn!("Failed to close browser session cleanly: {}", e);
    } else {
        info!("Recursos finalizados com sucesso");
    }
}
