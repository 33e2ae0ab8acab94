pub mod poller;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::util::{agora_ms, data_para_timestamp_ms};

/// One page of the COMPROT search payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RespostaComprot {
    #[serde(rename = "totalDeProcessosEncontrados", default)]
    pub total_de_processos_encontrados: u32,
    #[serde(default)]
    pub processos: Vec<ProcessoComprot>,
}

/// One legal process as returned by the API. Every field is optional in the
/// payload except the process number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessoComprot {
    pub numero_processo: String,
    pub documento: Option<String>,
    pub nome_interessado: Option<String>,
    pub data_protocolo: Option<String>,
    pub situacao: Option<String>,
    pub uf: Option<String>,
    pub documento_origem: Option<String>,
    pub procedencia: Option<String>,
    pub nome_assunto: Option<String>,
    pub tipo: Option<String>,
    pub sistema_profisc: Option<String>,
    pub sistema_processo: Option<String>,
    pub sistema_sief: Option<String>,
    pub orgao_origem: Option<String>,
    pub orgao_destino: Option<String>,
    pub orgao_outro: Option<String>,
    pub data_movimentado: Option<String>,
    pub sequencia: Option<i32>,
    pub relacao: Option<i32>,
    pub data_disjuntada: Option<String>,
    pub numero_sequencia_disjuntada: Option<String>,
    pub numero_aviso: Option<String>,
    pub numero_processo_principal: Option<String>,
    pub nome_orgao_disjuntada: Option<String>,
    pub codigo_tipo_movimento_processo: Option<String>,
}

/// Outcome of one page query after the retry budget was applied.
#[derive(Debug)]
pub enum ConsultaPagina {
    /// HTTP 200 with a parsed payload.
    Processos(RespostaComprot),
    /// HTTP 204: the CNPJ has no processes in the period.
    SemProcesso,
}

#[derive(Debug, Error)]
pub enum ComprotError {
    #[error("tentativas esgotadas após {tentativas} chamadas (último status HTTP: {ultimo_status:?})")]
    TentativasEsgotadas {
        tentativas: u32,
        ultimo_status: Option<u16>,
    },
    #[error("resposta inválida da API COMPROT: {0}")]
    RespostaInvalida(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Pause between attempts when the API answers 422 or errors out.
const PAUSA_ENTRE_TENTATIVAS: Duration = Duration::from_secs(5);

/// HTTP client for the COMPROT process search, with session cookies and the
/// browser-like headers the portal expects.
pub struct ComprotClient {
    http: Client,
    url_inicial: String,
    url_api: String,
    pasta_temp: PathBuf,
    max_tentativas: u32,
}

impl ComprotClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
            )
            .build()
            .context("Falha ao construir cliente HTTP")?;

        Ok(Self {
            http,
            url_inicial: settings.env.url_inicial.clone(),
            url_api: settings.env.url_api_processo.clone(),
            pasta_temp: settings.folders.foldertemp.clone(),
            max_tentativas: 3,
        })
    }

    /// Visit the portal landing page once so the session cookies the API
    /// requires are present in the cookie store.
    pub async fn aquecer_sessao(&self) -> Result<()> {
        let resposta = self
            .http
            .get(&self.url_inicial)
            .send()
            .await
            .context("Falha ao acessar página inicial do COMPROT")?;

        info!("Status página inicial: {}", resposta.status());
        Ok(())
    }

    /// Fetch one result page for the CNPJ/date range, retrying transient
    /// failures up to the attempt budget.
    pub async fn consultar_pagina(
        &self,
        cnpj: &str,
        cnpj_formatado: &str,
        data_de: NaiveDate,
        data_ate: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<ConsultaPagina, ComprotError> {
        let mut ultimo_status = None;

        for tentativa in 1..=self.max_tentativas {
            debug!("=== TENTATIVA {} DE {} ===", tentativa, self.max_tentativas);

            let url = montar_url(
                &self.url_api,
                cnpj,
                cnpj_formatado,
                data_para_timestamp_ms(data_de),
                data_para_timestamp_ms(data_ate),
                cursor,
                agora_ms(),
            );

            let resposta = match self
                .http
                .get(&url)
                .header("Accept", "*/*")
                .header("Accept-Language", "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7")
                .header("Referer", &self.url_inicial)
                .header("X-Requested-With", "XMLHttpRequest")
                .send()
                .await
            {
                Ok(resposta) => resposta,
                Err(e) => {
                    warn!("Erro ao fazer request: {}", e);
                    sleep(PAUSA_ENTRE_TENTATIVAS).await;
                    continue;
                }
            };

            let status = resposta.status();
            ultimo_status = Some(status.as_u16());

            match status {
                StatusCode::OK => {
                    let corpo = resposta.text().await?;
                    self.salvar_snapshot(cnpj, &corpo);
                    let pagina: RespostaComprot = serde_json::from_str(&corpo)?;
                    info!(
                        "Consulta OK: {} processos encontrados",
                        pagina.total_de_processos_encontrados
                    );
                    return Ok(ConsultaPagina::Processos(pagina));
                }
                StatusCode::NO_CONTENT => {
                    info!("Status 204 - Sem processos encontrados");
                    return Ok(ConsultaPagina::SemProcesso);
                }
                StatusCode::UNPROCESSABLE_ENTITY => {
                    // A 422 that persists past the attempt budget surfaces as
                    // TentativasEsgotadas and the record stays pending for a
                    // later run; only a 204 means the CNPJ has no processes.
                    warn!("Status 422 - Tentando novamente em 5 segundos");
                    sleep(PAUSA_ENTRE_TENTATIVAS).await;
                }
                outro => {
                    error!("Status {} - Erro não tratado", outro);
                    sleep(PAUSA_ENTRE_TENTATIVAS).await;
                }
            }
        }

        Err(ComprotError::TentativasEsgotadas {
            tentativas: self.max_tentativas,
            ultimo_status,
        })
    }

    /// The raw body of every successful page is kept under the temp folder
    /// for auditing. Snapshot failures never fail the run.
    fn salvar_snapshot(&self, cnpj: &str, corpo: &str) {
        let caminho = self.pasta_temp.join(format!("{}{}.json", cnpj, agora_ms()));
        if let Err(e) = std::fs::create_dir_all(&self.pasta_temp)
            .and_then(|_| std::fs::write(&caminho, corpo))
        {
            warn!("Erro ao salvar response em {:?}: {}", caminho, e);
        } else {
            debug!("Response salvo em {:?}", caminho);
        }
    }
}

/// Build the search URL the way the portal front end does.
pub fn montar_url(
    url_api: &str,
    cnpj: &str,
    cnpj_formatado: &str,
    timestamp_de: i64,
    timestamp_ate: i64,
    cursor: Option<&str>,
    agora_ms: i64,
) -> String {
    format!(
        "{}?cpfCnpjComMascara={}&cpfCnpj={}&nomeInteressado=&tipoPesquisa=cnpj\
         &dataInicial={}&dataFinal={}&numeroUltimoProcesso={}&_={}",
        url_api,
        urlencoding::encode(cnpj_formatado),
        cnpj,
        timestamp_de,
        timestamp_ate,
        urlencoding::encode(cursor.unwrap_or("")),
        agora_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_sem_cursor_usa_parametro_vazio() {
        let url = montar_url(
            "https://comprot.fazenda.gov.br/comprotegov/api/processo",
            "28144326000101",
            "28.144.326/0001-01",
            1_723_420_800_000,
            1_724_025_600_000,
            None,
            1_724_100_000_000,
        );

        assert!(url.contains("cpfCnpj=28144326000101"));
        assert!(url.contains("cpfCnpjComMascara=28.144.326%2F0001-01"));
        assert!(url.contains("tipoPesquisa=cnpj"));
        assert!(url.contains("dataInicial=1723420800000"));
        assert!(url.contains("dataFinal=1724025600000"));
        assert!(url.contains("numeroUltimoProcesso=&"));
        assert!(url.ends_with("&_=1724100000000"));
    }

    #[test]
    fn url_com_cursor_carrega_ultimo_processo() {
        let url = montar_url(
            "https://api.exemplo/processo",
            "28144326000101",
            "28.144.326/0001-01",
            0,
            0,
            Some("10980720123202411"),
            1,
        );
        assert!(url.contains("numeroUltimoProcesso=10980720123202411"));
    }

    #[test]
    fn payload_parse_com_campos_ausentes() {
        let corpo = r#"{
            "totalDeProcessosEncontrados": 61,
            "processos": [
                {
                    "numeroProcesso": "10980720123202411",
                    "nomeInteressado": "EMPRESA EXEMPLO LTDA",
                    "situacao": "ATIVO",
                    "uf": "PR",
                    "sequencia": 3,
                    "numeroProcessoPrincipal": "10980720123202411"
                }
            ]
        }"#;

        let resposta: RespostaComprot = serde_json::from_str(corpo).unwrap();
        assert_eq!(resposta.total_de_processos_encontrados, 61);
        assert_eq!(resposta.processos.len(), 1);

        let processo = &resposta.processos[0];
        assert_eq!(processo.numero_processo, "10980720123202411");
        assert_eq!(processo.sequencia, Some(3));
        assert!(processo.documento.is_none());
        assert!(processo.data_protocolo.is_none());
    }

    #[test]
    fn payload_vazio_usa_defaults() {
        let resposta: RespostaComprot = serde_json::from_str("{}").unwrap();
        assert_eq!(resposta.total_de_processos_encontrados, 0);
        assert!(resposta.processos.is_empty());
    }
}
