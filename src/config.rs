use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings loaded from `config.json`, with credentials and URLs coming from
/// the environment (`.env` via dotenv). Nothing sensitive lives in the JSON
/// file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub project: ProjectSettings,
    pub database: DatabaseSettings,
    pub folders: FolderSettings,

    #[serde(skip)]
    pub env: EnvSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub schema: String,
    pub tabcontroledados: String,
    pub tabrelprocessos: String,
    pub tabdocumentosged: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderSettings {
    pub folderrede: PathBuf,
    pub foldercapturados: PathBuf,
    pub folderprocessados: PathBuf,
    pub foldererroprocessar: PathBuf,
    pub folderdownloads: PathBuf,
    pub foldertemp: PathBuf,
}

/// Values resolved from the environment at load time.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    pub database_url: String,
    pub url_inicial: String,
    pub url_api_processo: String,
    pub url_qualis: Option<String>,
    pub webdriver_url: String,
    pub robo_email: Option<String>,
    pub robo_senha: Option<String>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let conteudo = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Falha ao ler arquivo de configuração {:?}", path.as_ref())
        })?;

        let mut settings: Settings =
            serde_json::from_str(&conteudo).context("config.json inválido")?;

        settings.database.validar()?;
        settings.env = EnvSettings::from_env()?;

        Ok(settings)
    }

    /// Schema-qualified control table name.
    pub fn tabela_controle(&self) -> String {
        format!("{}.{}", self.database.schema, self.database.tabcontroledados)
    }

    /// Schema-qualified process report table name.
    pub fn tabela_relatorios(&self) -> String {
        format!("{}.{}", self.database.schema, self.database.tabrelprocessos)
    }

    /// Schema-qualified GED documents table name.
    pub fn tabela_documentos(&self) -> String {
        format!("{}.{}", self.database.schema, self.database.tabdocumentosged)
    }
}

impl DatabaseSettings {
    /// Table names are interpolated into SQL text (binds cannot cover
    /// identifiers), so they must be plain identifiers.
    fn validar(&self) -> Result<()> {
        for nome in [
            &self.schema,
            &self.tabcontroledados,
            &self.tabrelprocessos,
            &self.tabdocumentosged,
        ] {
            if nome.is_empty()
                || !nome
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                bail!("Identificador de banco inválido na configuração: '{}'", nome);
            }
        }
        Ok(())
    }
}

impl EnvSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: obrigatoria("DATABASE_URL")?,
            url_inicial: obrigatoria("URL_INICIAL")?,
            url_api_processo: obrigatoria("URL_API_PROCESSO")?,
            url_qualis: std::env::var("URL_QUALIS").ok().filter(|v| !v.is_empty()),
            webdriver_url: std::env::var("WEBDRIVER_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            robo_email: std::env::var("ROBO_EMAIL").ok().filter(|v| !v.is_empty()),
            robo_senha: std::env::var("ROBO_SENHA").ok().filter(|v| !v.is_empty()),
        })
    }

    /// Robot credentials for the Microsoft login flows. Required only by the
    /// browser stages, so resolution is deferred until they run.
    pub fn credenciais_robo(&self) -> Result<(String, String)> {
        match (&self.robo_email, &self.robo_senha) {
            (Some(email), Some(senha)) => Ok((email.clone(), senha.clone())),
            _ => bail!("ROBO_EMAIL e ROBO_SENHA devem estar definidos no ambiente"),
        }
    }
}

fn obrigatoria(chave: &str) -> Result<String> {
    std::env::var(chave)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} deve estar definida no ambiente", chave))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_settings(schema: &str) -> DatabaseSettings {
        DatabaseSettings {
            schema: schema.to_string(),
            tabcontroledados: "controle_dados".to_string(),
            tabrelprocessos: "relatorios_processo".to_string(),
            tabdocumentosged: "documentos_ged".to_string(),
        }
    }

    #[test]
    fn aceita_identificadores_simples() {
        assert!(db_settings("comprot").validar().is_ok());
        assert!(db_settings("comprot_2").validar().is_ok());
    }

    #[test]
    fn rejeita_identificadores_perigosos() {
        assert!(db_settings("comprot; DROP TABLE x").validar().is_err());
        assert!(db_settings("").validar().is_err());
        assert!(db_settings("a.b").validar().is_err());
    }

    #[test]
    fn monta_nomes_qualificados() {
        let settings = Settings {
            project: ProjectSettings {
                name: "comprot-bot".to_string(),
            },
            database: db_settings("comprot"),
            folders: FolderSettings {
                folderrede: PathBuf::from("/srv/rede"),
                foldercapturados: PathBuf::from("data/capturados"),
                folderprocessados: PathBuf::from("data/processados"),
                foldererroprocessar: PathBuf::from("data/erro_processar"),
                folderdownloads: PathBuf::from("data/downloads"),
                foldertemp: PathBuf::from("data/temp"),
            },
            env: EnvSettings::default(),
        };

        assert_eq!(settings.tabela_controle(), "comprot.controle_dados");
        assert_eq!(settings.tabela_relatorios(), "comprot.relatorios_processo");
        assert_eq!(settings.tabela_documentos(), "comprot.documentos_ged");
    }
}
