use anyhow::{bail, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Settings;

/// Row of the control worksheet: positional columns (cnpj, dataini, datafim).
#[derive(Debug, Clone)]
pub struct LinhaControle {
    pub cnpj: String,
    pub dataini: String,
    pub datafim: String,
}

/// Row of the GED worksheet: positional columns
/// (unidade, setor, tipo_documento, link), tab name carried as tipo_aba.
#[derive(Debug, Clone)]
pub struct LinhaGed {
    pub unidade: String,
    pub setor: String,
    pub tipo_documento: String,
    pub link: String,
    pub tipo_aba: String,
}

/// Copy whatever landed in the network folder into the local "capturados"
/// folder and return the first `.xlsx` found there.
pub fn capturar_da_rede(settings: &Settings) -> Result<Option<PathBuf>> {
    let rede = &settings.folders.folderrede;
    let capturados = &settings.folders.foldercapturados;

    if !rede.exists() {
        bail!("A pasta de rede {:?} não existe ou não está acessível", rede);
    }
    fs::create_dir_all(capturados)
        .with_context(|| format!("Falha ao criar pasta {:?}", capturados))?;

    for entrada in fs::read_dir(rede).context("Falha ao listar pasta de rede")? {
        let entrada = entrada?;
        if !entrada.file_type()?.is_file() {
            continue;
        }
        let destino = capturados.join(entrada.file_name());
        fs::copy(entrada.path(), &destino).with_context(|| {
            format!("Erro ao mover arquivo da rede para pasta a processar: {:?}", entrada.path())
        })?;
        info!(
            "Arquivo {:?} movido da rede para pasta local com sucesso",
            entrada.file_name()
        );
    }

    for entrada in fs::read_dir(capturados).context("Falha ao listar pasta capturados")? {
        let caminho = entrada?.path();
        if caminho.extension().and_then(|e| e.to_str()) == Some("xlsx") {
            info!("Arquivo encontrado: {:?}", caminho);
            return Ok(Some(caminho));
        }
    }

    warn!("Não existe arquivo .xlsx na pasta {:?}", capturados);
    Ok(None)
}

/// Load the control worksheet, all cells as text so leading zeros survive.
pub fn carregar_controle(caminho: &Path) -> Result<Vec<LinhaControle>> {
    info!("Carregando dados da planilha {:?}", caminho);

    let mut workbook: Xlsx<_> =
        open_workbook(caminho).with_context(|| format!("Falha ao abrir planilha {:?}", caminho))?;

    let nomes = workbook.sheet_names().to_vec();
    let primeira = nomes
        .first()
        .context("A planilha não possui nenhuma aba")?
        .clone();

    let range = workbook
        .worksheet_range(&primeira)
        .with_context(|| format!("Falha ao ler aba {}", primeira))?;

    // First row is the header
    let linhas = linhas_de_controle(range.rows().skip(1));
    if linhas.is_empty() {
        bail!("A planilha está vazia");
    }

    info!("Dados carregados com sucesso. Linhas: {}", linhas.len());
    Ok(linhas)
}

/// Map positional cells to control rows, dropping fully blank rows.
fn linhas_de_controle<'a>(rows: impl Iterator<Item = &'a [Data]>) -> Vec<LinhaControle> {
    let mut linhas = Vec::new();
    for row in rows {
        let cnpj = texto_celula(row.first());
        let dataini = texto_celula(row.get(1));
        let datafim = texto_celula(row.get(2));

        if cnpj.is_empty() && dataini.is_empty() && datafim.is_empty() {
            continue;
        }
        linhas.push(LinhaControle {
            cnpj,
            dataini,
            datafim,
        });
    }
    linhas
}

/// Load every tab of the GED worksheet. Each tab name becomes the tipo_aba of
/// its rows; columns are positional (unidade, setor, tipo_documento, link).
pub fn carregar_ged(caminho: &Path) -> Result<Vec<LinhaGed>> {
    info!("Carregando planilha de documentos GED {:?}", caminho);

    let mut workbook: Xlsx<_> =
        open_workbook(caminho).with_context(|| format!("Falha ao abrir planilha {:?}", caminho))?;

    let nomes = workbook.sheet_names().to_vec();
    if nomes.is_empty() {
        bail!("A planilha não possui nenhuma aba");
    }

    let mut linhas = Vec::new();
    for aba in nomes {
        let range = match workbook.worksheet_range(&aba) {
            Ok(range) => range,
            Err(e) => {
                warn!("Falha ao ler aba {}: {}", aba, e);
                continue;
            }
        };

        linhas.extend(linhas_de_ged(&aba, range.rows().skip(1)));
    }

    if linhas.is_empty() {
        bail!("A planilha de documentos GED está vazia");
    }

    info!("Dados carregados com sucesso. Linhas: {}", linhas.len());
    Ok(linhas)
}

/// Map positional cells of one tab to GED rows; the tab name becomes tipo_aba.
fn linhas_de_ged<'a>(aba: &str, rows: impl Iterator<Item = &'a [Data]>) -> Vec<LinhaGed> {
    let mut linhas = Vec::new();
    for row in rows {
        let linha = LinhaGed {
            unidade: texto_celula(row.first()),
            setor: texto_celula(row.get(1)),
            tipo_documento: texto_celula(row.get(2)),
            link: texto_celula(row.get(3)),
            tipo_aba: aba.to_string(),
        };
        if linha.unidade.is_empty() && linha.link.is_empty() {
            continue;
        }
        linhas.push(linha);
    }
    linhas
}

/// Number of populated header cells on the first sheet, used to tell the two
/// worksheet layouts apart.
pub fn contar_colunas(caminho: &Path) -> Result<usize> {
    let mut workbook: Xlsx<_> =
        open_workbook(caminho).with_context(|| format!("Falha ao abrir planilha {:?}", caminho))?;

    let nomes = workbook.sheet_names().to_vec();
    let primeira = nomes
        .first()
        .context("A planilha não possui nenhuma aba")?
        .clone();

    let range = workbook
        .worksheet_range(&primeira)
        .with_context(|| format!("Falha ao ler aba {}", primeira))?;

    let colunas = range
        .rows()
        .next()
        .map(|row| row.iter().filter(|c| !matches!(c, Data::Empty)).count())
        .unwrap_or(0);

    Ok(colunas)
}

/// Move the ingested file out of "capturados" into "processados".
pub fn mover_para_processados(settings: &Settings, caminho: &Path) -> Result<PathBuf> {
    mover_para(&settings.folders.folderprocessados, caminho)
}

/// Spreadsheets that fail ingestion go to their own folder, so bad inputs
/// never mix with the processed ones.
pub fn mover_para_erros(settings: &Settings, caminho: &Path) -> Result<PathBuf> {
    mover_para(&settings.folders.foldererroprocessar, caminho)
}

fn mover_para(pasta: &Path, caminho: &Path) -> Result<PathBuf> {
    fs::create_dir_all(pasta).with_context(|| format!("Falha ao criar pasta {:?}", pasta))?;

    let nome = caminho
        .file_name()
        .context("Caminho de planilha sem nome de arquivo")?;
    let destino = pasta.join(nome);

    fs::copy(caminho, &destino)
        .with_context(|| format!("Erro ao mover arquivo para {:?}: {:?}", pasta, caminho))?;
    fs::remove_file(caminho)
        .with_context(|| format!("Erro ao remover arquivo da pasta de processar: {:?}", caminho))?;

    info!("Arquivo movido para {:?}", destino);
    Ok(destino)
}

/// Render one cell as trimmed text. Numeric cells holding integers come back
/// without the trailing `.0` that Excel adds to them.
fn texto_celula(celula: Option<&Data>) -> String {
    match celula {
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Float(f)) if f.fract() == 0.0 => format!("{}", *f as i64),
        Some(Data::Int(i)) => i.to_string(),
        Some(Data::Empty) | None => String::new(),
        Some(outro) => outro.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn celula_numerica_sem_casas_decimais() {
        assert_eq!(texto_celula(Some(&Data::Float(28144326000101.0))), "28144326000101");
        assert_eq!(texto_celula(Some(&Data::Int(42))), "42");
    }

    #[test]
    fn celula_texto_preserva_zeros_a_esquerda() {
        assert_eq!(
            texto_celula(Some(&Data::String("01234567000189".to_string()))),
            "01234567000189"
        );
    }

    #[test]
    fn celula_vazia_vira_string_vazia() {
        assert_eq!(texto_celula(Some(&Data::Empty)), "");
        assert_eq!(texto_celula(None), "");
    }

    #[test]
    fn planilha_sem_linhas_uteis_fica_vazia() {
        let rows: Vec<Vec<Data>> = vec![
            vec![Data::Empty, Data::Empty, Data::Empty],
            vec![Data::String("   ".to_string()), Data::Empty, Data::Empty],
        ];

        let linhas = linhas_de_controle(rows.iter().map(Vec::as_slice));
        assert!(linhas.is_empty());
    }

    #[test]
    fn linhas_de_controle_mapeiam_colunas_posicionais() {
        let rows: Vec<Vec<Data>> = vec![
            vec![
                Data::String("28144326000101".to_string()),
                Data::String("17022025".to_string()),
                Data::String("24022025".to_string()),
            ],
            vec![Data::Empty, Data::Empty, Data::Empty],
        ];

        let linhas = linhas_de_controle(rows.iter().map(Vec::as_slice));
        assert_eq!(linhas.len(), 1);
        assert_eq!(linhas[0].cnpj, "28144326000101");
        assert_eq!(linhas[0].dataini, "17022025");
        assert_eq!(linhas[0].datafim, "24022025");
    }

    #[test]
    fn linhas_de_ged_carregam_o_nome_da_aba() {
        let rows: Vec<Vec<Data>> = vec![
            vec![
                Data::String("Matriz".to_string()),
                Data::String("Fiscal".to_string()),
                Data::String("Nota".to_string()),
                Data::String("https://empresa.sharepoint.com/sites/GED".to_string()),
            ],
            vec![Data::Empty, Data::Empty, Data::Empty, Data::Empty],
        ];

        let linhas = linhas_de_ged("UNIDADE", rows.iter().map(Vec::as_slice));
        assert_eq!(linhas.len(), 1);
        assert_eq!(linhas[0].unidade, "Matriz");
        assert_eq!(linhas[0].tipo_aba, "UNIDADE");
    }

    #[test]
    fn mover_para_cria_pasta_e_remove_origem() {
        let base = std::env::temp_dir().join(format!("comprot-planilha-{}", std::process::id()));
        let origem_dir = base.join("capturados");
        fs::create_dir_all(&origem_dir).unwrap();

        let origem = origem_dir.join("planilha.xlsx");
        fs::write(&origem, b"conteudo").unwrap();

        let destino = mover_para(&base.join("erros"), &origem).unwrap();
        assert!(destino.exists());
        assert!(!origem.exists());

        fs::remove_dir_all(&base).unwrap();
    }
}
