use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::ZipArchive;

/// Extract one archive into the destination folder.
pub fn extrair_zip(caminho_zip: &Path, destino: &Path) -> Result<()> {
    if !caminho_zip.is_file() {
        bail!("Arquivo ZIP não encontrado: {:?}", caminho_zip);
    }

    fs::create_dir_all(destino)
        .with_context(|| format!("Falha ao criar pasta de destino {:?}", destino))?;

    let arquivo = File::open(caminho_zip)
        .with_context(|| format!("Falha ao abrir {:?}", caminho_zip))?;
    let mut archive = ZipArchive::new(arquivo)
        .with_context(|| format!("O arquivo não é um ZIP válido: {:?}", caminho_zip))?;

    archive
        .extract(destino)
        .with_context(|| format!("Erro ao extrair {:?}", caminho_zip))?;

    info!("Arquivo {:?} extraído para {:?}", caminho_zip, destino);
    Ok(())
}

/// Extract every `.zip` directly inside the folder into the folder itself,
/// deleting each archive after a successful extraction.
pub fn extrair_zips_em_pasta(pasta: &Path) -> Vec<(PathBuf, bool)> {
    let mut resultados = Vec::new();

    if !pasta.is_dir() {
        warn!("Pasta não encontrada: {:?}", pasta);
        return resultados;
    }

    let entradas = match fs::read_dir(pasta) {
        Ok(entradas) => entradas,
        Err(e) => {
            warn!("Erro ao percorrer pasta {:?}: {}", pasta, e);
            return resultados;
        }
    };

    for entrada in entradas.flatten() {
        let caminho = entrada.path();
        let eh_zip = caminho.is_file()
            && caminho
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("zip"))
                .unwrap_or(false);
        if !eh_zip {
            continue;
        }

        let sucesso = match extrair_zip(&caminho, pasta) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&caminho) {
                    warn!("Erro ao remover ZIP {:?}: {}", caminho, e);
                } else {
                    info!("ZIP removido após extração: {:?}", caminho);
                }
                true
            }
            Err(e) => {
                warn!("Erro ao extrair {:?}: {:#}", caminho, e);
                false
            }
        };
        resultados.push((caminho, sucesso));
    }

    resultados
}

/// Remove stray `.json` snapshots from the temp folder before a polling run.
pub fn limpar_jsons(pasta: &Path) -> Result<()> {
    if !pasta.is_dir() {
        return Ok(());
    }

    for entrada in fs::read_dir(pasta).context("Falha ao listar pasta temp")? {
        let caminho = entrada?.path();
        if caminho.extension().and_then(|e| e.to_str()) == Some("json") {
            fs::remove_file(&caminho)
                .with_context(|| format!("Falha ao remover {:?}", caminho))?;
            info!("Arquivo {:?} removido", caminho);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extrai_e_remove_zip() {
        let dir = std::env::temp_dir().join(format!("comprot-zip-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let caminho_zip = dir.join("anexos.zip");
        {
            let arquivo = File::create(&caminho_zip).unwrap();
            let mut escritor = zip::ZipWriter::new(arquivo);
            escritor
                .start_file("processo.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            escritor.write_all(b"conteudo do processo").unwrap();
            escritor.finish().unwrap();
        }

        let resultados = extrair_zips_em_pasta(&dir);
        assert_eq!(resultados.len(), 1);
        assert!(resultados[0].1);
        assert!(dir.join("processo.txt").exists());
        assert!(!caminho_zip.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn zip_invalido_reporta_falha() {
        let dir = std::env::temp_dir().join(format!("comprot-zip-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let caminho = dir.join("quebrado.zip");
        fs::write(&caminho, b"isso nao e um zip").unwrap();

        let resultados = extrair_zips_em_pasta(&dir);
        assert_eq!(resultados.len(), 1);
        assert!(!resultados[0].1);
        // Failed archives are kept for inspection
        assert!(caminho.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn limpa_somente_jsons() {
        let dir = std::env::temp_dir().join(format!("comprot-temp-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.json"), b"{}").unwrap();
        fs::write(dir.join("b.txt"), b"fica").unwrap();

        limpar_jsons(&dir).unwrap();

        assert!(!dir.join("a.json").exists());
        assert!(dir.join("b.txt").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
