use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};

/// Keep only ASCII digits from a raw cell value.
pub fn somente_digitos(valor: &str) -> String {
    valor.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a 14-digit CNPJ as `NN.NNN.NNN/NNNN-NN`.
pub fn formatar_cnpj(cnpj: &str) -> Result<String> {
    let digitos = somente_digitos(cnpj);
    if digitos.len() != 14 {
        bail!(
            "CNPJ inválido: esperado 14 dígitos, obtido {} ({})",
            digitos.len(),
            cnpj
        );
    }
    Ok(format!(
        "{}.{}.{}/{}-{}",
        &digitos[0..2],
        &digitos[2..5],
        &digitos[5..8],
        &digitos[8..12],
        &digitos[12..14]
    ))
}

/// Parse a spreadsheet date cell in DDMMYYYY form (non-digits stripped first).
pub fn parse_data_ddmmyyyy(valor: &str) -> Result<NaiveDate> {
    let digitos = somente_digitos(valor);
    if digitos.len() != 8 {
        bail!(
            "Formato de data inválido: esperado DDMMYYYY, obtido '{}'",
            valor
        );
    }
    NaiveDate::parse_from_str(&digitos, "%d%m%Y")
        .map_err(|e| anyhow::anyhow!("Erro ao converter data '{}': {}", valor, e))
}

/// Parse a control-table date stored as YYYY-MM-DD.
pub fn parse_data_iso(valor: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(valor, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Data ISO inválida '{}': {}", valor, e))
}

/// Midnight of the given date as epoch milliseconds, as the COMPROT API expects.
pub fn data_para_timestamp_ms(data: NaiveDate) -> i64 {
    data.and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

/// Current instant as epoch milliseconds (cache-buster parameter of the API).
pub fn agora_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Each COMPROT result page carries at most 30 processes.
pub const PROCESSOS_POR_PAGINA: u32 = 30;

pub fn total_paginas(total_processos: u32) -> u32 {
    total_processos.div_ceil(PROCESSOS_POR_PAGINA)
}

/// Turn a SharePoint link into a folder-safe slug (max 100 chars).
pub fn slug_de_link(link: &str) -> String {
    let sem_esquema = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))
        .unwrap_or(link);

    let mut slug = String::with_capacity(sem_esquema.len());
    for ch in sem_esquema.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    slug.trim_matches('-').chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formata_cnpj_com_mascara() {
        assert_eq!(
            formatar_cnpj("28144326000101").unwrap(),
            "28.144.326/0001-01"
        );
        // Masked input is normalized before re-masking
        assert_eq!(
            formatar_cnpj("28.144.326/0001-01").unwrap(),
            "28.144.326/0001-01"
        );
    }

    #[test]
    fn rejeita_cnpj_curto() {
        assert!(formatar_cnpj("1234").is_err());
        assert!(formatar_cnpj("").is_err());
    }

    #[test]
    fn converte_ddmmyyyy() {
        let data = parse_data_ddmmyyyy("17022025").unwrap();
        assert_eq!(data.to_string(), "2025-02-17");

        // Excel sometimes keeps separators in text cells
        let data = parse_data_ddmmyyyy("24/02/2025").unwrap();
        assert_eq!(data.to_string(), "2025-02-24");
    }

    #[test]
    fn rejeita_data_invalida() {
        assert!(parse_data_ddmmyyyy("2025-02-17x").is_err());
        assert!(parse_data_ddmmyyyy("99999999").is_err());
    }

    #[test]
    fn paginacao_de_30_em_30() {
        assert_eq!(total_paginas(0), 0);
        assert_eq!(total_paginas(1), 1);
        assert_eq!(total_paginas(30), 1);
        assert_eq!(total_paginas(31), 2);
        assert_eq!(total_paginas(90), 3);
        assert_eq!(total_paginas(91), 4);
    }

    #[test]
    fn slug_remove_esquema_e_simbolos() {
        let slug = slug_de_link("https://empresa.sharepoint.com/sites/GED/Documentos%20Fiscais");
        assert_eq!(slug, "empresa-sharepoint-com-sites-ged-documentos-20fiscais");
        assert!(!slug.contains("--"));
    }

    #[test]
    fn slug_limita_100_caracteres() {
        let link = format!("https://{}", "a".repeat(300));
        assert_eq!(slug_de_link(&link).len(), 100);
    }

    #[test]
    fn timestamp_de_meia_noite() {
        let data = NaiveDate::from_ymd_opt(2024, 8, 12).unwrap();
        assert_eq!(data_para_timestamp_ms(data), 1_723_420_800_000);
    }
}
