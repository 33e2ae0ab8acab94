// Integration tests for the COMPROT client and the parsing/formatting helpers.
// Network and WebDriver flows need live services, so these cover the logic
// the pipeline builds on.

use comprot_cli::comprot::{montar_url, ProcessoComprot, RespostaComprot};
use comprot_cli::util::{
    data_para_timestamp_ms, formatar_cnpj, parse_data_ddmmyyyy, parse_data_iso, slug_de_link,
    somente_digitos, total_paginas,
};

#[test]
fn test_payload_completo() {
    let corpo = r#"{
        "totalDeProcessosEncontrados": 2,
        "processos": [
            {
                "numeroProcesso": "10980720123202411",
                "documento": "28144326000101",
                "nomeInteressado": "EMPRESA EXEMPLO LTDA",
                "dataProtocolo": "2024-08-12",
                "situacao": "ATIVO",
                "uf": "PR",
                "orgaoOrigem": "DRF CURITIBA",
                "orgaoDestino": "DRJ SAO PAULO",
                "sequencia": 1,
                "relacao": 0,
                "numeroProcessoPrincipal": "10980720123202411"
            },
            {
                "numeroProcesso": "10980720456202499",
                "nomeInteressado": "EMPRESA EXEMPLO LTDA",
                "situacao": "ARQUIVADO",
                "numeroProcessoPrincipal": "10980720456202499"
            }
        ]
    }"#;

    let resposta: RespostaComprot = serde_json::from_str(corpo).unwrap();
    assert_eq!(resposta.total_de_processos_encontrados, 2);
    assert_eq!(resposta.processos.len(), 2);

    let primeiro = &resposta.processos[0];
    assert_eq!(primeiro.numero_processo, "10980720123202411");
    assert_eq!(primeiro.orgao_origem.as_deref(), Some("DRF CURITIBA"));
    assert_eq!(primeiro.sequencia, Some(1));

    let segundo = &resposta.processos[1];
    assert!(segundo.documento.is_none());
    assert!(segundo.orgao_destino.is_none());
}

#[test]
fn test_cursor_vem_do_ultimo_processo_da_pagina() {
    let resposta = RespostaComprot {
        total_de_processos_encontrados: 61,
        processos: vec![
            ProcessoComprot {
                numero_processo: "111".to_string(),
                numero_processo_principal: Some("111".to_string()),
                ..Default::default()
            },
            ProcessoComprot {
                numero_processo: "222".to_string(),
                numero_processo_principal: Some("222".to_string()),
                ..Default::default()
            },
        ],
    };

    // 61 processes at 30 per page means 3 pages
    assert_eq!(total_paginas(resposta.total_de_processos_encontrados), 3);

    let cursor = resposta
        .processos
        .last()
        .and_then(|p| p.numero_processo_principal.clone());
    assert_eq!(cursor.as_deref(), Some("222"));
}

#[test]
fn test_url_de_consulta_completa() {
    let cnpj = somente_digitos("28.144.326/0001-01");
    let mascara = formatar_cnpj(&cnpj).unwrap();

    let data_de = parse_data_ddmmyyyy("12082024").unwrap();
    let data_ate = parse_data_iso("2024-08-19").unwrap();

    let url = montar_url(
        "https://comprot.fazenda.gov.br/comprotegov/api/processo",
        &cnpj,
        &mascara,
        data_para_timestamp_ms(data_de),
        data_para_timestamp_ms(data_ate),
        None,
        1_724_100_000_000,
    );

    assert!(url.starts_with("https://comprot.fazenda.gov.br/comprotegov/api/processo?"));
    assert!(url.contains("cpfCnpj=28144326000101"));
    assert!(url.contains("cpfCnpjComMascara=28.144.326%2F0001-01"));
    assert!(url.contains("dataInicial=1723420800000"));
    assert!(url.contains("nomeInteressado=&"));
}

#[test]
fn test_fluxo_de_datas_da_planilha_ate_o_controle() {
    // Spreadsheet cells arrive as DDMMYYYY; the control table stores ISO text
    let dataini = parse_data_ddmmyyyy("17022025").unwrap().to_string();
    let datafim = parse_data_ddmmyyyy("24022025").unwrap().to_string();

    assert_eq!(dataini, "2025-02-17");
    assert_eq!(datafim, "2025-02-24");

    // And the poller reads them back for the API timestamps
    let dt = parse_data_iso(&dataini).unwrap();
    assert!(data_para_timestamp_ms(dt) > 0);
}

#[test]
fn test_slug_para_pasta_de_download() {
    let link = "https://empresa.sharepoint.com/sites/GED/Forms/AllItems.aspx?id=%2Fsites%2FGED";
    let slug = slug_de_link(link);

    assert!(slug.len() <= 100);
    assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    assert!(!slug.starts_with('-'));
    assert!(!slug.ends_with('-'));
    assert!(slug.starts_with("empresa-sharepoint-com"));
}

#[test]
fn test_mascara_de_cnpj_rejeita_lixo() {
    assert!(formatar_cnpj("123").is_err());
    assert!(formatar_cnpj("abcdefghijklmn").is_err());
    assert_eq!(
        formatar_cnpj("01234567000189").unwrap(),
        "01.234.567/0001-89"
    );
}
