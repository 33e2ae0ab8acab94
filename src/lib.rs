pub mod arquivos;
pub mod browser;
pub mod comprot;
pub mod config;
pub mod db;
pub mod ingestao;
pub mod planilha;
pub mod qualis;
pub mod sharepoint;
pub mod util;
