//! Data models for NFe extraction.

pub mod config;
pub mod document;

pub use config::NfeConfig;
pub use document::{
    AccessKey, AccessKeyComponents, Cnpj, Cpf, DocumentKind, ExtractionResponse,
    ExtractionResult,
};
