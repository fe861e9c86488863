use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

/// Lifecycle status of the active document, derived from the analysis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Analyzing,
    Analyzed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Failed => "failed",
        }
    }
}

/// A contract under audit. Content is immutable; switching documents means
/// replacing the value, never editing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    id: String,
    pub name: String,
    pub parties: Vec<String>,
    pub value: String,
    pub jurisdiction: String,
    pub expiry_date: String,
    content: String,
}

impl ContractDocument {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parties: Vec::new(),
            value: String::new(),
            jurisdiction: String::new(),
            expiry_date: String::new(),
            content: content.into(),
        }
    }

    /// Build a document skeleton from uploaded text, with placeholder metadata
    /// until extraction fills in the real values.
    pub fn ingest(name: &str, content: String) -> Result<Self, IngestError> {
        if content.trim().is_empty() {
            return Err(IngestError::Empty);
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            parties: vec![
                "Contracting Party A".to_string(),
                "Contracting Party B".to_string(),
            ],
            value: "Not extracted".to_string(),
            jurisdiction: "Not extracted".to_string(),
            expiry_date: "TBD".to_string(),
            content,
        })
    }

    /// Ingest a UTF-8 text file. Binary formats (PDF, DOCX) are not parsed.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let bytes = std::fs::read(path).map_err(|e| IngestError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let content = String::from_utf8(bytes).map_err(|_| IngestError::NotText {
            path: path.to_path_buf(),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self::ingest(&name, content)
    }

    /// Built-in demonstration contract.
    pub fn sample() -> Self {
        Self {
            id: "sample-techflow-2026".to_string(),
            name: "Contrato Social - TechFlow Solutions 2026.pdf".to_string(),
            parties: vec![
                "TechFlow Solutions Ltda".to_string(),
                "Global Logistics SA".to_string(),
            ],
            value: "R$ 2.450.000,00".to_string(),
            jurisdiction: "Comarca de São Paulo/SP".to_string(),
            expiry_date: "20 de Julho de 2028".to_string(),
            content: SAMPLE_CONTRACT.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

const SAMPLE_CONTRACT: &str = "CONTRATO DE PRESTAÇÃO DE SERVIÇOS DE TECNOLOGIA AVANÇADA

CLÁUSULA 1 - OBJETO
A TechFlow Solutions Ltda, inscrita no CNPJ 12.345.678/0001-99, doravante denominada CONTRATADA, compromete-se a fornecer infraestrutura de IA para a Global Logistics SA, CNPJ 98.765.432/0001-11.

CLÁUSULA 4.2 - DA MULTA RESCISÓRIA
Fica estabelecido que, em caso de rescisão antecipada por qualquer das partes sem aviso prévio de 360 dias, a parte infratora pagará multa de 100% do valor total do contrato imediatamente em parcela única.

CLÁUSULA 8 - PROTEÇÃO DE DADOS
As partes declaram estar em conformidade com a LGPD. O tratamento de dados pessoais de funcionários será realizado exclusivamente para fins contratuais e arquivamento legal.

CLÁUSULA 12 - DO FORO
Para dirimir quaisquer controvérsias oriundas deste pacto, as partes elegem o foro da Comarca de Miami, Flórida, EUA, com renúncia expressa a qualquer outro por mais privilegiado que seja.

São Paulo, 10 de Janeiro de 2024.
";
