//! Keyword-based detection of sensitive ("critical") columns.
//!
//! Classification looks only at column names: a column is critical when its
//! lowercased name contains any lexicon keyword as a substring.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::yaml_provider;

const DEFAULT_KEYWORDS: &[&str] = &[
    // identifiers
    "customer",
    "client",
    "account",
    "acct",
    "iban",
    "swift",
    "routing",
    "sort_code",
    "ssn",
    "social_security",
    "national_id",
    "passport",
    "tax_id",
    "member",
    "user_id",
    // transactions
    "transaction",
    "txn",
    "transfer",
    "payment",
    "deposit",
    "withdrawal",
    "debit",
    "credit",
    "amount",
    "merchant",
    "beneficiary",
    "remittance",
    // balances
    "balance",
    "ledger",
    "overdraft",
    "interest",
    "principal",
    "salary",
    "income",
    "fee",
    // loans
    "loan",
    "mortgage",
    "installment",
    "instalment",
    "tenure",
    "collateral",
    "default",
    "arrears",
    "repayment",
    "outstanding",
    "delinquen",
    // cards
    "card",
    "cvv",
    "expiry",
    "issuer",
    "limit",
    // compliance
    "kyc",
    "aml",
    "sanction",
    "fraud",
    "risk",
    "flag",
    "suspicious",
    "alert",
    "compliance",
    "audit",
    "score",
    "blacklist",
    "watchlist",
    // geography
    "country",
    "branch",
    "region",
    "city",
    "address",
    "zip",
    "postal",
    "province",
];

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Keyword lexicon file {path}: {message}")]
    Load { path: String, message: String },
    #[error("Keyword lexicon contains an empty keyword at position {0}")]
    EmptyKeyword(usize),
    #[error("Keyword lexicon is empty")]
    NoKeywords,
}

#[derive(Debug, Serialize, Deserialize)]
struct LexiconFile {
    keywords: Vec<String>,
}

/// Lowercased keyword list; order only affects how early a match is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    keywords: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Lexicon {
    pub fn new<I, S>(keywords: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for (idx, keyword) in keywords.into_iter().enumerate() {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if keyword.is_empty() {
                return Err(LexiconError::EmptyKeyword(idx));
            }
            if !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        if normalized.is_empty() {
            return Err(LexiconError::NoKeywords);
        }
        Ok(Self {
            keywords: normalized,
        })
    }

    /// Reads a YAML document of the form `keywords: [balance, loan, ...]`.
    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let file: LexiconFile =
            yaml_provider::load_from_path(path).map_err(|err| LexiconError::Load {
                path: path.display().to_string(),
                message: format!("{err:#}"),
            })?;
        Self::new(file.keywords)
    }

    pub fn save(&self, path: &Path) -> Result<(), LexiconError> {
        let file = LexiconFile {
            keywords: self.keywords.clone(),
        };
        yaml_provider::save_to_path(path, &file).map_err(|err| LexiconError::Load {
            path: path.display().to_string(),
            message: format!("{err:#}"),
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// First keyword contained in `column`, case-insensitively.
    pub fn first_match(&self, column: &str) -> Option<&str> {
        let lowered = column.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| lowered.contains(keyword.as_str()))
            .map(String::as_str)
    }
}

/// Critical column names in dataset order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CriticalColumnSet {
    columns: Vec<String>,
}

impl CriticalColumnSet {
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub fn identify_critical_columns<S: AsRef<str>>(columns: &[S], lexicon: &Lexicon) -> CriticalColumnSet {
    let columns = columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| lexicon.first_match(c).is_some())
        .map(str::to_string)
        .collect();
    CriticalColumnSet { columns }
}
