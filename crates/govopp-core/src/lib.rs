//! Core domain model and text normalization for GovOpp.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "govopp-core";

pub const DEFAULT_AMOUNT: &str = "Not specified";
pub const DEFAULT_DEADLINE: &str = "Check Portal";

/// Discriminator selecting the collection a record is persisted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityKind {
    Scholarship,
    Job,
}

impl OpportunityKind {
    pub const ALL: [OpportunityKind; 2] = [OpportunityKind::Scholarship, OpportunityKind::Job];

    pub fn collection(self) -> &'static str {
        match self {
            OpportunityKind::Scholarship => "scholarships",
            OpportunityKind::Job => "jobs",
        }
    }
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityKind::Scholarship => f.write_str("scholarship"),
            OpportunityKind::Job => f.write_str("job"),
        }
    }
}

/// A scholarship or job entry extracted from a source page.
///
/// `id` is derived from `name` at construction and doubles as the durable
/// storage key, so records are built once and never edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub id: String,
    pub name: String,
    pub category: String,
    pub amount: String,
    pub deadline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_date: Option<String>,
    pub description: String,
    pub source_url: String,
    pub kind: OpportunityKind,
}

impl OpportunityRecord {
    pub fn new(
        kind: OpportunityKind,
        name: impl Into<String>,
        category: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id: slugify(&name),
            name,
            category: category.into(),
            amount: DEFAULT_AMOUNT.to_string(),
            deadline: DEFAULT_DEADLINE.to_string(),
            open_date: None,
            description: String::new(),
            source_url: source_url.into(),
            kind,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = amount.into();
        self
    }

    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = deadline.into();
        self
    }

    pub fn with_open_date(mut self, open_date: Option<String>) -> Self {
        self.open_date = open_date;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// True when the id came from [`fallback_id`] and will never match a stored document.
    pub fn has_unstable_id(&self) -> bool {
        self.name.trim().is_empty()
    }
}

/// Collapse whitespace runs to a single space and trim the ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identifier-safe token for a display name.
///
/// Non-empty input always maps to the same slug. Empty input gets a
/// time-and-random placeholder from [`fallback_id`] instead.
pub fn slugify(text: &str) -> String {
    if text.trim().is_empty() {
        return fallback_id();
    }

    let mut spaced = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => spaced.push_str("and"),
            '-' => spaced.push(' '),
            c if c.is_whitespace() => spaced.push(' '),
            c if c.is_ascii_alphanumeric() => spaced.push(c.to_ascii_lowercase()),
            c => {
                // * + ~ . ( ) ' " ! : @ and every other symbol are dropped
                if let Some(folded) = fold_latin(c) {
                    spaced.push_str(folded);
                }
            }
        }
    }

    spaced.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Lowercase ASCII spelling of a Latin letter with a diacritic.
fn fold_latin(ch: char) -> Option<&'static str> {
    let folded = match ch.to_lowercase().next()? {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

/// `scheme-<unix millis>-<random token>`; unique per call, never stable.
pub fn fallback_id() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("scheme-{}-{}", Utc::now().timestamp_millis(), &token[..5])
}
