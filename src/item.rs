use crate::error::{Result, VastError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Where an item's VAST document comes from
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum Source {
    /// The document text itself
    Vast(String),

    /// A URL the document has to be fetched from
    Url(Url),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Vast(xml) => write!(f, "inline VAST ({} bytes)", xml.len()),
            Source::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Ad-server metadata describing where an item came from
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Default)]
pub struct MetaInfo {
    pub engine_type: Option<String>,
    pub rule_id: Option<String>,
    pub rule_company_id: Option<String>,
    pub vendor: Option<String>,
    pub name: Option<String>,
    pub cpm: Option<String>,
}

/// One ad slot being resolved.
///
/// Items compare by value: two items with the same source and metadata are the
/// same item.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Item {
    pub source: Source,
    pub meta_info: MetaInfo,
}

impl Item {
    pub fn new(source: Source, meta_info: MetaInfo) -> Self {
        Self { source, meta_info }
    }
}

/// An ad pod: items resolved together, in the order the ad server sent them
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Group {
    items: Vec<Item>,
}

impl Group {
    pub fn new(items: Vec<Item>) -> Result<Self> {
        if items.is_empty() {
            return Err(VastError::EmptyGroup);
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn contains(&self, item: &Item) -> bool {
        self.items.contains(item)
    }
}

/// A redirect target already requested for an item
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
pub struct Candidate {
    pub source: Source,
}

impl Candidate {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

impl From<Url> for Candidate {
    fn from(url: Url) -> Self {
        Candidate::new(Source::Url(url))
    }
}
