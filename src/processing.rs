//! The per-tick resolution step.
//!
//! [`ProcessingController::process`] looks at the documents parsed since the
//! last tick and decides, per item, whether to play an inline ad, follow a
//! wrapper, or give up. It holds no state of its own; the caller owns the
//! result queue and redirect history and applies the returned decisions.

use crate::item::{Candidate, Group, Item};
use crate::models::{Document, Inline};
use crate::scheduled::ScheduledItems;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// How far past its time budget the active pod is
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum TimeoutKind {
    #[default]
    None,
    Soft,
    Hard,
}

/// The latest successfully parsed document for an item
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ParsingResult {
    pub document: Document,
}

impl ParsingResult {
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

/// Parsed documents waiting to be processed, keyed by item
pub type ResultQueue = BTreeMap<Item, ParsingResult>;

/// An outbound decision for one item
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum Decision {
    /// Play this inline ad (terminal)
    SelectInline { item: Item, inline: Inline },

    /// Fetch `url` and feed the result back under the same item
    UnwrapItem { item: Item, url: Url },

    /// Give up waiting for the item (terminal)
    Timeout { item: Item },

    /// The wrapper chain is too long (terminal)
    TooManyIndirections { item: Item },
}

impl Decision {
    pub fn item(&self) -> &Item {
        match self {
            Decision::SelectInline { item, .. }
            | Decision::UnwrapItem { item, .. }
            | Decision::Timeout { item }
            | Decision::TooManyIndirections { item } => item,
        }
    }

    /// Whether the item is finished once this decision is applied
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::UnwrapItem { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessingController {
    max_redirect_count: usize,
}

impl ProcessingController {
    pub fn new(max_redirect_count: usize) -> Self {
        Self { max_redirect_count }
    }

    /// Run one resolution tick.
    ///
    /// Members of `current_group` are visited first in pod order, then any
    /// queued item outside the group. Queued items outside the group are
    /// stale leftovers of an earlier pod and always time out.
    ///
    /// Nothing is deduplicated: calling twice with the same input returns the
    /// same decisions.
    pub fn process(
        &self,
        queue: &ResultQueue,
        scheduled: &ScheduledItems,
        current_group: Option<&Group>,
        timeout: TimeoutKind,
        is_max_ad_search_timeout_reached: bool,
    ) -> Vec<Decision> {
        if is_max_ad_search_timeout_reached {
            return Vec::new();
        }

        let mut decisions = Vec::new();

        if let Some(group) = current_group {
            let pod_has_inline = group.items().iter().any(|item| has_inline(queue, item));

            for item in group.items() {
                match queue.get(item) {
                    Some(_) if timeout == TimeoutKind::Hard => {
                        decisions.push(Decision::Timeout { item: item.clone() });
                    }
                    Some(result) => decisions.push(self.decide(item, result, scheduled)),
                    None => {
                        let timed_out = match timeout {
                            TimeoutKind::Hard => true,
                            TimeoutKind::Soft => pod_has_inline,
                            TimeoutKind::None => false,
                        };
                        if timed_out {
                            decisions.push(Decision::Timeout { item: item.clone() });
                        }
                    }
                }
            }
        }

        for item in queue.keys() {
            if current_group.is_none_or(|group| !group.contains(item)) {
                decisions.push(Decision::Timeout { item: item.clone() });
            }
        }

        decisions
    }

    fn decide(&self, item: &Item, result: &ParsingResult, scheduled: &ScheduledItems) -> Decision {
        match &result.document {
            Document::Inline(inline) => Decision::SelectInline {
                item: item.clone(),
                inline: inline.clone(),
            },
            Document::Wrapper(wrapper) => {
                let candidate = Candidate::from(wrapper.tag_url.clone());
                let mut redirects = scheduled.recorded_count(item);
                if !scheduled.contains(item, &candidate) {
                    redirects += 1;
                }

                if redirects >= self.max_redirect_count {
                    Decision::TooManyIndirections { item: item.clone() }
                } else {
                    Decision::UnwrapItem {
                        item: item.clone(),
                        url: wrapper.tag_url.clone(),
                    }
                }
            }
        }
    }
}

fn has_inline(queue: &ResultQueue, item: &Item) -> bool {
    matches!(queue.get(item), Some(ParsingResult { document: Document::Inline(_) }))
}
