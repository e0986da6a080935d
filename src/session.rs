use crate::item::{Candidate, Group, Item};
use crate::models::{Document, Inline, Wrapper};
use crate::processing::{Decision, ParsingResult, ProcessingController, ResultQueue, TimeoutKind};
use crate::scheduled::ScheduledItems;
use crate::stitcher::stitch_inline;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

/// Driver state threaded through successive resolution ticks.
///
/// The session owns the result queue and redirect history, runs the
/// [`ProcessingController`] on every tick and applies its decisions. Each item
/// receives at most one terminal decision per pod.
#[derive(Debug)]
pub struct VrmSession {
    controller: ProcessingController,
    queue: ResultQueue,
    scheduled: ScheduledItems,
    current_group: Option<Group>,
    finished: HashSet<Item>,
    wrappers: HashMap<Item, Vec<Wrapper>>,
}

impl VrmSession {
    pub fn new(max_redirect_count: usize) -> Self {
        Self {
            controller: ProcessingController::new(max_redirect_count),
            queue: ResultQueue::new(),
            scheduled: ScheduledItems::new(),
            current_group: None,
            finished: HashSet::new(),
            wrappers: HashMap::new(),
        }
    }

    /// Make `group` the active pod.
    ///
    /// State of finished items is dropped. Unfinished items of the previous
    /// pod stay queued and time out on the next tick.
    pub fn start_group(&mut self, group: Group) {
        for item in self.finished.drain() {
            self.queue.remove(&item);
            self.scheduled.remove(&item);
            self.wrappers.remove(&item);
        }
        debug!("Starting ad group with {} items", group.items().len());
        self.current_group = Some(group);
    }

    /// Queue a freshly parsed document for `item`. Returns false if the item
    /// already has its terminal decision.
    pub fn push_result(&mut self, item: Item, document: Document) -> bool {
        if self.finished.contains(&item) {
            debug!("Ignoring result for finished item {}", item.source);
            return false;
        }
        self.queue.insert(item, ParsingResult::new(document));
        true
    }

    /// Mark `item` as finished without a decision, e.g. after a failed fetch.
    /// Returns false if it was already finished.
    pub fn fail(&mut self, item: &Item) -> bool {
        self.queue.remove(item);
        self.finished.insert(item.clone())
    }

    /// Run one resolution tick and apply the resulting decisions.
    ///
    /// Only decisions for items that were not finished before are returned,
    /// in the order the controller produced them.
    pub fn tick(&mut self, timeout: TimeoutKind, is_max_ad_search_timeout_reached: bool) -> Vec<Decision> {
        let decisions = self.controller.process(
            &self.queue,
            &self.scheduled,
            self.current_group.as_ref(),
            timeout,
            is_max_ad_search_timeout_reached,
        );

        let mut handled = HashSet::new();
        let mut applied = Vec::new();

        for decision in decisions {
            if self.finished.contains(decision.item()) || !handled.insert(decision.item().clone()) {
                continue;
            }
            self.apply(&decision);
            applied.push(decision);
        }

        applied
    }

    fn apply(&mut self, decision: &Decision) {
        match decision {
            Decision::SelectInline { item, .. } => {
                info!("Selected inline ad for {}", item.source);
                // The result stays queued so pod members can see that an ad was found
                self.finished.insert(item.clone());
            }
            Decision::UnwrapItem { item, url } => {
                debug!("Unwrapping {} to {}", item.source, url);
                if let Some(ParsingResult {
                    document: Document::Wrapper(wrapper),
                }) = self.queue.remove(item)
                {
                    self.wrappers.entry(item.clone()).or_default().push(wrapper);
                }
                if !self.scheduled.record(item, Candidate::from(url.clone())) {
                    warn!("{} redirects to {} again", item.source, url);
                }
            }
            Decision::Timeout { item } => {
                info!("Timed out waiting for {}", item.source);
                self.queue.remove(item);
                self.finished.insert(item.clone());
            }
            Decision::TooManyIndirections { item } => {
                info!("Too many wrapper indirections for {}", item.source);
                self.queue.remove(item);
                self.finished.insert(item.clone());
            }
        }
    }

    /// Wrappers `item` passed through, outermost first
    pub fn wrapper_chain(&self, item: &Item) -> &[Wrapper] {
        self.wrappers.get(item).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `inline` with the tracking of `item`'s wrapper chain merged in
    pub fn stitched(&self, item: &Item, inline: Inline) -> Inline {
        stitch_inline(inline, self.wrapper_chain(item))
    }

    pub fn redirect_count(&self, item: &Item) -> usize {
        self.scheduled.recorded_count(item)
    }

    pub fn is_item_finished(&self, item: &Item) -> bool {
        self.finished.contains(item)
    }

    /// Items of the active pod still waiting for a terminal decision
    pub fn pending_items(&self) -> Vec<Item> {
        self.current_group
            .iter()
            .flat_map(|group| group.items())
            .filter(|item| !self.finished.contains(*item))
            .cloned()
            .collect()
    }

    /// Whether every tracked item has its terminal decision
    pub fn is_finished(&self) -> bool {
        self.pending_items().is_empty() && self.queue.keys().all(|item| self.finished.contains(item))
    }

    /// Finish every pending item of the active pod and return them
    pub fn abandon_pending(&mut self) -> Vec<Item> {
        let pending = self.pending_items();
        for item in &pending {
            self.fail(item);
        }
        pending
    }
}
