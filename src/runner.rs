use crate::config::ResolverConfig;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::item::{Group, Item, Source};
use crate::models::Inline;
use crate::parser::parse_vast;
use crate::processing::Decision;
use crate::provider::parse_pod_response;
use crate::session::VrmSession;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use url::Url;

/// Why an item produced no ad
#[derive(Debug, Serialize, PartialEq, Clone)]
pub enum FailureReason {
    Timeout,
    TooManyIndirections,
    AdSearchTimeout,
    Fetch(String),
    Parse(String),
}

/// The final result for one item of a pod
#[derive(Debug, Serialize, PartialEq, Clone)]
pub enum Outcome {
    /// An inline ad with the tracking of its wrapper chain merged in
    Selected { item: Item, inline: Inline },
    Failed { item: Item, reason: FailureReason },
}

impl Outcome {
    pub fn item(&self) -> &Item {
        match self {
            Outcome::Selected { item, .. } | Outcome::Failed { item, .. } => item,
        }
    }
}

type FetchResult = (Item, Result<String>);

/// Resolve every item of `group` to an inline ad or a failure.
///
/// Inline VAST sources are parsed right away, URL sources and wrapper
/// redirects are fetched concurrently. The session is ticked after every
/// fetch and at every timeout boundary. Outcomes are returned in the order
/// they were reached.
pub async fn resolve_group<F: Fetcher>(fetcher: Arc<F>, group: Group, config: &ResolverConfig) -> Vec<Outcome> {
    let started = Instant::now();
    let mut session = VrmSession::new(config.max_redirect_count);
    let mut outcomes = Vec::new();
    let mut in_flight: JoinSet<FetchResult> = JoinSet::new();

    session.start_group(group.clone());

    for item in group.items() {
        match &item.source {
            Source::Vast(xml) => ingest(&mut session, &mut outcomes, item.clone(), Ok(xml.clone())),
            Source::Url(url) => spawn_fetch(&mut in_flight, &fetcher, item.clone(), url.clone()),
        }
    }

    loop {
        let elapsed = started.elapsed();
        let deadline_reached = config.deadline_reached(elapsed);

        for decision in session.tick(config.timeout_kind(elapsed), deadline_reached) {
            match decision {
                Decision::SelectInline { item, inline } => {
                    let inline = session.stitched(&item, inline);
                    outcomes.push(Outcome::Selected { item, inline });
                }
                Decision::UnwrapItem { item, url } => spawn_fetch(&mut in_flight, &fetcher, item, url),
                Decision::Timeout { item } => outcomes.push(Outcome::Failed {
                    item,
                    reason: FailureReason::Timeout,
                }),
                Decision::TooManyIndirections { item } => outcomes.push(Outcome::Failed {
                    item,
                    reason: FailureReason::TooManyIndirections,
                }),
            }
        }

        if session.is_finished() {
            break;
        }

        if deadline_reached {
            in_flight.abort_all();
            for item in session.abandon_pending() {
                info!("Ad search deadline reached for {}", item.source);
                outcomes.push(Outcome::Failed {
                    item,
                    reason: FailureReason::AdSearchTimeout,
                });
            }
            break;
        }

        let wake_at = started + config.next_boundary(elapsed);
        match time::timeout_at(wake_at, in_flight.join_next()).await {
            Ok(Some(Ok((item, fetched)))) => ingest(&mut session, &mut outcomes, item, fetched),
            Ok(Some(Err(e))) => warn!("Fetch task failed: {}", e),
            Ok(None) => time::sleep_until(wake_at).await,
            Err(_) => (),
        }
    }

    in_flight.abort_all();
    outcomes
}

/// Parse the handshake payload and resolve its groups one after another
pub async fn resolve_pods<F: Fetcher>(
    payload: &str,
    fetcher: Arc<F>,
    config: &ResolverConfig,
) -> Result<Vec<Vec<Outcome>>> {
    config.validate()?;

    let mut results = Vec::new();
    for group in parse_pod_response(payload)? {
        results.push(resolve_group(fetcher.clone(), group, config).await);
    }

    Ok(results)
}

fn spawn_fetch<F: Fetcher>(in_flight: &mut JoinSet<FetchResult>, fetcher: &Arc<F>, item: Item, url: Url) {
    let fetcher = Arc::clone(fetcher);
    in_flight.spawn(async move {
        let fetched = fetcher.fetch(&url).await;
        (item, fetched)
    });
}

/// Feed a fetched document into the session, finishing the item if it cannot be used
fn ingest(session: &mut VrmSession, outcomes: &mut Vec<Outcome>, item: Item, fetched: Result<String>) {
    if session.is_item_finished(&item) {
        return;
    }

    let xml = match fetched {
        Ok(xml) => xml,
        Err(e) => {
            warn!("Failed to fetch VAST for {}: {}", item.source, e);
            session.fail(&item);
            outcomes.push(Outcome::Failed {
                item,
                reason: FailureReason::Fetch(e.to_string()),
            });
            return;
        }
    };

    match parse_vast(&xml) {
        Ok(document) => {
            session.push_result(item, document);
        }
        Err(e) => {
            warn!("Failed to parse VAST for {}: {}", item.source, e);
            session.fail(&item);
            outcomes.push(Outcome::Failed {
                item,
                reason: FailureReason::Parse(e.to_string()),
            });
        }
    }
}
