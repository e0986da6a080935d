//! VAST ad-response parsing and wrapper-chain resolution for ad pods.
//!
//! [`parser::parse_vast`] turns a VAST document into an inline ad or a wrapper.
//! [`processing::ProcessingController`] decides, tick by tick, what happens to
//! each item of a pod, and [`session::VrmSession`] threads the state between
//! ticks. [`runner::resolve_pods`] drives the whole thing against a
//! [`fetch::Fetcher`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod item;
pub mod models;
pub mod offset;
pub mod parser;
pub mod processing;
pub mod provider;
pub mod runner;
pub mod scheduled;
pub mod session;
pub mod stitcher;

pub use config::ResolverConfig;
pub use error::{Result, VastError};
pub use fetch::{Fetcher, HttpFetcher};
pub use item::{Candidate, Group, Item, MetaInfo, Source};
pub use models::{Document, Inline, Wrapper};
pub use offset::{parse_offset, Offset};
pub use parser::parse_vast;
pub use processing::{Decision, ProcessingController, TimeoutKind};
pub use runner::{resolve_group, resolve_pods, FailureReason, Outcome};
pub use session::VrmSession;
