//! Bulk caption and transcript acquisition.
//!
//! The pipeline: enumerate videos ([`input`]), fetch caption tracks through
//! a typed transport ([`transport`]) behind a rotating proxy pool
//! ([`proxy`]), retry and classify per video ([`worker`]), fan out under a
//! concurrency cap ([`run`]), and render self-describing documents
//! ([`format`], [`header`], [`stats`]). Combined output and offline format
//! conversion live in [`concat`] and [`convert`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod cli;
pub mod concat;
pub mod convert;
pub mod filename;
pub mod format;
pub mod header;
pub mod input;
pub mod probe;
pub mod proxy;
pub mod run;
pub mod stats;
pub mod transport;
pub mod worker;

pub use concat::{ConcatOptions, SplitRule, concatenate};
pub use format::Format;
pub use proxy::{ProxyPool, gather_pool};
pub use run::{RunSummary, Scheduler};
pub use stats::{TextStats, text_stats};
pub use transport::{Cue, FetchError, TranscriptSource, YoutubeTranscriptSource};
pub use worker::{DownloadResult, DownloadStatus, Downloader, Item};
