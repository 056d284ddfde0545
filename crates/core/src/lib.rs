//! Deterministic defect injection for video transcoding pipelines.
//!
//! This crate holds everything that does not depend on a codec library: the
//! defect rules and their countdown schedulers, the ledger that undoes
//! timestamp corruption, time base arithmetic and the pipeline orchestrator.
//! The orchestrator talks to the codec library through the traits in
//! [`media`], so it can be driven by FFmpeg in production and by in-memory
//! fakes in tests.
//!
//! ## Defects
//!
//! | Kind | Queried | Effect |
//! |------|---------|--------|
//! | `drop_input_packet` | per input video packet | the packet never reaches the decoder |
//! | `change_pixel_format` | per decoded frame | the frame is scaled as if it had another pixel format |
//! | `pts_drop` | per decoded frame | the frame timestamp is rewritten before encoding and restored afterwards |
//! | `drop_output_packet` | per encoded packet | the packet never reaches the muxer |
//!
//! Every kind is driven by its own [`DefectScheduler`](scheduler::DefectScheduler):
//! it passes `step` queries, fires `count` queries, and repeats.
//!
//! ## Example
//!
//! ```rust
//! use defects_core::rule::{DefectRule, DefectRuleSet, DefectKind};
//! use defects_core::scheduler::DefectSchedulers;
//!
//! let rules = DefectRuleSet::builder()
//!     .drop_input_packet(DefectRule::new(DefectKind::DropInputPacket, 3, 2)?)
//!     .build();
//!
//! let mut schedulers = DefectSchedulers::new(&rules);
//! let pattern: Vec<bool> = (0..10)
//!     .map(|_| schedulers.query(DefectKind::DropInputPacket).fires())
//!     .collect();
//!
//! assert_eq!(
//!     pattern,
//!     [false, false, false, true, true, false, false, false, true, true]
//! );
//! # Ok::<(), defects_core::rule::RuleError>(())
//! ```
//!
//! ## License
//!
//! This project is licensed under the [MIT](./LICENSE.MIT) or [Apache-2.0](./LICENSE.Apache-2.0) license.
//! You can choose between one of them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

/// Per-frame timestamp bookkeeping.
pub mod ledger;
/// Capability traits implemented by codec backends.
pub mod media;
/// The transcoding loop.
pub mod pipeline;
/// Defect kinds and rules.
pub mod rule;
/// Countdown schedulers deciding when a defect fires.
pub mod scheduler;
/// Time base arithmetic.
pub mod timebase;

pub use pipeline::{Pipeline, PipelineError, PipelineStats};
pub use rule::{DefectKind, DefectRule, DefectRuleSet, RuleError};
