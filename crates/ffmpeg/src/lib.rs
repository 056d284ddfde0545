//! FFmpeg backed implementations of the `defects-core` media traits.
//!
//! Each type wraps one FFmpeg object and releases it on drop:
//!
//! - [`source::VideoSource`] demuxes a file and decodes its first video stream.
//! - [`scaler::FrameScaler`] converts frames to the encoder's geometry and pixel format.
//! - [`encoder::VideoEncoder`] encodes frames into the stream it adds to a muxer.
//! - [`muxer::Muxer`] writes the encoded stream into a container file.
//!
//! Currently this crate only supports the latest versions of ffmpeg (7.x.x).
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::path::Path;
//! # fn test_fn() -> Result<(), Box<dyn std::error::Error>> {
//! use defects_core::{DefectKind, DefectRule, DefectRuleSet, Pipeline};
//! use defects_ffmpeg::encoder::{VideoEncoder, VideoEncoderSettings};
//! use defects_ffmpeg::muxer::{Muxer, MuxerOptions};
//! use defects_ffmpeg::scaler::FrameScaler;
//! use defects_ffmpeg::source::VideoSource;
//!
//! let source = VideoSource::open(Path::new("input.mp4"))?;
//! let mut muxer = Muxer::open(Path::new("output.mp4"), MuxerOptions::default())?;
//!
//! let settings = VideoEncoderSettings::builder()
//!     .width(source.width())
//!     .height(source.height())
//!     .frame_rate(source.frame_rate())
//!     .build();
//! let encoder = VideoEncoder::new("libx264", &mut muxer, settings)?;
//! let scaler = FrameScaler::new(encoder.width(), encoder.height(), encoder.pixel_format())?;
//! muxer.write_header()?;
//!
//! let rules = DefectRuleSet::default().with(DefectKind::DropOutputPacket, DefectRule::new(DefectKind::DropOutputPacket, 30, 5)?);
//! let stats = Pipeline::new(source, scaler, encoder, muxer, &rules).run()?;
//! println!("wrote {} packets", stats.packets_written);
//! # Ok(())
//! # }
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
#![deny(clippy::undocumented_unsafe_blocks)]

/// Dictionary specific functionality.
pub mod dict;
/// Encoder specific functionality.
pub mod encoder;
/// Error handling.
pub mod error;
/// Frame specific functionality.
pub mod frame;
/// Logging specific functionality.
pub mod log;
/// Muxer specific functionality.
pub mod muxer;
/// Packet specific functionality.
pub mod packet;
/// Pixel format lookups.
pub mod pixel_format;
/// Scaler specific functionality.
pub mod scaler;
/// Demuxing and decoding of the input.
pub mod source;
/// Utility functionality.
pub mod utils;

/// The ffi module.
pub use ffmpeg_sys_next as ffi;

mod smart_object;
