use defects_core::media::{EncodedPacket, Timestamped};
use defects_core::timebase::Rational;

use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;
use crate::smart_object::SmartPtr;
use crate::utils::{av_rational, check_i64, or_nopts};

/// A packet is a wrapper around an [`AVPacket`].
pub struct Packet(SmartPtr<AVPacket>);

/// Safety: `Packet` is safe to send between threads.
unsafe impl Send for Packet {}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index())
            .field("pts", &self.pts())
            .field("dts", &self.dts())
            .field("duration", &self.duration())
            .field("size", &self.size())
            .field("is_key", &self.is_key())
            .finish()
    }
}

impl Packet {
    /// Creates a new, empty `Packet`.
    pub fn new() -> Result<Self, FfmpegError> {
        // Safety: `av_packet_alloc` is safe to call.
        let packet = unsafe { av_packet_alloc() };

        // Safety: the pointer comes from `av_packet_alloc` and `av_packet_free` releases it.
        unsafe { SmartPtr::wrap_non_null(packet, |ptr| av_packet_free(ptr)) }
            .map(Self)
            .ok_or(FfmpegError::Alloc)
    }

    /// Reads the next packet of any stream from `context`, `None` at the end of the input.
    pub(crate) fn read(context: *mut AVFormatContext) -> Result<Option<Self>, FfmpegError> {
        let mut packet = Self::new()?;

        // Safety: `context` is an open input and `packet` is a valid, empty packet.
        match FfmpegErrorCode(unsafe { av_read_frame(context, packet.as_mut_ptr()) }) {
            code if code.is_success() => Ok(Some(packet)),
            FfmpegErrorCode::Eof => Ok(None),
            code => Err(FfmpegError::Code(code)),
        }
    }

    /// Returns a pointer to the packet.
    pub const fn as_ptr(&self) -> *const AVPacket {
        self.0.as_ptr()
    }

    /// Returns a mutable pointer to the packet.
    pub fn as_mut_ptr(&mut self) -> *mut AVPacket {
        self.0.as_mut_ptr()
    }

    /// Returns the stream index of the packet.
    pub const fn stream_index(&self) -> i32 {
        self.0.as_deref().stream_index
    }

    /// Sets the stream index of the packet.
    pub fn set_stream_index(&mut self, stream_index: i32) {
        self.0.as_deref_mut().stream_index = stream_index;
    }

    /// Returns the size of the payload in bytes.
    pub const fn size(&self) -> usize {
        let size = self.0.as_deref().size;
        if size > 0 {
            size as usize
        } else {
            0
        }
    }

    /// Returns true if the packet holds a keyframe.
    pub const fn is_key(&self) -> bool {
        self.0.as_deref().flags & AV_PKT_FLAG_KEY as i32 != 0
    }
}

impl Timestamped for Packet {
    fn pts(&self) -> Option<i64> {
        check_i64(self.0.as_deref().pts)
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        self.0.as_deref_mut().pts = or_nopts(pts);
    }
}

impl EncodedPacket for Packet {
    fn dts(&self) -> Option<i64> {
        check_i64(self.0.as_deref().dts)
    }

    fn set_dts(&mut self, dts: Option<i64>) {
        self.0.as_deref_mut().dts = or_nopts(dts);
    }

    fn duration(&self) -> Option<i64> {
        // ffmpeg uses 0 for an unknown packet duration
        match self.0.as_deref().duration {
            0 => None,
            duration => check_i64(duration),
        }
    }

    fn set_duration(&mut self, duration: Option<i64>) {
        self.0.as_deref_mut().duration = duration.unwrap_or(0);
    }

    fn rescale_ts(&mut self, from: Rational, to: Rational) {
        // Safety: the packet is valid and `av_packet_rescale_ts` leaves unset timestamps alone.
        unsafe { av_packet_rescale_ts(self.as_mut_ptr(), av_rational(from), av_rational(to)) };
    }
}
