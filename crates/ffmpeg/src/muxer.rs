use std::ffi::CString;
use std::path::Path;

use defects_core::media::Sink;
use defects_core::timebase::Rational;

use crate::dict::Dictionary;
use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;
use crate::packet::Packet;
use crate::smart_object::SmartPtr;
use crate::utils::rational;

/// Flags for a fragmented mp4 that can be written without seeking back.
pub const DEFAULT_MOVFLAGS: &str = "frag_keyframe+empty_moov+delay_moov";

/// Options for [`Muxer::open`].
#[derive(Debug, Clone, bon::Builder)]
pub struct MuxerOptions {
    /// The short name of the output format.
    #[builder(default = "mp4".to_owned(), into)]
    pub format_name: String,
    /// The `movflags` passed to the muxer when the header is written.
    #[builder(default = DEFAULT_MOVFLAGS.to_owned(), into)]
    pub movflags: String,
    /// Standards compliance, such as `experimental`, when the muxer needs it.
    #[builder(into)]
    pub strict: Option<String>,
}

impl Default for MuxerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MuxerOptions {
    fn dictionary(&self) -> Result<Dictionary, FfmpegError> {
        let mut options = Dictionary::new();

        if !self.movflags.is_empty() {
            options.set("movflags", &self.movflags)?;
        }

        if let Some(strict) = &self.strict {
            options.set("strict", strict)?;
        }

        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxerState {
    Uninitialized,
    HeaderWritten,
    TrailerWritten,
}

/// Writes a single video stream into a container file.
///
/// Packets are written as they come, without interleaving.
///
/// The output format keeps its own timestamp rules: ffmpeg checks every
/// packet, and [`Muxer::write_packet`] fails when a packet's decode timestamp
/// goes backwards or lands after its presentation timestamp. Rewritten
/// presentation timestamps must therefore be restored before packets reach
/// the muxer.
pub struct Muxer {
    context: SmartPtr<AVFormatContext>,
    options: MuxerOptions,
    stream_index: Option<i32>,
    state: MuxerState,
}

/// Safety: `Muxer` owns its context and only touches it through `&mut self`.
unsafe impl Send for Muxer {}

impl std::fmt::Debug for Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer")
            .field("options", &self.options)
            .field("stream_index", &self.stream_index)
            .field("state", &self.state)
            .finish()
    }
}

impl Muxer {
    /// Creates the output file at `path` and allocates a muxer for it.
    pub fn open(path: &Path, options: MuxerOptions) -> Result<Self, FfmpegError> {
        let path = path
            .to_str()
            .ok_or(FfmpegError::Arguments("output path is not valid utf-8"))?;
        let path = CString::new(path).map_err(|_| FfmpegError::Arguments("output path cannot contain nul bytes"))?;
        let format_name = CString::new(options.format_name.as_str())
            .map_err(|_| FfmpegError::Arguments("format name cannot contain nul bytes"))?;

        let mut ptr = std::ptr::null_mut();

        // Safety: `avformat_alloc_output_context2` is safe to call, all strings are nul terminated.
        FfmpegErrorCode(unsafe {
            avformat_alloc_output_context2(&mut ptr, std::ptr::null(), format_name.as_ptr(), path.as_ptr())
        })
        .result()?;

        let destructor = |ptr: &mut *mut AVFormatContext| {
            // Safety: the context was allocated by `avformat_alloc_output_context2`.
            unsafe {
                if let Some(context) = ptr.as_mut() {
                    if !context.pb.is_null() {
                        avio_closep(&mut context.pb);
                    }
                }

                avformat_free_context(*ptr);
            }
            *ptr = std::ptr::null_mut();
        };

        // Safety: the pointer comes from `avformat_alloc_output_context2` and `destructor` frees it.
        let mut context = unsafe { SmartPtr::wrap_non_null(ptr, destructor) }.ok_or(FfmpegError::Alloc)?;

        // Safety: a successfully allocated output context always has an output format.
        let format_flags = unsafe { (*context.as_deref().oformat).flags };

        if format_flags & AVFMT_NOFILE as i32 == 0 {
            // Safety: `avio_open` is safe to call, the path is nul terminated.
            FfmpegErrorCode(unsafe { avio_open(&mut context.as_deref_mut().pb, path.as_ptr(), AVIO_FLAG_WRITE as i32) })
                .result()?;
        }

        Ok(Self {
            context,
            options,
            stream_index: None,
            state: MuxerState::Uninitialized,
        })
    }

    /// Returns a pointer to the format context.
    pub const fn as_ptr(&self) -> *const AVFormatContext {
        self.context.as_ptr()
    }

    /// Returns the flags of the output format.
    pub fn format_flags(&self) -> i32 {
        // Safety: the output format is set for the lifetime of the context.
        unsafe { (*self.context.as_deref().oformat).flags }
    }

    /// Returns true if encoders must put their global headers in the extradata.
    pub fn needs_global_header(&self) -> bool {
        self.format_flags() & AVFMT_GLOBALHEADER as i32 != 0
    }

    /// Returns the index of the video stream, if one was added.
    pub const fn stream_index(&self) -> Option<i32> {
        self.stream_index
    }

    /// Adds the video stream, copying its parameters from an opened encoder.
    pub(crate) fn add_stream(&mut self, encoder: &AVCodecContext) -> Result<i32, FfmpegError> {
        if self.state != MuxerState::Uninitialized {
            return Err(FfmpegError::Arguments("cannot add a stream after the header has been written"));
        }

        if self.stream_index.is_some() {
            return Err(FfmpegError::Arguments("muxer already has a video stream"));
        }

        // Safety: `avformat_new_stream` is safe to call.
        let stream = unsafe { avformat_new_stream(self.context.as_mut_ptr(), std::ptr::null()) };

        // Safety: a non-null stream is owned by the context, which outlives this call.
        let stream = unsafe { stream.as_mut() }.ok_or(FfmpegError::Alloc)?;

        let index = self.context.as_deref().nb_streams as i32 - 1;
        stream.id = index;
        stream.time_base = encoder.time_base;
        stream.avg_frame_rate = encoder.framerate;

        // Safety: both pointers are valid, the stream owns its codec parameters.
        FfmpegErrorCode(unsafe { avcodec_parameters_from_context(stream.codecpar, encoder) }).result()?;

        self.stream_index = Some(index);

        Ok(index)
    }

    fn stream(&self) -> Option<&AVStream> {
        let index = usize::try_from(self.stream_index?).ok()?;
        let context = self.context.as_deref();

        if index >= context.nb_streams as usize {
            return None;
        }

        // Safety: the index is within `nb_streams` and the streams outlive `&self`.
        unsafe { (*context.streams.add(index)).as_ref() }
    }

    /// Writes the container header.
    ///
    /// The muxer may change the stream time base here, so read
    /// [`Sink::time_base`] only after this call.
    pub fn write_header(&mut self) -> Result<(), FfmpegError> {
        if self.state != MuxerState::Uninitialized {
            return Err(FfmpegError::Arguments("header already written"));
        }

        let mut options = self.options.dictionary()?;

        // Safety: `avformat_write_header` is safe to call, the header has not been written yet.
        FfmpegErrorCode(unsafe { avformat_write_header(self.context.as_mut_ptr(), options.as_mut_ptr_ref()) })
            .result()?;

        if !options.is_empty() {
            tracing::debug!(options = ?options, "muxer ignored options");
        }

        self.state = MuxerState::HeaderWritten;

        Ok(())
    }

    /// Writes a packet to the video stream, without reordering.
    pub fn write_packet(&mut self, packet: &mut Packet) -> Result<(), FfmpegError> {
        if self.state != MuxerState::HeaderWritten {
            return Err(FfmpegError::Arguments(
                "cannot write packet before header or after trailer has been written",
            ));
        }

        let index = self
            .stream_index
            .ok_or(FfmpegError::Arguments("muxer has no video stream"))?;
        packet.set_stream_index(index);

        // Safety: `av_write_frame` is safe to call, once the header has been written.
        FfmpegErrorCode(unsafe { av_write_frame(self.context.as_mut_ptr(), packet.as_mut_ptr()) }).result()?;

        Ok(())
    }

    /// Writes the container trailer.
    pub fn write_trailer(&mut self) -> Result<(), FfmpegError> {
        if self.state != MuxerState::HeaderWritten {
            return Err(FfmpegError::Arguments(
                "cannot write trailer before header or after trailer has been written",
            ));
        }

        // Safety: `av_write_trailer` is safe to call, once the header has been written.
        FfmpegErrorCode(unsafe { av_write_trailer(self.context.as_mut_ptr()) }).result()?;
        self.state = MuxerState::TrailerWritten;

        Ok(())
    }
}

impl Sink for Muxer {
    type Error = FfmpegError;
    type Packet = Packet;

    fn write_packet(&mut self, packet: &mut Packet) -> Result<(), FfmpegError> {
        Muxer::write_packet(self, packet)
    }

    fn time_base(&self) -> Rational {
        self.stream().map_or(Rational::ZERO, |stream| rational(stream.time_base))
    }

    fn finish(&mut self) -> Result<(), FfmpegError> {
        self.write_trailer()
    }
}
