use std::ffi::CString;
use std::path::Path;

use defects_core::media::Source;
use defects_core::timebase::Rational;

use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;
use crate::frame::VideoFrame;
use crate::packet::Packet;
use crate::smart_object::SmartPtr;
use crate::utils::rational;

/// Demuxes a file and decodes its first video stream.
///
/// Every other stream is discarded by the demuxer.
pub struct VideoSource {
    decoder: SmartPtr<AVCodecContext>,
    input: SmartPtr<AVFormatContext>,
    stream_index: i32,
    time_base: AVRational,
    frame_rate: AVRational,
}

/// Safety: `VideoSource` owns its contexts and only touches them through `&mut self`.
unsafe impl Send for VideoSource {}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("stream_index", &self.stream_index)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("pixel_format", &self.pixel_format())
            .field("time_base", &rational(self.time_base))
            .field("frame_rate", &rational(self.frame_rate))
            .finish()
    }
}

impl VideoSource {
    /// Opens `path`, selects its first video stream and opens a decoder for it.
    pub fn open(path: &Path) -> Result<Self, FfmpegError> {
        let path = path
            .to_str()
            .ok_or(FfmpegError::Arguments("input path is not valid utf-8"))?;
        let path = CString::new(path).map_err(|_| FfmpegError::Arguments("input path cannot contain nul bytes"))?;

        let mut ptr = std::ptr::null_mut();

        // Safety: `avformat_open_input` is safe to call, it frees the context itself on failure.
        FfmpegErrorCode(unsafe { avformat_open_input(&mut ptr, path.as_ptr(), std::ptr::null(), std::ptr::null_mut()) })
            .result()?;

        let destructor = |ptr: &mut *mut AVFormatContext| {
            // Safety: the context was opened by `avformat_open_input`.
            unsafe { avformat_close_input(ptr) };
        };

        // Safety: the pointer comes from `avformat_open_input` and `destructor` closes it.
        let mut input = unsafe { SmartPtr::wrap_non_null(ptr, destructor) }.ok_or(FfmpegError::Alloc)?;

        // Safety: `avformat_find_stream_info` is safe to call on an open input.
        FfmpegErrorCode(unsafe { avformat_find_stream_info(input.as_mut_ptr(), std::ptr::null_mut()) }).result()?;

        let context = input.as_deref();
        let streams: &[*mut AVStream] = if context.streams.is_null() {
            &[]
        } else {
            // Safety: `streams` holds `nb_streams` valid stream pointers.
            unsafe { std::slice::from_raw_parts(context.streams, context.nb_streams as usize) }
        };

        let mut selected = None;
        for (index, &stream) in streams.iter().enumerate() {
            // Safety: every stream pointer and its codec parameters are valid while the input is open.
            let stream = unsafe { &mut *stream };
            // Safety: see above.
            let is_video = unsafe { (*stream.codecpar).codec_type } == AVMediaType::AVMEDIA_TYPE_VIDEO;

            if is_video && selected.is_none() {
                selected = Some(index);
            } else {
                stream.discard = AVDiscard::AVDISCARD_ALL;
            }
        }

        let index = selected.ok_or(FfmpegError::NoStream)?;
        let stream_ptr = streams[index];

        // Safety: the selected stream is valid while the input is open.
        let stream = unsafe { &*stream_ptr };
        // Safety: see above.
        let codecpar = unsafe { &*stream.codecpar };

        // Safety: `avcodec_find_decoder` is safe to call.
        let codec = unsafe { avcodec_find_decoder(codecpar.codec_id) };
        if codec.is_null() {
            return Err(FfmpegError::NoDecoder);
        }

        let destructor = |ptr: &mut *mut AVCodecContext| {
            // Safety: the pointer comes from `avcodec_alloc_context3`.
            unsafe { avcodec_free_context(ptr) };
        };

        // Safety: `avcodec_alloc_context3` is safe to call.
        let decoder = unsafe { avcodec_alloc_context3(codec) };

        // Safety: The pointer here is valid and the destructor has been setup to handle the cleanup.
        let mut decoder = unsafe { SmartPtr::wrap_non_null(decoder, destructor) }.ok_or(FfmpegError::Alloc)?;

        // Safety: both pointers are valid.
        FfmpegErrorCode(unsafe { avcodec_parameters_to_context(decoder.as_mut_ptr(), codecpar) }).result()?;

        // Safety: `av_guess_frame_rate` only reads the context and the stream.
        let guessed = unsafe { av_guess_frame_rate(input.as_mut_ptr(), stream_ptr, std::ptr::null_mut()) };
        let frame_rate = if stream.avg_frame_rate.num > 0 && stream.avg_frame_rate.den > 0 {
            stream.avg_frame_rate
        } else {
            guessed
        };

        let decoder_mut = decoder.as_deref_mut();
        decoder_mut.pkt_timebase = stream.time_base;
        decoder_mut.framerate = guessed;

        // Safety: `avcodec_open2` is safe to call, the context was allocated for `codec`.
        FfmpegErrorCode(unsafe { avcodec_open2(decoder_mut, codec, std::ptr::null_mut()) }).result()?;

        let source = Self {
            time_base: stream.time_base,
            frame_rate,
            stream_index: index as i32,
            decoder,
            input,
        };

        tracing::debug!(source = ?source, "opened input");

        Ok(source)
    }

    /// Returns the index of the selected video stream.
    pub const fn stream_index(&self) -> i32 {
        self.stream_index
    }

    /// Returns the width of the decoded frames.
    pub const fn width(&self) -> i32 {
        self.decoder.as_deref().width
    }

    /// Returns the height of the decoded frames.
    pub const fn height(&self) -> i32 {
        self.decoder.as_deref().height
    }

    /// Returns the pixel format the decoder produces.
    pub const fn pixel_format(&self) -> AVPixelFormat {
        self.decoder.as_deref().pix_fmt
    }

    /// Returns the average frame rate of the stream, guessed by ffmpeg when the
    /// container does not declare one.
    pub const fn frame_rate(&self) -> AVRational {
        self.frame_rate
    }
}

impl Source for VideoSource {
    type Error = FfmpegError;
    type Frame = VideoFrame;
    type Packet = Packet;

    fn read_packet(&mut self) -> Result<Option<Packet>, FfmpegError> {
        loop {
            match Packet::read(self.input.as_mut_ptr())? {
                Some(packet) if packet.stream_index() == self.stream_index => return Ok(Some(packet)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), FfmpegError> {
        // Safety: the decoder is open and `packet` is valid.
        FfmpegErrorCode(unsafe { avcodec_send_packet(self.decoder.as_mut_ptr(), packet.as_ptr()) }).result()?;
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), FfmpegError> {
        // Safety: a null packet puts the decoder into draining mode.
        match FfmpegErrorCode(unsafe { avcodec_send_packet(self.decoder.as_mut_ptr(), std::ptr::null()) }) {
            FfmpegErrorCode::Eof => Ok(()),
            code => code.result().map(|_| ()),
        }
    }

    fn receive_frame(&mut self) -> Result<Option<VideoFrame>, FfmpegError> {
        let mut frame = VideoFrame::new()?;

        // Safety: the decoder is open and `frame` is valid.
        let code = FfmpegErrorCode(unsafe { avcodec_receive_frame(self.decoder.as_mut_ptr(), frame.as_mut_ptr()) });

        match code {
            code if code.is_drained() => Ok(None),
            code if code.is_success() => Ok(Some(frame)),
            code => Err(FfmpegError::Code(code)),
        }
    }

    fn time_base(&self) -> Rational {
        rational(self.time_base)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::io::Write;

    use super::VideoSource;
    use crate::error::{FfmpegError, FfmpegErrorCode};

    #[test]
    fn test_source_missing_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let result = VideoSource::open(&dir.path().join("missing.mp4"));

        assert!(
            matches!(result, Err(FfmpegError::Code(code)) if !code.is_success()),
            "{result:?}"
        );
    }

    #[test]
    fn test_source_garbage_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".mp4")
            .tempfile()
            .expect("failed to create tempfile");
        file.write_all(b"this is not a video file").expect("failed to write tempfile");

        let result = VideoSource::open(file.path());

        assert!(
            matches!(result, Err(FfmpegError::Code(code)) if code != FfmpegErrorCode::Eagain),
            "{result:?}"
        );
    }
}
