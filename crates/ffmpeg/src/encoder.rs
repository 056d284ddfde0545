use std::ffi::CString;

use defects_core::media::Encode;
use defects_core::timebase::Rational;

use crate::dict::Dictionary;
use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;
use crate::frame::VideoFrame;
use crate::muxer::Muxer;
use crate::packet::Packet;
use crate::smart_object::SmartPtr;
use crate::utils::rational;

/// Represents the settings for a video encoder.
#[derive(Debug, bon::Builder)]
pub struct VideoEncoderSettings {
    width: i32,
    height: i32,
    frame_rate: AVRational,
    /// Defaults to the first pixel format the codec supports.
    pixel_format: Option<AVPixelFormat>,
    /// Defaults to `1 / frame_rate.num`.
    time_base: Option<AVRational>,
    gop_size: Option<i32>,
    thread_count: Option<i32>,
    bitrate: Option<i64>,
    rc_min_rate: Option<i64>,
    rc_max_rate: Option<i64>,
    rc_buffer_size: Option<i32>,
    max_b_frames: Option<i32>,
    codec_options: Option<Dictionary>,
}

impl VideoEncoderSettings {
    fn apply(&self, encoder: &mut AVCodecContext, codec: &AVCodec) -> Result<(), FfmpegError> {
        if self.width <= 0
            || self.height <= 0
            || self.frame_rate.num <= 0
            || self.frame_rate.den <= 0
            || self.pixel_format == Some(AVPixelFormat::AV_PIX_FMT_NONE)
        {
            return Err(FfmpegError::Arguments("width, height and frame_rate must be set"));
        }

        let time_base = self.time_base.unwrap_or(AVRational {
            num: 1,
            den: self.frame_rate.num,
        });

        if time_base.num <= 0 || time_base.den <= 0 {
            return Err(FfmpegError::Arguments("time_base must be positive"));
        }

        encoder.width = self.width;
        encoder.height = self.height;
        encoder.pix_fmt = match self.pixel_format {
            Some(format) => format,
            // Safety: `pix_fmts` is null or a list terminated by `AV_PIX_FMT_NONE`.
            None => unsafe { codec.pix_fmts.as_ref() }
                .copied()
                .unwrap_or(AVPixelFormat::AV_PIX_FMT_YUV420P),
        };
        encoder.framerate = self.frame_rate;
        encoder.time_base = time_base;
        encoder.thread_count = self.thread_count.unwrap_or(encoder.thread_count);
        encoder.gop_size = self.gop_size.unwrap_or(encoder.gop_size);
        encoder.bit_rate = self.bitrate.unwrap_or(encoder.bit_rate);
        encoder.rc_min_rate = self.rc_min_rate.unwrap_or(encoder.rc_min_rate);
        encoder.rc_max_rate = self.rc_max_rate.unwrap_or(encoder.rc_max_rate);
        encoder.rc_buffer_size = self.rc_buffer_size.unwrap_or(encoder.rc_buffer_size);
        encoder.max_b_frames = self.max_b_frames.unwrap_or(encoder.max_b_frames);

        Ok(())
    }
}

/// A video encoder feeding the stream it added to a [`Muxer`].
pub struct VideoEncoder {
    encoder: SmartPtr<AVCodecContext>,
    stream_index: i32,
}

/// Safety: `VideoEncoder` can be sent between threads.
unsafe impl Send for VideoEncoder {}

impl std::fmt::Debug for VideoEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoEncoder")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("pixel_format", &self.pixel_format())
            .field("time_base", &Encode::time_base(self))
            .field("frame_rate", &Encode::frame_rate(self))
            .field("stream_index", &self.stream_index)
            .finish()
    }
}

impl VideoEncoder {
    /// Opens the encoder named `codec_name` and adds its stream to `muxer`.
    ///
    /// Codec options the encoder does not recognise are logged and ignored.
    pub fn new(codec_name: &str, muxer: &mut Muxer, mut settings: VideoEncoderSettings) -> Result<Self, FfmpegError> {
        let no_encoder = || FfmpegError::NoEncoder(codec_name.to_owned());
        let c_name = CString::new(codec_name).map_err(|_| no_encoder())?;

        // Safety: `avcodec_find_encoder_by_name` is safe to call, the name is nul terminated.
        let codec = unsafe { avcodec_find_encoder_by_name(c_name.as_ptr()) };

        // Safety: a non-null codec points into ffmpeg's static codec table.
        let codec = unsafe { codec.as_ref() }.ok_or_else(no_encoder)?;

        if codec.type_ != AVMediaType::AVMEDIA_TYPE_VIDEO {
            return Err(no_encoder());
        }

        let destructor = |ptr: &mut *mut AVCodecContext| {
            // Safety: the pointer comes from `avcodec_alloc_context3`.
            unsafe { avcodec_free_context(ptr) };
        };

        // Safety: `avcodec_alloc_context3` is safe to call.
        let encoder = unsafe { avcodec_alloc_context3(codec) };

        // Safety: The pointer here is valid and the destructor has been setup to handle the cleanup.
        let mut encoder = unsafe { SmartPtr::wrap_non_null(encoder, destructor) }.ok_or(FfmpegError::Alloc)?;

        let encoder_mut = encoder.as_deref_mut();
        settings.apply(encoder_mut, codec)?;

        if muxer.needs_global_header() {
            encoder_mut.flags |= AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }

        let mut codec_options = settings.codec_options.take().unwrap_or_default();

        // Safety: `avcodec_open2` is safe to call, the context was allocated for `codec`.
        FfmpegErrorCode(unsafe { avcodec_open2(encoder_mut, codec, codec_options.as_mut_ptr_ref()) }).result()?;

        if !codec_options.is_empty() {
            tracing::debug!(codec = codec_name, options = ?codec_options, "encoder ignored options");
        }

        let stream_index = muxer.add_stream(encoder.as_deref())?;

        tracing::debug!(
            codec = codec_name,
            width = settings.width,
            height = settings.height,
            "opened encoder"
        );

        Ok(Self { encoder, stream_index })
    }

    /// Returns the width of the encoded frames.
    pub const fn width(&self) -> i32 {
        self.encoder.as_deref().width
    }

    /// Returns the height of the encoded frames.
    pub const fn height(&self) -> i32 {
        self.encoder.as_deref().height
    }

    /// Returns the pixel format the encoder expects.
    pub const fn pixel_format(&self) -> AVPixelFormat {
        self.encoder.as_deref().pix_fmt
    }

    /// Returns the index of the muxer stream this encoder feeds.
    pub const fn stream_index(&self) -> i32 {
        self.stream_index
    }
}

impl Encode for VideoEncoder {
    type Error = FfmpegError;
    type Frame = VideoFrame;
    type Packet = Packet;

    fn send_frame(&mut self, frame: Option<&VideoFrame>) -> Result<(), FfmpegError> {
        let frame_ptr = frame.map_or(std::ptr::null(), VideoFrame::as_ptr);

        // Safety: `self.encoder` is open and `frame_ptr` is null or a valid frame.
        match FfmpegErrorCode(unsafe { avcodec_send_frame(self.encoder.as_mut_ptr(), frame_ptr) }) {
            // flushing an encoder twice reports the end of the stream
            FfmpegErrorCode::Eof if frame.is_none() => Ok(()),
            code => code.result().map(|_| ()),
        }
    }

    fn receive_packet(&mut self) -> Result<Option<Packet>, FfmpegError> {
        let mut packet = Packet::new()?;

        // Safety: `self.encoder` and `packet` are valid pointers.
        let code = FfmpegErrorCode(unsafe { avcodec_receive_packet(self.encoder.as_mut_ptr(), packet.as_mut_ptr()) });

        match code {
            code if code.is_drained() => Ok(None),
            code if code.is_success() => {
                packet.set_stream_index(self.stream_index);
                Ok(Some(packet))
            }
            code => Err(FfmpegError::Code(code)),
        }
    }

    fn time_base(&self) -> Rational {
        rational(self.encoder.as_deref().time_base)
    }

    fn frame_rate(&self) -> Rational {
        rational(self.encoder.as_deref().framerate)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use defects_core::media::{Encode, EncodedPacket, Timestamped};
    use defects_core::timebase::Rational;

    use super::{VideoEncoder, VideoEncoderSettings};
    use crate::dict::Dictionary;
    use crate::error::FfmpegError;
    use crate::ffi::{AVPixelFormat, AVRational};
    use crate::frame::VideoFrame;
    use crate::muxer::{Muxer, MuxerOptions};

    fn settings() -> VideoEncoderSettings {
        VideoEncoderSettings::builder()
            .width(64)
            .height(48)
            .frame_rate(AVRational { num: 25, den: 1 })
            .gop_size(1)
            .build()
    }

    #[test]
    fn test_encoder_unknown_codec() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut muxer = Muxer::open(&dir.path().join("out.mp4"), MuxerOptions::default()).expect("failed to open muxer");

        assert_eq!(
            VideoEncoder::new("not-a-codec", &mut muxer, settings()).err(),
            Some(FfmpegError::NoEncoder("not-a-codec".into()))
        );
        assert_eq!(
            VideoEncoder::new("aac", &mut muxer, settings()).err(),
            Some(FfmpegError::NoEncoder("aac".into()))
        );
        assert_eq!(muxer.stream_index(), None);
    }

    #[test]
    fn test_encoder_rejects_invalid_settings() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut muxer = Muxer::open(&dir.path().join("out.mp4"), MuxerOptions::default()).expect("failed to open muxer");

        let settings = VideoEncoderSettings::builder()
            .width(64)
            .height(48)
            .frame_rate(AVRational { num: 0, den: 1 })
            .build();

        assert_eq!(
            VideoEncoder::new("mpeg4", &mut muxer, settings).err(),
            Some(FfmpegError::Arguments("width, height and frame_rate must be set"))
        );
    }

    #[test]
    fn test_encoder_defaults() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut muxer = Muxer::open(&dir.path().join("out.mp4"), MuxerOptions::default()).expect("failed to open muxer");

        let mut settings = settings();
        settings.codec_options = Some(Dictionary::from_entries([("not-an-option", "1")]).expect("valid options"));

        let encoder = VideoEncoder::new("mpeg4", &mut muxer, settings).expect("failed to open encoder");

        assert_eq!(encoder.pixel_format(), AVPixelFormat::AV_PIX_FMT_YUV420P);
        assert_eq!(Encode::time_base(&encoder), Rational::static_new::<1, 25>());
        assert_eq!(Encode::frame_rate(&encoder), Rational::static_new::<25, 1>());
        assert_eq!(muxer.stream_index(), Some(encoder.stream_index()));
    }

    #[test]
    fn test_encoder_encode_and_flush() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut muxer = Muxer::open(&dir.path().join("out.mp4"), MuxerOptions::default()).expect("failed to open muxer");
        let mut encoder = VideoEncoder::new("mpeg4", &mut muxer, settings()).expect("failed to open encoder");

        let mut packets = Vec::new();
        for pts in 0..5 {
            let mut frame = VideoFrame::alloc(64, 48, AVPixelFormat::AV_PIX_FMT_YUV420P).expect("failed to allocate frame");
            let len = frame.linesizes()[0] as usize * 48;
            // Safety: the luma plane holds `linesize * height` bytes.
            unsafe { std::ptr::write_bytes((*frame.as_mut_ptr()).data[0], pts as u8 * 40, len) };
            frame.set_pts(Some(pts));

            encoder.send_frame(Some(&frame)).expect("failed to send frame");
            while let Some(packet) = encoder.receive_packet().expect("failed to receive packet") {
                packets.push(packet);
            }
        }

        encoder.send_frame(None).expect("failed to flush encoder");
        while let Some(packet) = encoder.receive_packet().expect("failed to receive packet") {
            packets.push(packet);
        }
        encoder.send_frame(None).expect("flushing twice is fine");

        assert_eq!(packets.len(), 5);
        assert!(packets.iter().all(|packet| packet.is_key()));
        assert_eq!(
            packets.iter().map(|packet| packet.pts()).collect::<Vec<_>>(),
            (0..5).map(Some).collect::<Vec<_>>()
        );
        assert!(packets.iter().all(|packet| packet.stream_index() == encoder.stream_index()));
        assert!(packets.iter().all(|packet| packet.dts().is_some()));
    }
}
