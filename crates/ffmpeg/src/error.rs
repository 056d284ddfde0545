use std::ffi::CStr;

use crate::ffi::*;

/// An error that occurs when an ffmpeg operation fails.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FfmpegError {
    /// An error that occurs when the memory allocation fails.
    #[error("failed to allocate memory")]
    Alloc,
    /// An error that occurs when the ffmpeg error code is not a success code.
    #[error("ffmpeg error: {0}")]
    Code(#[from] FfmpegErrorCode),
    /// An error that occurs when no decoder is found.
    #[error("no decoder found")]
    NoDecoder,
    /// An error that occurs when the requested encoder does not exist.
    #[error("no encoder found: {0}")]
    NoEncoder(String),
    /// An error that occurs when no video stream is found.
    #[error("no stream found")]
    NoStream,
    /// An error that occurs when a frame uses a pixel format ffmpeg does not know.
    #[error("unknown pixel format: {0}")]
    UnknownPixelFormat(String),
    /// An error that occurs when the arguments are invalid.
    #[error("invalid arguments: {0}")]
    Arguments(&'static str),
}

/// A raw ffmpeg return code. Negative values are errors.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FfmpegErrorCode(pub i32);

#[allow(non_upper_case_globals)]
impl FfmpegErrorCode {
    /// FFmpeg error code for invalid arguments.
    pub const Einval: Self = Self(AVERROR(libc::EINVAL));
    /// FFmpeg error code for try again.
    pub const Eagain: Self = Self(AVERROR(libc::EAGAIN));
    /// FFmpeg error code for end of file.
    pub const Eof: Self = Self(AVERROR_EOF);
    /// FFmpeg error code for invalid data.
    pub const InvalidData: Self = Self(AVERROR_INVALIDDATA);
    /// FFmpeg error code for decoder not found.
    pub const DecoderNotFound: Self = Self(AVERROR_DECODER_NOT_FOUND);
    /// FFmpeg error code for encoder not found.
    pub const EncoderNotFound: Self = Self(AVERROR_ENCODER_NOT_FOUND);
    /// FFmpeg error code for stream not found.
    pub const StreamNotFound: Self = Self(AVERROR_STREAM_NOT_FOUND);
    /// FFmpeg error code for muxer not found.
    pub const MuxerNotFound: Self = Self(AVERROR_MUXER_NOT_FOUND);
    /// FFmpeg error code for unknown.
    pub const Unknown: Self = Self(AVERROR_UNKNOWN);

    /// Returns the result of the error code.
    pub const fn result(self) -> Result<i32, FfmpegError> {
        match self {
            code if code.is_success() => Ok(code.0),
            _ => Err(FfmpegError::Code(self)),
        }
    }

    /// Returns true if the error code is a success code.
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Returns true if ffmpeg needs more input or has no more output.
    pub const fn is_drained(self) -> bool {
        self.0 == Self::Eagain.0 || self.0 == Self::Eof.0
    }
}

impl From<i32> for FfmpegErrorCode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for FfmpegErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FfmpegErrorCode").field(&self.0).finish()
    }
}

impl std::fmt::Display for FfmpegErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Eagain => write!(f, "resource temporarily unavailable"),
            Self::Eof => write!(f, "end of file"),
            Self::InvalidData => write!(f, "invalid data"),
            Self::DecoderNotFound => write!(f, "decoder not found"),
            Self::EncoderNotFound => write!(f, "encoder not found"),
            Self::StreamNotFound => write!(f, "stream not found"),
            Self::MuxerNotFound => write!(f, "muxer not found"),
            Self::Unknown => write!(f, "unknown"),
            Self(ec) => {
                let mut buf = [0 as libc::c_char; AV_ERROR_MAX_STRING_SIZE as usize];

                // Safety: `buf` is writable for its whole length and av_strerror always nul terminates it.
                if unsafe { av_strerror(ec, buf.as_mut_ptr(), buf.len()) } < 0 {
                    return write!(f, "unknown error code: {ec}");
                }

                // Safety: `buf` holds a nul terminated string.
                let message = unsafe { CStr::from_ptr(buf.as_ptr()) };
                write!(f, "{} ({ec})", message.to_string_lossy())
            }
        }
    }
}

impl std::error::Error for FfmpegErrorCode {}
