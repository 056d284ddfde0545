use std::collections::HashMap;

use defects_core::media::{Scale, SourceFormat, Timestamped};

use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;
use crate::frame::VideoFrame;
use crate::smart_object::SmartPtr;

/// The format frames are reinterpreted with when the pixel format defect fires.
pub const DEFAULT_MISMATCHED_FORMAT: AVPixelFormat = AVPixelFormat::AV_PIX_FMT_YUV411P;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SourceKey {
    width: i32,
    height: i32,
    format: AVPixelFormat,
}

/// Converts decoded frames to the encoder's geometry and pixel format.
///
/// One [`SwsContext`] is kept per distinct source geometry and format, so the
/// mismatched format gets its own context next to the native one.
pub struct FrameScaler {
    width: i32,
    height: i32,
    pixel_format: AVPixelFormat,
    mismatched_format: AVPixelFormat,
    contexts: HashMap<SourceKey, SmartPtr<SwsContext>>,
}

/// Safety: `FrameScaler` owns its contexts and they are only used through `&mut self`.
unsafe impl Send for FrameScaler {}

impl std::fmt::Debug for FrameScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScaler")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("mismatched_format", &self.mismatched_format)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

impl FrameScaler {
    /// Creates a scaler producing frames of the given geometry and format.
    pub fn new(width: i32, height: i32, pixel_format: AVPixelFormat) -> Result<Self, FfmpegError> {
        if width <= 0 || height <= 0 || pixel_format == AVPixelFormat::AV_PIX_FMT_NONE {
            return Err(FfmpegError::Arguments("width, height and pixel_format must be set"));
        }

        Ok(Self {
            width,
            height,
            pixel_format,
            mismatched_format: DEFAULT_MISMATCHED_FORMAT,
            contexts: HashMap::new(),
        })
    }

    /// Sets the format used for [`SourceFormat::Mismatched`].
    pub fn with_mismatched_format(mut self, format: AVPixelFormat) -> Self {
        self.mismatched_format = format;
        self
    }

    /// Returns the output pixel format.
    pub const fn pixel_format(&self) -> AVPixelFormat {
        self.pixel_format
    }

    /// Returns the format used for [`SourceFormat::Mismatched`].
    pub const fn mismatched_format(&self) -> AVPixelFormat {
        self.mismatched_format
    }

    fn context(&mut self, key: SourceKey) -> Result<&mut SmartPtr<SwsContext>, FfmpegError> {
        if !self.contexts.contains_key(&key) {
            // Safety: `sws_getContext` is safe to call, it returns null for unsupported conversions.
            let ptr = unsafe {
                sws_getContext(
                    key.width,
                    key.height,
                    key.format,
                    self.width,
                    self.height,
                    self.pixel_format,
                    SWS_BICUBIC as i32,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null(),
                )
            };

            let destructor = |ptr: &mut *mut SwsContext| {
                // Safety: `sws_freeContext` is safe to call.
                unsafe { sws_freeContext(*ptr) };
                *ptr = std::ptr::null_mut();
            };

            // Safety: the pointer comes from `sws_getContext` and `destructor` frees it.
            let context = unsafe { SmartPtr::wrap_non_null(ptr, destructor) }
                .ok_or(FfmpegError::Arguments("unsupported scaling conversion"))?;

            tracing::debug!(
                width = key.width,
                height = key.height,
                format = ?key.format,
                "created scaling context"
            );

            self.contexts.insert(key, context);
        }

        self.contexts.get_mut(&key).ok_or(FfmpegError::Alloc)
    }

    fn convert(&mut self, frame: &VideoFrame) -> Result<VideoFrame, FfmpegError> {
        let key = SourceKey {
            width: frame.width(),
            height: frame.height(),
            format: frame
                .pixel_format()
                .ok_or(FfmpegError::Arguments("frame has no pixel format"))?,
        };

        let mut output = VideoFrame::alloc(self.width, self.height, self.pixel_format)?;
        let context = self.context(key)?.as_mut_ptr();

        // Safety: both frames are valid and hold buffers for their geometry and format.
        let (input_ref, output_ref) = unsafe { (&*frame.as_ptr(), &*output.as_ptr()) };

        // Safety: `sws_scale` is safe to call, the context was created for exactly these two layouts.
        FfmpegErrorCode(unsafe {
            sws_scale(
                context,
                input_ref.data.as_ptr() as *const *const u8,
                input_ref.linesize.as_ptr(),
                0,
                input_ref.height,
                output_ref.data.as_ptr(),
                output_ref.linesize.as_ptr(),
            )
        })
        .result()?;

        output.set_pts(frame.pts());

        Ok(output)
    }
}

impl Scale for FrameScaler {
    type Error = FfmpegError;
    type Input = VideoFrame;
    type Output = VideoFrame;

    fn scale(&mut self, frame: &VideoFrame, format: SourceFormat) -> Result<VideoFrame, FfmpegError> {
        match format {
            SourceFormat::Native => self.convert(frame),
            SourceFormat::Mismatched => {
                let mismatched = frame.reinterpret(self.mismatched_format)?;
                self.convert(&mismatched)
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use defects_core::media::{Scale, SourceFormat, Timestamped};

    use super::FrameScaler;
    use crate::error::FfmpegError;
    use crate::ffi::AVPixelFormat;
    use crate::frame::VideoFrame;

    fn gray_frame(width: i32, height: i32, pts: i64) -> VideoFrame {
        let mut frame = VideoFrame::alloc(width, height, AVPixelFormat::AV_PIX_FMT_YUV420P).expect("failed to allocate frame");
        let linesizes = *frame.linesizes();

        for (index, rows) in [height, height / 2, height / 2].into_iter().enumerate() {
            let len = linesizes[index] as usize * rows as usize;
            // Safety: the plane holds `linesize * rows` bytes.
            unsafe { std::ptr::write_bytes((*frame.as_mut_ptr()).data[index], 128, len) };
        }

        frame.set_pts(Some(pts));
        frame
    }

    #[test]
    fn test_scaler_rejects_empty_geometry() {
        assert_eq!(
            FrameScaler::new(0, 0, AVPixelFormat::AV_PIX_FMT_YUV420P).err(),
            Some(FfmpegError::Arguments("width, height and pixel_format must be set"))
        );
    }

    #[test]
    fn test_scaler_resizes_and_keeps_pts() {
        let mut scaler = FrameScaler::new(32, 24, AVPixelFormat::AV_PIX_FMT_YUV420P).expect("failed to create scaler");

        let output = scaler
            .scale(&gray_frame(64, 48, 1001), SourceFormat::Native)
            .expect("failed to scale frame");

        assert_eq!((output.width(), output.height()), (32, 24));
        assert_eq!(output.pixel_format(), Some(AVPixelFormat::AV_PIX_FMT_YUV420P));
        assert_eq!(output.pts(), Some(1001));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_scaler_caches_one_context_per_source_format() {
        let mut scaler = FrameScaler::new(64, 48, AVPixelFormat::AV_PIX_FMT_YUV420P)
            .expect("failed to create scaler")
            .with_mismatched_format(AVPixelFormat::AV_PIX_FMT_YUV411P);

        for (pts, format) in [
            (0, SourceFormat::Native),
            (1, SourceFormat::Mismatched),
            (2, SourceFormat::Native),
            (3, SourceFormat::Mismatched),
        ] {
            let output = scaler.scale(&gray_frame(64, 48, pts), format).expect("failed to scale frame");
            assert_eq!(output.pts(), Some(pts));
            assert_eq!(output.pixel_format(), Some(AVPixelFormat::AV_PIX_FMT_YUV420P));
        }

        assert_eq!(scaler.contexts.len(), 2);
        assert_eq!(scaler.mismatched_format(), AVPixelFormat::AV_PIX_FMT_YUV411P);
        assert!(logs_contain("created scaling context"));
    }
}
