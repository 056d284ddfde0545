use defects_core::media::Timestamped;

use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;
use crate::pixel_format;
use crate::smart_object::SmartPtr;
use crate::utils::{check_i64, or_nopts};

/// A video frame. Thin wrapper around [`AVFrame`].
pub struct VideoFrame(SmartPtr<AVFrame>);

/// Safety: `VideoFrame` is safe to send between threads.
unsafe impl Send for VideoFrame {}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.pixel_format().and_then(pixel_format::name))
            .field("pts", &self.pts())
            .finish()
    }
}

impl VideoFrame {
    /// Creates a new frame without any buffers.
    pub fn new() -> Result<Self, FfmpegError> {
        // Safety: `av_frame_alloc` is safe to call.
        let frame = unsafe { av_frame_alloc() };

        // Safety: the pointer comes from `av_frame_alloc` and `av_frame_free` releases it.
        unsafe { SmartPtr::wrap_non_null(frame, |ptr| av_frame_free(ptr)) }
            .map(Self)
            .ok_or(FfmpegError::Alloc)
    }

    /// Creates a frame with freshly allocated buffers for the given geometry and format.
    ///
    /// The buffers are not initialised.
    pub fn alloc(width: i32, height: i32, format: AVPixelFormat) -> Result<Self, FfmpegError> {
        if width <= 0 || height <= 0 || format == AVPixelFormat::AV_PIX_FMT_NONE {
            return Err(FfmpegError::Arguments("width, height and pixel_format must be set"));
        }

        let mut frame = Self::new()?;

        let frame_mut = frame.0.as_deref_mut();
        frame_mut.width = width;
        frame_mut.height = height;
        frame_mut.format = format as i32;

        // Safety: the frame has its geometry and format set and no buffers yet.
        FfmpegErrorCode(unsafe { av_frame_get_buffer(frame.as_mut_ptr(), 32) }).result()?;

        Ok(frame)
    }

    /// Returns a pointer to the frame.
    pub const fn as_ptr(&self) -> *const AVFrame {
        self.0.as_ptr()
    }

    /// Returns a mutable pointer to the frame.
    pub fn as_mut_ptr(&mut self) -> *mut AVFrame {
        self.0.as_mut_ptr()
    }

    /// Returns the width of the frame.
    pub const fn width(&self) -> i32 {
        self.0.as_deref().width
    }

    /// Returns the height of the frame.
    pub const fn height(&self) -> i32 {
        self.0.as_deref().height
    }

    /// Returns the pixel format of the frame, `None` if it is unset or unknown.
    pub fn pixel_format(&self) -> Option<AVPixelFormat> {
        pixel_format::from_raw(self.0.as_deref().format)
    }

    /// Returns the line size of every plane.
    pub const fn linesizes(&self) -> &[i32; 8] {
        &self.0.as_deref().linesize
    }

    /// Copies the raw planes of this frame into a new frame tagged with `format`.
    ///
    /// The bytes are not converted, so the result shows the same data decoded
    /// with the wrong layout. Each destination plane receives as many bytes as
    /// both planes hold and the remainder is zeroed. Timestamps are carried over.
    pub fn reinterpret(&self, format: AVPixelFormat) -> Result<Self, FfmpegError> {
        let source_format = self
            .pixel_format()
            .ok_or(FfmpegError::Arguments("frame has no pixel format"))?;

        let mut target = Self::alloc(self.width(), self.height(), format)?;

        let source_sizes = pixel_format::plane_sizes(source_format, self.height(), self.linesizes())?;
        let target_sizes = pixel_format::plane_sizes(format, target.height(), target.linesizes())?;

        let source = self.0.as_deref();
        let target_mut = target.0.as_deref_mut();

        for plane in 0..4 {
            let source_data = source.data[plane];
            let target_data = target_mut.data[plane];

            if target_data.is_null() {
                continue;
            }

            let copied = if source_data.is_null() {
                0
            } else {
                source_sizes[plane].min(target_sizes[plane])
            };

            if copied > 0 {
                // Safety: both planes hold at least `copied` bytes and never overlap.
                unsafe { std::ptr::copy_nonoverlapping(source_data, target_data, copied) };
            }

            // Safety: the target plane holds `target_sizes[plane]` bytes.
            unsafe { std::ptr::write_bytes(target_data.add(copied), 0, target_sizes[plane] - copied) };
        }

        target.set_pts(self.pts());

        Ok(target)
    }
}

impl Timestamped for VideoFrame {
    fn pts(&self) -> Option<i64> {
        check_i64(self.0.as_deref().pts)
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        let frame = self.0.as_deref_mut();
        frame.pts = or_nopts(pts);
        frame.best_effort_timestamp = or_nopts(pts);
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use defects_core::media::Timestamped;
    use rand::Rng;

    use super::VideoFrame;
    use crate::error::FfmpegError;
    use crate::ffi::AVPixelFormat;

    fn plane(frame: &VideoFrame, index: usize, len: usize) -> &[u8] {
        // Safety: the callers only ask for bytes inside the allocated plane.
        unsafe { std::slice::from_raw_parts((*frame.as_ptr()).data[index], len) }
    }

    #[test]
    fn test_frame_alloc() {
        let mut frame = VideoFrame::alloc(64, 48, AVPixelFormat::AV_PIX_FMT_YUV420P).expect("failed to allocate frame");
        frame.set_pts(Some(12));

        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.pixel_format(), Some(AVPixelFormat::AV_PIX_FMT_YUV420P));
        assert!(frame.linesizes()[0] >= 64);

        insta::assert_debug_snapshot!(frame, @r#"
        VideoFrame {
            width: 64,
            height: 48,
            format: Some(
                "yuv420p",
            ),
            pts: Some(
                12,
            ),
        }
        "#);
    }

    #[test]
    fn test_frame_alloc_rejects_empty_geometry() {
        assert_eq!(
            VideoFrame::alloc(0, 48, AVPixelFormat::AV_PIX_FMT_YUV420P).err(),
            Some(FfmpegError::Arguments("width, height and pixel_format must be set"))
        );
        assert!(VideoFrame::new().expect("failed to allocate frame").pixel_format().is_none());
    }

    #[test]
    fn test_frame_reinterpret_copies_raw_planes() {
        let mut frame = VideoFrame::alloc(64, 48, AVPixelFormat::AV_PIX_FMT_YUV420P).expect("failed to allocate frame");
        frame.set_pts(Some(99));

        let mut rng = rand::thread_rng();
        let linesizes = *frame.linesizes();
        let heights = [48, 24, 24];
        for (index, rows) in heights.into_iter().enumerate() {
            let len = linesizes[index] as usize * rows;
            // Safety: the plane holds `linesize * rows` bytes.
            let data = unsafe { std::slice::from_raw_parts_mut((*frame.as_mut_ptr()).data[index], len) };
            rng.fill(data);
        }

        let mismatched = frame
            .reinterpret(AVPixelFormat::AV_PIX_FMT_YUV411P)
            .expect("failed to reinterpret frame");

        assert_eq!(mismatched.pixel_format(), Some(AVPixelFormat::AV_PIX_FMT_YUV411P));
        assert_eq!((mismatched.width(), mismatched.height()), (64, 48));
        assert_eq!(mismatched.pts(), Some(99));

        let luma = linesizes[0] as usize * 48;
        assert_eq!(plane(&mismatched, 0, luma), plane(&frame, 0, luma));

        // the 4:2:0 chroma plane is shorter than the 4:1:1 one, the tail is zeroed
        let source_chroma = linesizes[1] as usize * 24;
        let target_chroma = mismatched.linesizes()[1] as usize * 48;
        let copied = source_chroma.min(target_chroma);
        assert_eq!(plane(&mismatched, 1, copied), plane(&frame, 1, copied));
        assert!(plane(&mismatched, 1, target_chroma)[copied..].iter().all(|&b| b == 0));
    }
}
