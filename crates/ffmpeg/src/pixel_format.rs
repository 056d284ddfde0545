use std::ffi::{CStr, CString};

use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;

/// Looks up a pixel format by its ffmpeg name, such as `yuv420p`.
pub fn from_name(name: &str) -> Result<AVPixelFormat, FfmpegError> {
    let unknown = || FfmpegError::UnknownPixelFormat(name.to_owned());
    let c_name = CString::new(name).map_err(|_| unknown())?;

    // Safety: `av_get_pix_fmt` only reads the nul terminated name.
    match unsafe { av_get_pix_fmt(c_name.as_ptr()) } {
        AVPixelFormat::AV_PIX_FMT_NONE => Err(unknown()),
        format => Ok(format),
    }
}

/// Returns the ffmpeg name of a pixel format.
pub fn name(format: AVPixelFormat) -> Option<&'static str> {
    // Safety: `av_get_pix_fmt_name` returns null or a static string.
    let name = unsafe { av_get_pix_fmt_name(format) };

    if name.is_null() {
        return None;
    }

    // Safety: the pointer is non-null and points to a static nul terminated string.
    unsafe { CStr::from_ptr(name) }.to_str().ok()
}

/// Converts the raw `format` field of a frame into a pixel format.
///
/// Walks ffmpeg's descriptor table, so values it does not know are rejected
/// instead of being transmuted.
pub fn from_raw(raw: i32) -> Option<AVPixelFormat> {
    let mut descriptor: *const AVPixFmtDescriptor = std::ptr::null();

    loop {
        // Safety: `av_pix_fmt_desc_next` accepts null or a descriptor it returned earlier.
        descriptor = unsafe { av_pix_fmt_desc_next(descriptor) };

        if descriptor.is_null() {
            return None;
        }

        // Safety: the descriptor is non-null and comes from ffmpeg's static table.
        let format = unsafe { av_pix_fmt_desc_get_id(descriptor) };
        if format as i32 == raw {
            return Some(format);
        }
    }
}

/// The byte size of each plane of an image with the given format, height and line sizes.
pub fn plane_sizes(format: AVPixelFormat, height: i32, linesizes: &[i32; 8]) -> Result<[usize; 4], FfmpegError> {
    let mut sizes = [0usize; 4];
    let linesizes: [isize; 4] = std::array::from_fn(|i| linesizes[i] as isize);

    // Safety: both arrays hold four elements as `av_image_fill_plane_sizes` requires.
    FfmpegErrorCode(unsafe { av_image_fill_plane_sizes(sizes.as_mut_ptr(), format, height, linesizes.as_ptr()) })
        .result()?;

    Ok(sizes)
}
