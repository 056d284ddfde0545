use std::ffi::{CStr, CString};

use crate::error::{FfmpegError, FfmpegErrorCode};
use crate::ffi::*;

/// A dictionary of key-value pairs, used to pass options to codecs and muxers.
///
/// Options consumed by ffmpeg are removed from the dictionary, so after a call
/// it only holds the entries that were not recognised.
pub struct Dictionary {
    ptr: *mut AVDictionary,
}

/// Safety: `Dictionary` owns its entries and they are only touched through `&mut self`.
unsafe impl Send for Dictionary {}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        // Safety: `av_dict_free` accepts a null dictionary and clears the pointer.
        unsafe { av_dict_free(&mut self.ptr) };
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

impl Clone for Dictionary {
    fn clone(&self) -> Self {
        let mut dict = Self::new();

        for (key, value) in self.entries() {
            // Keys and values come from another dictionary, so they are valid.
            let _ = dict.set(&key, &value);
        }

        dict
    }
}

impl Dictionary {
    /// Creates a new dictionary.
    pub const fn new() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }

    /// Sets a key-value pair in the dictionary, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), FfmpegError> {
        if key.is_empty() {
            return Err(FfmpegError::Arguments("keys cannot be empty"));
        }

        let key = CString::new(key).map_err(|_| FfmpegError::Arguments("keys cannot contain nul bytes"))?;
        let value = CString::new(value).map_err(|_| FfmpegError::Arguments("values cannot contain nul bytes"))?;

        // Safety: `av_dict_set` copies both strings, which are valid and nul terminated.
        FfmpegErrorCode(unsafe { av_dict_set(&mut self.ptr, key.as_ptr(), value.as_ptr(), 0) }).result()?;
        Ok(())
    }

    /// Creates a dictionary from key-value pairs.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self, FfmpegError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut dict = Self::new();

        for (key, value) in entries {
            dict.set(key.as_ref(), value.as_ref())?;
        }

        Ok(dict)
    }

    /// Returns the value associated with the given key.
    pub fn get(&self, key: &str) -> Option<String> {
        let key = CString::new(key).ok()?;

        // Safety: `av_dict_get` accepts a null dictionary and `key` is nul terminated.
        let entry = unsafe { av_dict_get(self.ptr, key.as_ptr(), std::ptr::null(), 0) };

        // Safety: a non-null entry points into the dictionary, which outlives this call.
        let entry = unsafe { entry.as_ref() }?;

        // Safety: entry values are nul terminated strings owned by the dictionary.
        Some(unsafe { CStr::from_ptr(entry.value) }.to_string_lossy().into_owned())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        // Safety: `av_dict_count` accepts a null dictionary.
        unsafe { av_dict_count(self.ptr) }.max(0) as usize
    }

    /// Returns true if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of every entry in insertion order.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::with_capacity(self.len());
        let mut entry: *const AVDictionaryEntry = std::ptr::null();

        loop {
            // Safety: an empty key with `AV_DICT_IGNORE_SUFFIX` walks every entry after `entry`.
            entry = unsafe { av_dict_get(self.ptr, c"".as_ptr(), entry, AV_DICT_IGNORE_SUFFIX as i32) }.cast_const();

            // Safety: a non-null entry points into the dictionary.
            let Some(current) = (unsafe { entry.as_ref() }) else {
                break;
            };

            // Safety: keys and values are nul terminated strings owned by the dictionary.
            let (key, value) = unsafe { (CStr::from_ptr(current.key), CStr::from_ptr(current.value)) };
            entries.push((key.to_string_lossy().into_owned(), value.to_string_lossy().into_owned()));
        }

        entries
    }

    /// Returns a mutable reference to the pointer, for functions that consume options.
    pub fn as_mut_ptr_ref(&mut self) -> &mut *mut AVDictionary {
        &mut self.ptr
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::Dictionary;
    use crate::error::FfmpegError;

    #[test]
    fn test_dict_set_and_get() {
        let mut dict = Dictionary::new();
        assert!(dict.is_empty());

        dict.set("preset", "fast").expect("valid entry");
        dict.set("x264-params", "keyint=60:min-keyint=60").expect("valid entry");
        dict.set("preset", "slow").expect("valid entry");

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("preset").as_deref(), Some("slow"));
        assert_eq!(dict.get("x264-params").as_deref(), Some("keyint=60:min-keyint=60"));
        assert_eq!(dict.get("crf"), None);
    }

    #[test]
    fn test_dict_rejects_invalid_entries() {
        let mut dict = Dictionary::new();

        assert_eq!(dict.set("", "value"), Err(FfmpegError::Arguments("keys cannot be empty")));
        assert_eq!(
            dict.set("key\0", "value"),
            Err(FfmpegError::Arguments("keys cannot contain nul bytes"))
        );
        assert_eq!(
            dict.set("key", "va\0lue"),
            Err(FfmpegError::Arguments("values cannot contain nul bytes"))
        );
        assert!(dict.is_empty());
    }

    #[test]
    fn test_dict_entries_and_clone() {
        let dict = Dictionary::from_entries([("movflags", "frag_keyframe+empty_moov"), ("strict", "experimental")])
            .expect("valid entries");

        let cloned = dict.clone();
        drop(dict);

        insta::assert_debug_snapshot!(cloned, @r#"
        {
            "movflags": "frag_keyframe+empty_moov",
            "strict": "experimental",
        }
        "#);
    }
}
