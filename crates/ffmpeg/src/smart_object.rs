use std::ptr::NonNull;

/// An owned, non-null ffmpeg pointer that runs its destructor on drop.
pub(crate) struct SmartPtr<T> {
    ptr: NonNull<T>,
    destructor: fn(&mut *mut T),
}

impl<T> std::fmt::Debug for SmartPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SmartPtr").field(&self.ptr).finish()
    }
}

impl<T> SmartPtr<T> {
    /// Wraps `ptr`, returning `None` if it is null.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes for as long as the `SmartPtr`
    /// lives, and `destructor` must be the matching way to release it.
    pub(crate) unsafe fn wrap_non_null(ptr: *mut T, destructor: fn(&mut *mut T)) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, destructor })
    }

    pub(crate) const fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub(crate) const fn as_deref(&self) -> &T {
        // Safety: the pointer is non-null and valid for the lifetime of `self`.
        unsafe { self.ptr.as_ref() }
    }

    pub(crate) fn as_deref_mut(&mut self) -> &mut T {
        // Safety: the pointer is non-null and valid for the lifetime of `self`.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for SmartPtr<T> {
    fn drop(&mut self) {
        let mut ptr = self.ptr.as_ptr();
        (self.destructor)(&mut ptr);
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::SmartPtr;

    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    fn free_box(ptr: &mut *mut i32) {
        // Safety: the pointer was created by `Box::into_raw` in the tests below.
        drop(unsafe { Box::from_raw(*ptr) });
        *ptr = std::ptr::null_mut();
        DROPPED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_smart_ptr_wrap_non_null_is_null() {
        // Safety: a null pointer is rejected before it is ever used.
        let result = unsafe { SmartPtr::<i32>::wrap_non_null(std::ptr::null_mut(), |_| {}) };

        assert!(result.is_none(), "Expected `wrap_non_null` to return None for a null pointer");
    }

    #[test]
    fn test_smart_ptr_lifecycle() {
        let before = DROPPED.load(Ordering::SeqCst);

        // Safety: the pointer comes from `Box::into_raw` and `free_box` releases it.
        let mut ptr = unsafe { SmartPtr::wrap_non_null(Box::into_raw(Box::new(41)), free_box) }.expect("non-null");
        *ptr.as_deref_mut() += 1;
        assert_eq!(*ptr.as_deref(), 42);
        drop(ptr);
        assert_eq!(DROPPED.load(Ordering::SeqCst), before + 1);
    }
}
