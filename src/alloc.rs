//! The allocator used to obtain table buffers.

use std::alloc::{self, Layout};
use std::error::Error;
use std::fmt;
use std::ptr::NonNull;

/// A memory allocator that provides the backing buffer of a [`HashTable`](crate::HashTable).
///
/// The table allocates exactly once, when it is built, and returns the buffer when it is
/// dropped. No allocation happens during lookups, inserts or removals.
///
/// # Safety
///
/// A successful `allocate` must return a pointer valid for reads and writes of
/// `layout.size()` bytes and aligned to `layout.align()`, which stays valid until it
/// is passed to `deallocate`.
pub unsafe trait Allocator {
    /// Allocates a block of memory described by `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Deallocates a block of memory.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global memory allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);

        // Safety: Table layouts are never zero-sized.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError { layout })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// The error returned when an [`Allocator`] fails to provide a table buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    /// Creates an error for a failed allocation of the given layout.
    pub fn new(layout: Layout) -> AllocError {
        AllocError { layout }
    }

    /// The layout that could not be allocated.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory allocation of {} bytes failed",
            self.layout.size()
        )
    }
}

impl Error for AllocError {}
