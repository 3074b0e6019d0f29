use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

use super::lock::SlotLock;
use super::probe::PADDING;

// A table slot.
//
// Slots are stored inline in a single array, each slot's lock next to the data
// it guards. Every field except the lock is only accessed while holding it.
#[repr(C)]
pub struct Node<K, V> {
    pub lock: SlotLock,
    // Zero if the slot is empty, otherwise the distance from the entry's start slot plus one.
    pub distance: UnsafeCell<u8>,
    // Bits 12 to 19 of the entry's hash.
    pub hash_bits: UnsafeCell<u8>,
    pub key: UnsafeCell<MaybeUninit<K>>,
    pub value: UnsafeCell<MaybeUninit<V>>,
}

impl<K, V> Node<K, V> {
    #[inline]
    fn empty() -> Node<K, V> {
        Node {
            lock: SlotLock::new(),
            distance: UnsafeCell::new(0),
            hash_bits: UnsafeCell::new(0),
            key: UnsafeCell::new(MaybeUninit::uninit()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

// The slot array of a table, laid out in a single buffer of `capacity + PADDING` nodes.
pub struct Nodes<K, V> {
    ptr: NonNull<Node<K, V>>,
    capacity: usize,
}

impl<K, V> Nodes<K, V> {
    // The number of physical nodes backing a table of the given capacity.
    #[inline]
    pub fn len_for(capacity: usize) -> usize {
        capacity.checked_add(PADDING).expect("capacity overflow")
    }

    // The buffer layout required for a table of the given capacity.
    pub fn layout(capacity: usize) -> Layout {
        Layout::array::<Node<K, V>>(Self::len_for(capacity)).expect("capacity overflow")
    }

    // The number of bytes required for a table of the given capacity.
    #[inline]
    pub fn memory_of(capacity: usize) -> usize {
        Self::len_for(capacity)
            .checked_mul(mem::size_of::<Node<K, V>>())
            .expect("capacity overflow")
    }

    // Initialize every node of the buffer to an empty, unlocked slot.
    //
    // # Safety
    //
    // `buffer` must be valid for reads and writes of `Nodes::layout(capacity).size()` bytes,
    // aligned to `Nodes::layout(capacity).align()`, and not accessed through any other pointer
    // for as long as the returned `Nodes` is in use.
    pub unsafe fn init(buffer: NonNull<u8>, capacity: usize) -> Nodes<K, V> {
        let ptr = buffer.cast::<Node<K, V>>();
        debug_assert!(ptr.as_ptr().is_aligned());

        for i in 0..Self::len_for(capacity) {
            unsafe { ptr.as_ptr().add(i).write(Node::empty()) };
        }

        Nodes { ptr, capacity }
    }

    // Returns the logical capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Returns the number of physical nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.capacity + PADDING
    }

    // Returns a pointer to the start of the buffer.
    #[inline]
    pub fn buffer(&self) -> NonNull<u8> {
        self.ptr.cast()
    }

    // Returns the node at the given index.
    #[inline]
    pub fn get(&self, i: usize) -> &Node<K, V> {
        assert!(i < self.len(), "probed past the overflow slots");
        unsafe { &*self.ptr.as_ptr().add(i) }
    }

    // Returns a mutable reference to the node at the given index.
    #[inline]
    pub fn get_mut(&mut self, i: usize) -> &mut Node<K, V> {
        assert!(i < self.len(), "probed past the overflow slots");
        unsafe { &mut *self.ptr.as_ptr().add(i) }
    }
}

#[test]
fn layout() {
    use super::probe::OVERFLOW;

    type N = Node<u64, u64>;

    assert_eq!(Nodes::<u64, u64>::len_for(16), 16 + OVERFLOW + 1);
    assert_eq!(Nodes::<u64, u64>::memory_of(16), 48 * mem::size_of::<N>());

    let layout = Nodes::<u64, u64>::layout(16);
    assert_eq!(layout.size(), Nodes::<u64, u64>::memory_of(16));
    assert_eq!(layout.align(), mem::align_of::<N>());

    // The lock lives at the start of the slot, next to the metadata.
    assert_eq!(mem::offset_of!(N, lock), 0);
    assert_eq!(mem::offset_of!(N, distance), 4);
    assert_eq!(mem::offset_of!(N, hash_bits), 5);
}

#[test]
fn init() {
    let layout = Nodes::<u32, String>::layout(4);
    let mut buffer = vec![0u64; layout.size().div_ceil(8)];
    let buffer = NonNull::new(buffer.as_mut_ptr()).unwrap().cast::<u8>();

    let nodes = unsafe { Nodes::<u32, String>::init(buffer, 4) };
    assert_eq!(nodes.capacity(), 4);
    assert_eq!(nodes.len(), 36);

    for i in 0..nodes.len() {
        let node = nodes.get(i);
        assert!(!node.lock.is_locked());
        assert_eq!(unsafe { *node.distance.get() }, 0);
    }
}
