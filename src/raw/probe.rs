// The number of slots past the logical capacity that a probe sequence may run into.
//
// Chains that start near the end of the table continue into these slots instead of
// wrapping around to index zero.
pub const OVERFLOW: usize = 31;

// The number of physical slots past the logical capacity, including one trailing
// dummy slot that is never occupied.
pub const PADDING: usize = OVERFLOW + 1;

// Inserts give up once the entry being placed would sit this far from its start slot.
pub const MAX_DISTANCE: u8 = 31;

// Returns the fragment of the hash cached in each slot to filter out mismatches
// before comparing keys.
//
// Bits 12 to 19 are used, as the low bits of the hash usually determine the start slot.
#[inline]
pub fn hash_bits(hash: u32) -> u8 {
    (hash >> 12) as u8
}

// A forward-only linear probe sequence.
//
// The index only ever increases, it never wraps around. Together with the overflow
// slots this keeps every lock acquisition in ascending slot order.
#[derive(Clone, Copy, Debug)]
pub struct Probe {
    // The current slot index.
    pub i: usize,
    // The distance of the current slot from the start slot, plus one.
    pub distance: u8,
}

impl Probe {
    // Start a probe sequence at the given slot.
    #[inline]
    pub fn start(i: usize) -> Probe {
        Probe { i, distance: 1 }
    }

    // Move to the next slot.
    #[inline]
    pub fn next(&mut self) {
        self.i += 1;
        self.distance += 1;
    }

    // Returns the start slot of an entry stored at slot `i` with the given distance.
    #[inline]
    pub fn origin(i: usize, distance: u8) -> usize {
        debug_assert!(distance != 0);
        i + 1 - distance as usize
    }
}

#[test]
fn probe() {
    let mut probe = Probe::start(7);
    assert_eq!((probe.i, probe.distance), (7, 1));

    probe.next();
    probe.next();
    assert_eq!((probe.i, probe.distance), (9, 3));
    assert_eq!(Probe::origin(probe.i, probe.distance), 7);

    assert_eq!(hash_bits(0xABCD_E123), 0xDE);
    assert_eq!(hash_bits(0xFFF), 0);
}
