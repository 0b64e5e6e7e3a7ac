/// Per-row validity bits for a column.
///
/// Bits are stored little-endian within each `u64` word: row 0 is the LSB of word 0. A set bit
/// means the row holds a value; a cleared bit means null.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validity {
    words: Vec<u64>,
    len: usize,
    valid: usize,
}

impl Validity {
    pub fn new() -> Self {
        Self::default()
    }

    /// `len` rows that are all valid (`valid == true`) or all null.
    pub fn with_len(len: usize, valid: bool) -> Self {
        let mut out = Self::new();
        out.extend_constant(len, valid);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn null_count(&self) -> usize {
        self.len - self.valid
    }

    pub fn push(&mut self, valid: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }
        if valid {
            if let Some(word) = self.words.last_mut() {
                *word |= 1u64 << bit;
            }
            self.valid += 1;
        }
        self.len += 1;
    }

    pub fn extend_constant(&mut self, n: usize, valid: bool) {
        self.words.reserve((n + 63) / 64);
        for _ in 0..n {
            self.push(valid);
        }
    }

    pub fn is_valid(&self, row: usize) -> bool {
        debug_assert!(row < self.len, "validity index out of bounds");
        (self.words[row / 64] >> (row % 64)) & 1 == 1
    }

    pub fn set(&mut self, row: usize, valid: bool) {
        debug_assert!(row < self.len, "validity index out of bounds");
        let mask = 1u64 << (row % 64);
        let word = &mut self.words[row / 64];
        let was_valid = *word & mask != 0;
        if was_valid && !valid {
            *word &= !mask;
            self.valid -= 1;
        } else if !was_valid && valid {
            *word |= mask;
            self.valid += 1;
        }
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
        self.valid = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |row| self.is_valid(row))
    }
}
