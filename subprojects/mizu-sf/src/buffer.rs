//! The 256-byte command buffer and word cursors over it.
//!
//! Every read and write goes through a word index. Reads past the end of the
//! buffer yield zeros; writes past the end are dropped and recorded so the
//! caller can turn the response into an error instead of faulting.

use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Number of 32-bit words in a command buffer.
pub const COMMAND_BUFFER_WORDS: usize = 0x40;

/// Size of a command buffer in bytes.
pub const COMMAND_BUFFER_SIZE: usize = COMMAND_BUFFER_WORDS * 4;

/// Words per 16-byte alignment unit.
const ALIGN_WORDS: usize = 4;

/// A command buffer as delivered by the kernel.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    words: [u32; COMMAND_BUFFER_WORDS],
}

impl CommandBuffer {
    /// Returns an all-zero buffer.
    pub const fn new() -> Self {
        Self {
            words: [0; COMMAND_BUFFER_WORDS],
        }
    }

    pub const fn from_words(words: [u32; COMMAND_BUFFER_WORDS]) -> Self {
        Self { words }
    }

    pub const fn into_words(self) -> [u32; COMMAND_BUFFER_WORDS] {
        self.words
    }

    pub const fn as_words(&self) -> &[u32; COMMAND_BUFFER_WORDS] {
        &self.words
    }

    /// Returns word `index`, or zero past the end.
    #[inline]
    pub fn word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Sets word `index`. Returns `false` if the index is out of range.
    #[inline]
    pub fn set_word(&mut self, index: usize, value: u32) -> bool {
        match self.words.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Zeroes the whole buffer.
    pub fn clear(&mut self) {
        self.words = [0; COMMAND_BUFFER_WORDS];
    }

    /// Returns a read cursor starting at word `index`.
    pub fn reader(&self, index: usize) -> WordReader<'_> {
        WordReader { buf: self, index }
    }

    /// Returns a write cursor starting at word `index`.
    pub fn writer(&mut self, index: usize) -> WordWriter<'_> {
        WordWriter {
            buf: self,
            index,
            overflowed: false,
        }
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[u32; COMMAND_BUFFER_WORDS]> for CommandBuffer {
    fn from(words: [u32; COMMAND_BUFFER_WORDS]) -> Self {
        Self::from_words(words)
    }
}

impl core::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Trailing zero words are elided.
        let used = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |i| i + 1);
        f.debug_list()
            .entries(self.words[..used].iter().map(|w| format!("{w:#010x}")))
            .finish()
    }
}

/// Rounds a word index up to the next 16-byte boundary.
#[inline]
pub const fn align_up_words(index: usize) -> usize {
    index.div_ceil(ALIGN_WORDS) * ALIGN_WORDS
}

/// Read cursor over a [`CommandBuffer`].
#[derive(Debug, Clone)]
pub struct WordReader<'a> {
    buf: &'a CommandBuffer,
    index: usize,
}

impl WordReader<'_> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Pops one word.
    #[inline]
    pub fn pop_u32(&mut self) -> u32 {
        let word = self.buf.word(self.index);
        self.index += 1;
        word
    }

    /// Pops two words, low then high.
    #[inline]
    pub fn pop_u64(&mut self) -> u64 {
        let low = self.pop_u32() as u64;
        let high = self.pop_u32() as u64;
        low | (high << 32)
    }

    /// Pops `len` bytes, advancing by whole words.
    pub fn pop_bytes(&mut self, len: usize) -> Vec<u8> {
        let words = len.div_ceil(4);
        let mut out = Vec::with_capacity(words * 4);
        for _ in 0..words {
            out.extend_from_slice(&self.pop_u32().to_le_bytes());
        }
        out.truncate(len);
        out
    }

    /// Pops a plain-data value laid out in wire order.
    pub fn pop_raw<T: FromBytes>(&mut self) -> T {
        let bytes = self.pop_bytes(size_of::<T>());
        // The buffer length always matches `size_of::<T>()`.
        match T::read_from_bytes(&bytes) {
            Ok(value) => value,
            Err(_) => T::new_zeroed(),
        }
    }

    /// Advances the cursor by `words`.
    #[inline]
    pub fn skip(&mut self, words: usize) {
        self.index += words;
    }

    /// Advances the cursor to the next 16-byte boundary.
    #[inline]
    pub fn align(&mut self) {
        self.index = align_up_words(self.index);
    }
}

/// Write cursor over a [`CommandBuffer`].
#[derive(Debug)]
pub struct WordWriter<'a> {
    buf: &'a mut CommandBuffer,
    index: usize,
    overflowed: bool,
}

impl WordWriter<'_> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Returns `true` once any write landed past the end of the buffer.
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Pushes one word.
    #[inline]
    pub fn push_u32(&mut self, value: u32) {
        if !self.buf.set_word(self.index, value) {
            self.overflowed = true;
        }
        self.index += 1;
    }

    /// Pushes two words, low then high.
    #[inline]
    pub fn push_u64(&mut self, value: u64) {
        self.push_u32(value as u32);
        self.push_u32((value >> 32) as u32);
    }

    /// Pushes `bytes`, zero-padding the last word.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.push_u32(u32::from_le_bytes(word));
        }
    }

    /// Pushes a plain-data value in wire order.
    pub fn push_raw<T: IntoBytes + Immutable>(&mut self, value: &T) {
        self.push_bytes(value.as_bytes());
    }

    /// Advances the cursor by `words`, zeroing them if `zero` is set.
    pub fn skip(&mut self, words: usize, zero: bool) {
        if zero {
            for _ in 0..words {
                self.push_u32(0);
            }
        } else {
            self.index += words;
        }
    }

    /// Advances to the next 16-byte boundary, writing zeros.
    pub fn align_with_padding(&mut self) {
        let target = align_up_words(self.index);
        while self.index < target {
            self.push_u32(0);
        }
    }
}
