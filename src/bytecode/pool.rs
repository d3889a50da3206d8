//! Suffix-interning pool for compiled bytecode sequences: sequences are
//! sorted by descending length and any sequence that is a suffix of an
//! already-interned one shares its storage, rather than being duplicated.

/// A flat byte array plus the offset each interned sequence starts at.
/// Indexing into `bytes[offset..]` and reading up to the sequence's own
/// length reproduces the original sequence — this is the memory-safe
/// equivalent of publishing pointers into a shared C byte array.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BytecodePool {
    pub bytes: Vec<u8>,
}

impl BytecodePool {
    /// Interns every sequence in `sequences`, returning the offset each
    /// one was placed at (same order as the input). Longer sequences are
    /// placed first so a short sequence can be found as a suffix of one
    /// already in the pool.
    pub fn build(sequences: &[Vec<u8>]) -> (BytecodePool, Vec<usize>) {
        let mut order: Vec<usize> = (0..sequences.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(sequences[i].len()));

        let mut pool = BytecodePool::default();
        let mut offsets = vec![0usize; sequences.len()];

        for &i in &order {
            let seq = &sequences[i];
            offsets[i] = pool.intern_one(seq);
        }

        (pool, offsets)
    }

    fn intern_one(&mut self, seq: &[u8]) -> usize {
        if seq.is_empty() {
            return self.bytes.len();
        }
        if let Some(offset) = find_suffix(&self.bytes, seq) {
            return offset;
        }
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(seq);
        offset
    }
}

/// Finds `needle` as a contiguous suffix-aligned run anywhere in
/// `haystack`, i.e. a position where `needle` occurs verbatim and is
/// itself immediately followed by either the end of `haystack` or bytes
/// that happen to continue matching a longer already-interned sequence.
/// In practice (descending-length insertion order) any textual match is a
/// valid share point, since a shorter sequence can only be asked to share
/// storage with something at least as long.
fn find_suffix(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| &haystack[start..start + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_suffix_storage() {
        let long = vec![1, 2, 3, 4];
        let short = vec![3, 4];
        let (pool, offsets) = BytecodePool::build(&[long.clone(), short.clone()]);
        assert_eq!(pool.bytes, long);
        assert_eq!(&pool.bytes[offsets[0]..offsets[0] + long.len()], &long[..]);
        assert_eq!(&pool.bytes[offsets[1]..offsets[1] + short.len()], &short[..]);
    }

    #[test]
    fn disjoint_sequences_both_stored() {
        let a = vec![9, 9];
        let b = vec![1, 2, 3];
        let (pool, offsets) = BytecodePool::build(&[a.clone(), b.clone()]);
        assert_eq!(pool.bytes.len(), a.len() + b.len());
        assert_eq!(&pool.bytes[offsets[0]..offsets[0] + a.len()], &a[..]);
        assert_eq!(&pool.bytes[offsets[1]..offsets[1] + b.len()], &b[..]);
    }

    #[test]
    fn empty_sequence_gets_a_valid_offset() {
        let (pool, offsets) = BytecodePool::build(&[vec![], vec![1, 2]]);
        assert!(offsets[0] <= pool.bytes.len());
    }
}
