//! Dictionary-compressed file names
//!
//! All names live in one blob. A byte with the high bit clear is a literal;
//! a byte `b` with the high bit set expands to the pair
//! `dict[b - 0x80], dict[b]`, and either half may itself be a reference.
//! Names are NUL terminated, or cut off after `dict_size - 1` characters.
//!
//! There is no per-name index into the blob: each name starts where the
//! previous one stopped, so names must be decoded strictly in table order.

use super::error::{CatalogError, CatalogResult};

/// Extra expansion stack room beyond two bytes per dictionary pair
const STACK_SLACK: usize = 8;

/// Pair-substitution table shared by every name in a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameDictionary {
    dict_size: u8,
    table: Vec<u8>,
}

impl NameDictionary {
    /// Wrap a `2 * dict_size` byte table
    pub fn new(dict_size: u8, table: Vec<u8>) -> CatalogResult<Self> {
        let expected = usize::from(dict_size) * 2;
        if table.len() != expected {
            return Err(CatalogError::DictionaryLength {
                expected,
                actual: table.len(),
            });
        }
        Ok(Self { dict_size, table })
    }

    /// Declared pair count
    pub fn dict_size(&self) -> u8 {
        self.dict_size
    }

    /// Raw table bytes
    pub fn table(&self) -> &[u8] {
        &self.table
    }

    /// Longest name the dictionary can produce
    pub fn max_name_len(&self) -> usize {
        usize::from(self.dict_size).saturating_sub(1)
    }

    /// Decode the name starting at `cursor` in `blob`.
    ///
    /// Returns the name bytes (without terminator) and the cursor where the
    /// next name begins.
    pub fn decode_name(&self, blob: &[u8], mut cursor: usize) -> CatalogResult<(Vec<u8>, usize)> {
        let limit = self.max_name_len();
        let mut name = Vec::new();
        if limit == 0 {
            return Ok((name, cursor));
        }

        let capacity = self.table.len() + STACK_SLACK;
        let mut stack: Vec<u8> = Vec::with_capacity(capacity);

        loop {
            let byte = if let Some(b) = stack.pop() {
                b
            } else {
                let b = *blob
                    .get(cursor)
                    .ok_or(CatalogError::NameBlobExhausted(cursor))?;
                cursor += 1;
                b
            };

            if byte & 0x80 != 0 {
                if stack.len() + 2 > capacity {
                    return Err(CatalogError::ExpansionOverflow {
                        offset: cursor,
                        capacity,
                    });
                }
                stack.push(self.lookup(byte, usize::from(byte))?);
                stack.push(self.lookup(byte, usize::from(byte - 0x80))?);
                continue;
            }

            if byte == 0 {
                break;
            }
            name.push(byte);
            if name.len() == limit {
                break;
            }
        }

        Ok((name, cursor))
    }

    /// Iterate over the names in `blob` in stored order
    pub fn names<'a>(&'a self, blob: &'a [u8]) -> NameDecoder<'a> {
        NameDecoder {
            dictionary: self,
            blob,
            cursor: 0,
        }
    }

    fn lookup(&self, byte: u8, slot: usize) -> CatalogResult<u8> {
        self.table
            .get(slot)
            .copied()
            .ok_or(CatalogError::DictionaryReference {
                byte,
                dict_len: self.table.len(),
            })
    }
}

/// Sequential decoder over a name blob
///
/// Owns the shared cursor; every call to `next` continues where the previous
/// name ended. The iterator never ends on its own, callers take exactly as
/// many names as the catalog has entries.
#[derive(Debug)]
pub struct NameDecoder<'a> {
    dictionary: &'a NameDictionary,
    blob: &'a [u8],
    cursor: usize,
}

impl NameDecoder<'_> {
    /// Offset of the next undecoded byte in the blob
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for NameDecoder<'_> {
    type Item = CatalogResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(
            self.dictionary
                .decode_name(self.blob, self.cursor)
                .map(|(name, next)| {
                    self.cursor = next;
                    name
                }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Dictionary with `pairs` slots where slot `0x80 + i` expands to
    /// `(low[i], high[i])`
    fn dictionary(dict_size: u8, pairs: &[(u8, u8, u8)]) -> NameDictionary {
        let mut table = vec![0u8; usize::from(dict_size) * 2];
        for &(slot, first, second) in pairs {
            table[usize::from(slot) - 0x80] = first;
            table[usize::from(slot)] = second;
        }
        NameDictionary::new(dict_size, table).expect("table length")
    }

    #[test]
    fn test_literal_names_in_order() {
        let dict = dictionary(0x80, &[]);
        let blob = b"a.bin\0dir/b.dat\0";
        let names: Vec<Vec<u8>> = dict.names(blob).take(2).map(|n| n.unwrap()).collect();
        assert_eq!(names, vec![b"a.bin".to_vec(), b"dir/b.dat".to_vec()]);
    }

    #[test]
    fn test_back_reference_expands_low_half_first() {
        let dict = dictionary(0x80, &[(0x81, b'x', b'y')]);
        let (name, next) = dict.decode_name(&[0x81, b'z', 0], 0).unwrap();
        assert_eq!(name, b"xyz");
        assert_eq!(next, 3);
    }

    #[test]
    fn test_nested_back_references() {
        // 0x82 -> (0x81, 0x81); 0x81 -> ('a', 'b')
        let dict = dictionary(0x80, &[(0x81, b'a', b'b'), (0x82, 0x81, 0x81)]);
        let (name, _) = dict.decode_name(&[0x82, b'/', 0x81, 0], 0).unwrap();
        assert_eq!(name, b"abab/ab");
    }

    #[test]
    fn test_length_limit_stops_without_terminator() {
        let dict = dictionary(4, &[]);
        let (first, next) = dict.decode_name(b"abcdef\0", 0).unwrap();
        assert_eq!(first, b"abc");
        assert_eq!(next, 3);

        let (second, _) = dict.decode_name(b"abcdef\0", next).unwrap();
        assert_eq!(second, b"def");
    }

    #[test]
    fn test_length_limit_discards_pending_expansion() {
        // 0x42 pairs allow 65 characters; the pair's second half is dropped
        let dict = dictionary(0x42, &[(0x80, b'q', b'r')]);
        let mut blob = vec![b'a'; 64];
        blob.extend_from_slice(&[0x80, b's', 0]);

        let (name, next) = dict.decode_name(&blob, 0).unwrap();
        assert_eq!(name.len(), 65);
        assert_eq!(name.last(), Some(&b'q'));
        assert_eq!(next, 65);
    }

    #[test]
    fn test_tiny_dictionary_emits_nothing() {
        for size in [0u8, 1] {
            let dict = dictionary(size, &[]);
            let (name, next) = dict.decode_name(b"abc", 0).unwrap();
            assert!(name.is_empty());
            assert_eq!(next, 0);
        }
    }

    #[test]
    fn test_reference_beyond_dictionary() {
        let dict = dictionary(4, &[]);
        let result = dict.decode_name(&[0x90, 0], 0);
        assert!(matches!(
            result,
            Err(CatalogError::DictionaryReference { byte: 0x90, dict_len: 8 })
        ));
    }

    #[test]
    fn test_self_reference_overflows() {
        // 0x80 -> ('a', 0x80): every expansion leaves one more byte behind
        let dict = dictionary(0x80, &[(0x80, 0x80, b'a')]);
        let result = dict.decode_name(&[0x80], 0);
        assert!(matches!(result, Err(CatalogError::ExpansionOverflow { .. })));
    }

    #[test]
    fn test_blob_exhausted() {
        let dict = dictionary(0x80, &[]);
        let result = dict.decode_name(b"abc", 0);
        assert!(matches!(result, Err(CatalogError::NameBlobExhausted(3))));
    }

    #[test]
    fn test_dictionary_length_checked() {
        let result = NameDictionary::new(4, vec![0; 7]);
        assert!(matches!(
            result,
            Err(CatalogError::DictionaryLength { expected: 8, actual: 7 })
        ));
    }

    proptest! {
        #[test]
        fn prop_literal_blob_round_trips(
            names in prop::collection::vec("[a-z0-9_/.]{0,40}", 1..20),
        ) {
            let dict = dictionary(0x80, &[]);
            let mut blob = Vec::new();
            for name in &names {
                blob.extend_from_slice(name.as_bytes());
                blob.push(0);
            }

            let mut decoder = dict.names(&blob);
            for name in &names {
                let decoded = decoder.next().unwrap().unwrap();
                prop_assert_eq!(decoded, name.as_bytes().to_vec());
            }
            prop_assert_eq!(decoder.position(), blob.len());
        }
    }
}
