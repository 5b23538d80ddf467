//! Per-term postings and the blocks that hold them
//!
//! One term's postings, documents in impact order:
//!
//! ```text
//! doc   := vbyte(zigzag(doc_id - prev_doc_id)) field+
//! field := [field_id | 0x80 on the last field][vbyte tf][vbyte position_gap]*tf
//! ```

use serde::{Deserialize, Serialize};

use super::varint::{decode_vbyte, decode_vbyte_u64, encode_vbyte, encode_vbyte_u64};
use super::varint::{zigzag_decode, zigzag_encode};
use crate::error::{MorselError, Result};

const LAST_FIELD_FLAG: u8 = 0x80;

/// Name of the postings block file with the given id
pub fn pl_file_name(block_id: u32) -> String {
    format!("pl_{}", block_id)
}

/// Occurrences of a term inside one field of one document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPostings {
    pub field_id: u8,
    /// Ascending token positions; the field term frequency is their count
    pub positions: Vec<u32>,
}

impl FieldPostings {
    pub fn new(field_id: u8, positions: Vec<u32>) -> Self {
        Self {
            field_id,
            positions,
        }
    }

    pub fn term_freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// All occurrences of a term inside one document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDoc {
    pub doc_id: u32,
    pub fields: Vec<FieldPostings>,
}

impl TermDoc {
    pub fn field(&self, field_id: u8) -> Option<&FieldPostings> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }
}

/// Append the postings of one term, documents in the order given
pub fn encode_term_postings(docs: &[TermDoc], out: &mut Vec<u8>) -> Result<()> {
    let mut prev_doc_id = 0i64;

    for doc in docs {
        if doc.fields.is_empty() {
            return Err(MorselError::Internal(format!(
                "document {} has no field postings",
                doc.doc_id
            )));
        }
        encode_vbyte_u64(zigzag_encode(doc.doc_id as i64 - prev_doc_id), out);
        prev_doc_id = doc.doc_id as i64;

        let last = doc.fields.len() - 1;
        for (i, field) in doc.fields.iter().enumerate() {
            if field.field_id >= LAST_FIELD_FLAG || field.positions.is_empty() {
                return Err(MorselError::Internal(format!(
                    "invalid postings for field {} of document {}",
                    field.field_id, doc.doc_id
                )));
            }
            out.push(if i == last {
                field.field_id | LAST_FIELD_FLAG
            } else {
                field.field_id
            });
            encode_vbyte(field.term_freq(), out);

            let mut prev_pos = 0u32;
            for &pos in &field.positions {
                let gap = pos.checked_sub(prev_pos).ok_or_else(|| {
                    MorselError::Internal("positions must be ascending".to_string())
                })?;
                encode_vbyte(gap, out);
                prev_pos = pos;
            }
        }
    }

    Ok(())
}

/// Decode every document of one term's postings slice
pub fn decode_term_postings(input: &[u8]) -> Result<Vec<TermDoc>> {
    let mut pos = 0;
    let mut prev_doc_id = 0i64;
    let mut docs = Vec::new();

    while pos < input.len() {
        let delta = zigzag_decode(decode_vbyte_u64(input, &mut pos)?);
        let doc_id = prev_doc_id + delta;
        if doc_id < 0 || doc_id > u32::MAX as i64 {
            return Err(MorselError::format(format!("doc id {} out of range", doc_id)));
        }
        prev_doc_id = doc_id;

        let mut fields = Vec::new();
        loop {
            let tag = *input
                .get(pos)
                .ok_or_else(|| MorselError::format("postings truncated inside a document"))?;
            pos += 1;
            let tf = decode_vbyte(input, &mut pos)?;
            if tf == 0 {
                return Err(MorselError::format("zero term frequency in postings"));
            }

            let mut positions = Vec::with_capacity(tf as usize);
            let mut current = 0u32;
            for _ in 0..tf {
                let gap = decode_vbyte(input, &mut pos)?;
                current = current
                    .checked_add(gap)
                    .ok_or_else(|| MorselError::format("position overflow in postings"))?;
                positions.push(current);
            }
            fields.push(FieldPostings::new(tag & !LAST_FIELD_FLAG, positions));

            if tag & LAST_FIELD_FLAG != 0 {
                break;
            }
        }

        docs.push(TermDoc {
            doc_id: doc_id as u32,
            fields,
        });
    }

    Ok(docs)
}

/// Location of one term's postings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostingsLocation {
    pub block_id: u32,
    pub offset: u32,
    pub length: u32,
}

/// Packs per-term postings into blocks of at most `pl_limit` bytes.
///
/// A term never spans blocks. A term larger than the limit gets a block of
/// its own.
pub struct PostingsBlockWriter {
    pl_limit: usize,
    blocks: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl PostingsBlockWriter {
    pub fn new(pl_limit: usize) -> Self {
        Self {
            pl_limit: pl_limit.max(1),
            blocks: Vec::new(),
            current: Vec::new(),
        }
    }

    pub fn add_term(&mut self, postings: &[u8]) -> PostingsLocation {
        if !self.current.is_empty() && self.current.len() + postings.len() > self.pl_limit {
            self.blocks.push(std::mem::take(&mut self.current));
        }
        let location = PostingsLocation {
            block_id: self.blocks.len() as u32,
            offset: self.current.len() as u32,
            length: postings.len() as u32,
        };
        self.current.extend_from_slice(postings);
        location
    }

    /// Blocks in id order; the last one is emitted even when empty so an
    /// index always has `pl_0`
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.blocks.push(self.current);
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(doc_id: u32, fields: &[(u8, &[u32])]) -> TermDoc {
        TermDoc {
            doc_id,
            fields: fields
                .iter()
                .map(|(id, pos)| FieldPostings::new(*id, pos.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_roundtrip_impact_order() {
        // Impact order means doc ids can go backwards
        let docs = vec![
            doc(7, &[(2, &[0, 4, 9])]),
            doc(2, &[(0, &[1]), (2, &[3, 300])]),
            doc(40, &[(1, &[12])]),
        ];
        let mut bytes = Vec::new();
        encode_term_postings(&docs, &mut bytes).unwrap();
        assert_eq!(decode_term_postings(&bytes).unwrap(), docs);
    }

    #[test]
    fn test_last_field_flag_layout() {
        let mut bytes = Vec::new();
        encode_term_postings(&[doc(1, &[(0, &[2]), (3, &[5])])], &mut bytes).unwrap();
        // zigzag(1) = 2, high bit set on the single byte
        assert_eq!(bytes, vec![0x82, 0x00, 0x81, 0x82, 0x83, 0x81, 0x85]);
    }

    #[test]
    fn test_truncated_postings_is_format_error() {
        let mut bytes = Vec::new();
        encode_term_postings(&[doc(3, &[(1, &[1, 2])])], &mut bytes).unwrap();
        bytes.pop();
        assert!(matches!(
            decode_term_postings(&bytes),
            Err(MorselError::Format(_))
        ));
    }

    #[test]
    fn test_rejects_unsorted_positions() {
        let mut bytes = Vec::new();
        assert!(encode_term_postings(&[doc(0, &[(0, &[5, 1])])], &mut bytes).is_err());
    }

    #[test]
    fn test_block_rotation() {
        let mut writer = PostingsBlockWriter::new(10);
        let a = writer.add_term(&[1; 6]);
        let b = writer.add_term(&[2; 4]);
        let c = writer.add_term(&[3; 3]);
        let huge = writer.add_term(&[4; 25]);
        let d = writer.add_term(&[5; 1]);

        assert_eq!((a.block_id, a.offset), (0, 0));
        assert_eq!((b.block_id, b.offset), (0, 6));
        assert_eq!((c.block_id, c.offset), (1, 0));
        assert_eq!((huge.block_id, huge.offset, huge.length), (2, 0, 25));
        assert_eq!((d.block_id, d.offset), (3, 0));

        let blocks = writer.finish();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].len(), 10);
        assert_eq!(blocks[2].len(), 25);
    }

    #[test]
    fn test_empty_writer_still_emits_block() {
        let blocks = PostingsBlockWriter::new(100).finish();
        assert_eq!(blocks, vec![Vec::<u8>::new()]);
    }
}
