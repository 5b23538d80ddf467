//! Dictionary string and table streams
//!
//! String stream grammar:
//!
//! ```text
//! record := plain | run
//! plain  := len:u8 (1..=255) bytes[len]
//! run    := 0x00 '{' prefix_len:u8 prefix '*' suffix ('&' suffix)* '}'
//! suffix := len:u8 bytes[len]
//! ```
//!
//! Table stream, one record per term in the same order:
//!
//! ```text
//! [delta_block_id:u8][vbyte doc_freq][vbyte postings_length][vbyte postings_offset][f32 LE max_term_score]
//! ```

use serde::{Deserialize, Serialize};

use super::varint::{decode_vbyte, encode_vbyte, read_f32_le};
use crate::error::{MorselError, Result};

const RUN_TAG: u8 = 0x00;
const RUN_OPEN: u8 = b'{';
const RUN_CLOSE: u8 = b'}';
const RUN_FIRST: u8 = b'*';
const RUN_NEXT: u8 = b'&';

fn is_sentinel(byte: u8) -> bool {
    matches!(byte, RUN_OPEN | RUN_CLOSE | RUN_FIRST | RUN_NEXT)
}

/// Postings location and statistics of one dictionary term
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TermInfo {
    pub doc_freq: u32,
    pub postings_block_id: u32,
    /// Byte offset inside the block; always below 65,536
    pub postings_offset: u32,
    pub postings_length: u32,
    /// Highest score any single document reaches for this term
    pub max_term_score: f32,
}

/// Longest common prefix at a char boundary: (byte length, char count)
fn common_prefix(a: &str, b: &str) -> (usize, usize) {
    let mut bytes = 0;
    let mut chars = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        bytes += ca.len_utf8();
        chars += 1;
    }
    (bytes, chars)
}

fn check_term(term: &str) -> Result<()> {
    if term.is_empty() || term.len() > u8::MAX as usize {
        return Err(MorselError::Internal(format!(
            "dictionary term length {} outside 1..=255",
            term.len()
        )));
    }
    if term.bytes().any(is_sentinel) {
        return Err(MorselError::Internal(format!(
            "dictionary term '{}' contains a front-coding sentinel",
            term
        )));
    }
    Ok(())
}

fn push_suffix(out: &mut Vec<u8>, suffix: &[u8]) {
    out.push(suffix.len() as u8);
    out.extend_from_slice(suffix);
}

/// Front-code a strictly sorted term list.
///
/// A run starts where a term shares more than `min_prefix - 1` chars with
/// the next one. Following terms join while they share the whole prefix,
/// or all but its last char (the prefix then shrinks by one), as long as
/// the prefix stays at least `min_prefix` chars.
pub fn encode_term_strings(terms: &[&str], min_prefix: usize) -> Result<Vec<u8>> {
    let min_prefix = min_prefix.max(1);
    let mut out = Vec::new();
    let mut i = 0;

    while i < terms.len() {
        check_term(terms[i])?;

        let mut run_end = i + 1;
        let mut prefix = (0usize, 0usize);
        if i + 1 < terms.len() {
            let (bytes, chars) = common_prefix(terms[i], terms[i + 1]);
            if chars >= min_prefix {
                prefix = (bytes, chars);
                run_end = i + 2;
                while run_end < terms.len() {
                    let (b, c) = common_prefix(&terms[i][..prefix.0], terms[run_end]);
                    if b == prefix.0 {
                        run_end += 1;
                    } else if c + 1 == prefix.1 && c >= min_prefix {
                        prefix = (b, c);
                        run_end += 1;
                    } else {
                        break;
                    }
                }
            }
        }

        if run_end - i >= 2 {
            let prefix_bytes = &terms[i].as_bytes()[..prefix.0];
            out.push(RUN_TAG);
            out.push(RUN_OPEN);
            push_suffix(&mut out, prefix_bytes);
            for (k, term) in terms[i..run_end].iter().enumerate() {
                check_term(term)?;
                out.push(if k == 0 { RUN_FIRST } else { RUN_NEXT });
                push_suffix(&mut out, &term.as_bytes()[prefix.0..]);
            }
            out.push(RUN_CLOSE);
        } else {
            push_suffix(&mut out, terms[i].as_bytes());
        }

        i = run_end;
    }

    Ok(out)
}

/// Encode the fixed-layout table; `infos` must follow sorted term order
pub fn encode_term_table(infos: &[TermInfo]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(infos.len() * 8);
    let mut prev_block_id = 0u32;

    for info in infos {
        let delta = info
            .postings_block_id
            .checked_sub(prev_block_id)
            .filter(|d| *d <= u8::MAX as u32)
            .ok_or_else(|| {
                MorselError::Internal(format!(
                    "postings block id {} cannot follow {}",
                    info.postings_block_id, prev_block_id
                ))
            })?;
        out.push(delta as u8);
        encode_vbyte(info.doc_freq, &mut out);
        encode_vbyte(info.postings_length, &mut out);
        encode_vbyte(info.postings_offset, &mut out);
        out.extend_from_slice(&info.max_term_score.to_le_bytes());
        prev_block_id = info.postings_block_id;
    }

    Ok(out)
}

/// Front-coding decode state
#[derive(Clone, Debug)]
enum FrontCodingState {
    Idle,
    InRun { active_prefix: Vec<u8> },
}

/// Forward-only decoder over the two dictionary streams
pub struct DictionaryReader<'a> {
    strings: &'a [u8],
    table: &'a [u8],
    spos: usize,
    tpos: usize,
    state: FrontCodingState,
    prev_block_id: u32,
}

impl<'a> DictionaryReader<'a> {
    pub fn new(strings: &'a [u8], table: &'a [u8]) -> Self {
        Self {
            strings,
            table,
            spos: 0,
            tpos: 0,
            state: FrontCodingState::Idle,
            prev_block_id: 0,
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .strings
            .get(self.spos)
            .ok_or_else(|| MorselError::format("dictionary string stream truncated"))?;
        self.spos += 1;
        Ok(byte)
    }

    fn expect(&mut self, tag: u8) -> Result<()> {
        let byte = self.read_byte()?;
        if byte != tag {
            return Err(MorselError::format(format!(
                "front-coding tag mismatch at byte {}: expected '{}', found 0x{:02x}",
                self.spos - 1,
                tag as char,
                byte
            )));
        }
        Ok(())
    }

    fn read_suffix(&mut self) -> Result<&'a [u8]> {
        let len = self.read_byte()? as usize;
        let end = self.spos + len;
        let bytes = self
            .strings
            .get(self.spos..end)
            .ok_or_else(|| MorselError::format("dictionary term truncated"))?;
        if bytes.iter().copied().any(is_sentinel) {
            return Err(MorselError::format(format!(
                "unresolved front-coding sentinel inside term at byte {}",
                self.spos
            )));
        }
        self.spos = end;
        Ok(bytes)
    }

    fn to_term(bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes).map_err(|_| MorselError::format("dictionary term is not UTF-8"))
    }

    fn next_term(&mut self) -> Result<Option<String>> {
        loop {
            match std::mem::replace(&mut self.state, FrontCodingState::Idle) {
                FrontCodingState::Idle => {
                    if self.spos >= self.strings.len() {
                        return Ok(None);
                    }
                    if self.strings[self.spos] == RUN_TAG {
                        self.spos += 1;
                        self.expect(RUN_OPEN)?;
                        let prefix = self.read_suffix()?.to_vec();
                        self.expect(RUN_FIRST)?;
                        let suffix = self.read_suffix()?;
                        let mut term = prefix.clone();
                        term.extend_from_slice(suffix);
                        self.state = FrontCodingState::InRun {
                            active_prefix: prefix,
                        };
                        return Self::to_term(term).map(Some);
                    }
                    let bytes = self.read_suffix()?;
                    if bytes.is_empty() {
                        return Err(MorselError::format("empty dictionary term"));
                    }
                    return Self::to_term(bytes.to_vec()).map(Some);
                }
                FrontCodingState::InRun { active_prefix } => {
                    let tag = self.read_byte().map_err(|_| {
                        MorselError::format("front-coded run is not terminated")
                    })?;
                    match tag {
                        RUN_NEXT => {
                            let suffix = self.read_suffix()?;
                            let mut term = active_prefix.clone();
                            term.extend_from_slice(suffix);
                            self.state = FrontCodingState::InRun { active_prefix };
                            return Self::to_term(term).map(Some);
                        }
                        RUN_CLOSE => continue,
                        other => {
                            return Err(MorselError::format(format!(
                                "unexpected byte 0x{:02x} inside front-coded run",
                                other
                            )))
                        }
                    }
                }
            }
        }
    }

    fn next_info(&mut self) -> Result<TermInfo> {
        let delta = *self
            .table
            .get(self.tpos)
            .ok_or_else(|| MorselError::format("dictionary table truncated"))?;
        self.tpos += 1;
        let doc_freq = decode_vbyte(self.table, &mut self.tpos)?;
        let postings_length = decode_vbyte(self.table, &mut self.tpos)?;
        let postings_offset = decode_vbyte(self.table, &mut self.tpos)?;
        let max_term_score = read_f32_le(self.table, &mut self.tpos)?;
        let postings_block_id = self.prev_block_id + delta as u32;
        self.prev_block_id = postings_block_id;

        Ok(TermInfo {
            doc_freq,
            postings_block_id,
            postings_offset,
            postings_length,
            max_term_score,
        })
    }

    /// Decode the next (term, info) pair, or `None` at the end of both streams
    pub fn next_entry(&mut self) -> Result<Option<(String, TermInfo)>> {
        match self.next_term()? {
            Some(term) => {
                let info = self.next_info()?;
                Ok(Some((term, info)))
            }
            None => {
                if self.tpos != self.table.len() {
                    return Err(MorselError::format(
                        "dictionary table has more records than the string stream",
                    ));
                }
                Ok(None)
            }
        }
    }
}

/// Decode both streams completely, checking strict sort order
pub fn decode_dictionary(strings: &[u8], table: &[u8]) -> Result<Vec<(String, TermInfo)>> {
    let mut reader = DictionaryReader::new(strings, table);
    let mut entries: Vec<(String, TermInfo)> = Vec::new();
    while let Some((term, info)) = reader.next_entry()? {
        if let Some((prev, _)) = entries.last() {
            if prev.as_str() >= term.as_str() {
                return Err(MorselError::format(format!(
                    "dictionary terms out of order: '{}' then '{}'",
                    prev, term
                )));
            }
        }
        entries.push((term, info));
    }
    Ok(entries)
}
