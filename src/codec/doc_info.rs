//! Per-document normalization factors
//!
//! Binary layout: `[u32 LE num_docs][u16 LE num_fields]` then
//! `num_docs * num_fields` f64 LE values, document major.
//! Text layout: `num_docs` on the first line, then one comma-separated line
//! of factors per document.

use crate::config::DocInfoFormat;
use crate::error::{MorselError, Result};

/// Normalization factors of every document, indexed by doc id then field id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocInfo {
    num_fields: usize,
    factors: Vec<f64>,
}

impl DocInfo {
    pub fn new(num_docs: usize, num_fields: usize) -> Self {
        Self {
            num_fields,
            factors: vec![0.0; num_docs * num_fields],
        }
    }

    pub fn num_docs(&self) -> usize {
        if self.num_fields == 0 {
            0
        } else {
            self.factors.len() / self.num_fields
        }
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /// Factors of one document, or `None` past the last doc id
    pub fn factors(&self, doc_id: u32) -> Option<&[f64]> {
        let start = doc_id as usize * self.num_fields;
        self.factors.get(start..start + self.num_fields)
    }

    /// Factor of one field; unknown documents or fields read as 0
    pub fn factor(&self, doc_id: u32, field_id: u8) -> f64 {
        self.factors(doc_id)
            .and_then(|f| f.get(field_id as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Overwrite one document's factors, growing the table as needed
    pub fn set_factors(&mut self, doc_id: u32, factors: &[f64]) {
        let start = doc_id as usize * self.num_fields;
        let end = start + self.num_fields;
        if self.factors.len() < end {
            self.factors.resize(end, 0.0);
        }
        let n = factors.len().min(self.num_fields);
        self.factors[start..start + n].copy_from_slice(&factors[..n]);
    }

    pub fn encode(&self, format: DocInfoFormat) -> Vec<u8> {
        match format {
            DocInfoFormat::Binary => {
                let mut out = Vec::with_capacity(6 + self.factors.len() * 8);
                out.extend_from_slice(&(self.num_docs() as u32).to_le_bytes());
                out.extend_from_slice(&(self.num_fields as u16).to_le_bytes());
                for value in &self.factors {
                    out.extend_from_slice(&value.to_le_bytes());
                }
                out
            }
            DocInfoFormat::Text => {
                let mut out = format!("{}\n", self.num_docs());
                for doc in self.factors.chunks(self.num_fields.max(1)) {
                    let line: Vec<String> = doc.iter().map(|v| v.to_string()).collect();
                    out.push_str(&line.join(","));
                    out.push('\n');
                }
                out.into_bytes()
            }
        }
    }

    /// Decode either layout; `num_fields` must match the field set
    pub fn decode(input: &[u8], format: DocInfoFormat, num_fields: usize) -> Result<Self> {
        match format {
            DocInfoFormat::Binary => Self::decode_binary(input, num_fields),
            DocInfoFormat::Text => Self::decode_text(input, num_fields),
        }
    }

    fn decode_binary(input: &[u8], num_fields: usize) -> Result<Self> {
        if input.len() < 6 {
            return Err(MorselError::format("docInfo header truncated"));
        }
        let num_docs = u32::from_le_bytes([input[0], input[1], input[2], input[3]]) as usize;
        let stored_fields = u16::from_le_bytes([input[4], input[5]]) as usize;
        if stored_fields != num_fields {
            return Err(MorselError::format(format!(
                "docInfo has {} fields, field info has {}",
                stored_fields, num_fields
            )));
        }

        let body = &input[6..];
        if body.len() != num_docs * num_fields * 8 {
            return Err(MorselError::format(format!(
                "docInfo body is {} bytes, expected {}",
                body.len(),
                num_docs * num_fields * 8
            )));
        }

        let factors = body
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        Ok(Self {
            num_fields,
            factors,
        })
    }

    fn decode_text(input: &[u8], num_fields: usize) -> Result<Self> {
        let text =
            std::str::from_utf8(input).map_err(|_| MorselError::format("docInfo.txt is not UTF-8"))?;
        let mut lines = text.lines();
        let num_docs: usize = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| MorselError::format("docInfo.txt missing document count"))?;

        let mut factors = Vec::with_capacity(num_docs * num_fields);
        for (doc_id, line) in lines.take(num_docs).enumerate() {
            let values = line
                .split(',')
                .map(|v| v.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| MorselError::format(format!("docInfo.txt line {}: {}", doc_id + 2, e)))?;
            if values.len() != num_fields {
                return Err(MorselError::format(format!(
                    "docInfo.txt document {} has {} factors, expected {}",
                    doc_id,
                    values.len(),
                    num_fields
                )));
            }
            factors.extend(values);
        }

        if factors.len() != num_docs * num_fields {
            return Err(MorselError::format("docInfo.txt has fewer lines than documents"));
        }
        Ok(Self {
            num_fields,
            factors,
        })
    }
}
