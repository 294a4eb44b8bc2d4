use crate::core::value::Value;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Error)]
pub enum PageCodecError {
    #[error("Failed to encode page: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode page payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Page checksum mismatch (expected {expected:#018x}, found {actual:#018x})")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("Page blocks have inconsistent lengths: expected {expected} positions, block {block} has {actual}")]
    InconsistentBlocks {
        expected: usize,
        block: usize,
        actual: usize,
    },

    #[error("Page declares {declared} positions but decodes to {actual}")]
    PositionCountMismatch { declared: usize, actual: usize },
}

/// One column of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub values: Vec<Value>,
}

impl Block {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A columnar chunk of query output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub blocks: Vec<Block>,
}

impl Page {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Builds a page from row-major values. Rows shorter than the widest row
    /// are padded with nulls.
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut blocks = vec![Block::default(); width];

        for row in rows {
            let mut values = row.into_iter();
            for block in blocks.iter_mut() {
                block.values.push(values.next().unwrap_or(Value::Null));
            }
        }

        Self { blocks }
    }

    pub fn channel_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn position_count(&self) -> usize {
        self.blocks.first().map_or(0, Block::len)
    }

    /// Values of one row, in channel order.
    pub fn row(&self, position: usize) -> impl Iterator<Item = &Value> + '_ {
        self.blocks
            .iter()
            .filter_map(move |block| block.values.get(position))
    }

    pub fn logical_size_bytes(&self) -> u64 {
        self.blocks
            .iter()
            .flat_map(|block| block.values.iter())
            .map(|value| value.size_bytes() as u64)
            .sum()
    }

    fn validate(&self) -> Result<(), PageCodecError> {
        let expected = self.position_count();
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.len() != expected {
                return Err(PageCodecError::InconsistentBlocks {
                    expected,
                    block: idx,
                    actual: block.len(),
                });
            }
        }
        Ok(())
    }
}

/// A page as it travels through the exchange: an opaque payload plus the
/// metadata needed to verify it on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedPage {
    pub payload: Bytes,
    pub position_count: usize,
    pub checksum: u64,
}

impl SerializedPage {
    pub fn encode(page: &Page) -> Result<Self, PageCodecError> {
        page.validate()?;
        let payload = serde_json::to_vec(page).map_err(PageCodecError::Encode)?;
        let checksum = xxh3_64(&payload);

        Ok(Self {
            payload: Bytes::from(payload),
            position_count: page.position_count(),
            checksum,
        })
    }

    pub fn decode(&self) -> Result<Page, PageCodecError> {
        let actual = xxh3_64(&self.payload);
        if actual != self.checksum {
            return Err(PageCodecError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }

        let page: Page = serde_json::from_slice(&self.payload).map_err(PageCodecError::Decode)?;
        page.validate()?;

        if page.position_count() != self.position_count {
            return Err(PageCodecError::PositionCountMismatch {
                declared: self.position_count,
                actual: page.position_count(),
            });
        }

        Ok(page)
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        Page::from_rows(vec![
            vec![Value::Int(1), Value::String("a".into())],
            vec![Value::Int(2), Value::String("bb".into())],
        ])
    }

    #[test]
    fn from_rows_transposes_into_blocks() {
        let page = sample_page();
        assert_eq!(page.channel_count(), 2);
        assert_eq!(page.position_count(), 2);
        let second: Vec<&Value> = page.row(1).collect();
        assert_eq!(second, vec![&Value::Int(2), &Value::String("bb".into())]);
        assert_eq!(page.logical_size_bytes(), 8 + 8 + 1 + 2);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut serialized = SerializedPage::encode(&sample_page()).unwrap();
        let mut tampered = serialized.payload.to_vec();
        tampered[0] = b' ';
        serialized.payload = Bytes::from(tampered);

        assert!(matches!(
            serialized.decode(),
            Err(PageCodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn ragged_blocks_are_rejected() {
        let page = Page::new(vec![
            Block::new(vec![Value::Int(1), Value::Int(2)]),
            Block::new(vec![Value::Int(1)]),
        ]);

        assert!(matches!(
            SerializedPage::encode(&page),
            Err(PageCodecError::InconsistentBlocks { block: 1, .. })
        ));
    }
}
