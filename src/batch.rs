//! Partitioning of location ids into provider-sized forecast batches

use std::num::NonZeroUsize;

/// An ordered group of location ids fetched with a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastBatch {
    ids: Vec<String>,
}

impl ForecastBatch {
    #[must_use]
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ledger key: the ids joined in their original order.
    ///
    /// Order-sensitive, so the same ids in another order are another batch.
    #[must_use]
    pub fn key(&self) -> String {
        self.ids.join(",")
    }
}

/// Split `ids` into contiguous batches of at most `max_size`, preserving order
#[must_use]
pub fn chunk(ids: &[String], max_size: NonZeroUsize) -> Vec<ForecastBatch> {
    ids.chunks(max_size.get())
        .map(|slice| ForecastBatch::new(slice.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}", 15000 + i)).collect()
    }

    #[rstest]
    #[case(0, 20, 0)]
    #[case(1, 20, 1)]
    #[case(20, 20, 1)]
    #[case(21, 20, 2)]
    #[case(45, 20, 3)]
    #[case(7, 1, 7)]
    #[case(10, 3, 4)]
    fn test_chunk_properties(#[case] len: usize, #[case] max: usize, #[case] expected: usize) {
        let input = ids(len);
        let batches = chunk(&input, NonZeroUsize::new(max).unwrap());

        assert_eq!(batches.len(), expected);
        assert_eq!(batches.len(), len.div_ceil(max));
        assert!(batches.iter().all(|b| b.len() <= max && !b.is_empty()));
        if let Some((_, full)) = batches.split_last() {
            assert!(full.iter().all(|b| b.len() == max));
        }

        let rebuilt: Vec<String> = batches.iter().flat_map(|b| b.ids().to_vec()).collect();
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_batch_key_is_order_sensitive() {
        let a = ForecastBatch::new(vec!["1".into(), "2".into()]);
        let b = ForecastBatch::new(vec!["2".into(), "1".into()]);
        assert_eq!(a.key(), "1,2");
        assert_ne!(a.key(), b.key());
    }
}
