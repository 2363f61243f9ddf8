use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{UnetError, UnetResult};

pub const DEFAULT_FOLD_SEED: u64 = 12345;

/// Shuffled k-fold cross-validation over `0..n`.
///
/// Fold sizes follow the usual convention: the first `n % n_splits` folds hold
/// one extra sample. The permutation is fixed by `seed`, so every process sees
/// the same split.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
    seed: u64,
}

pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

impl KFold {
    pub fn new(n_splits: usize) -> UnetResult<Self> {
        if n_splits < 2 {
            return Err(UnetError::InvalidArgument(format!(
                "k-fold needs at least 2 splits, got {}",
                n_splits
            )));
        }
        Ok(KFold {
            n_splits,
            seed: DEFAULT_FOLD_SEED,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn split(&self, n: usize) -> UnetResult<Vec<Split>> {
        if n < self.n_splits {
            return Err(UnetError::InvalidArgument(format!(
                "cannot split {} samples into {} folds",
                n, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut start = 0;
        let splits = (0..self.n_splits)
            .map(|fold| {
                let len = base + usize::from(fold < extra);
                let val = indices[start..start + len].to_vec();
                let train = indices[..start]
                    .iter()
                    .chain(&indices[start + len..])
                    .copied()
                    .collect();
                start += len;
                Split { train, val }
            })
            .collect();
        Ok(splits)
    }

    pub fn fold(&self, n: usize, fold: usize) -> UnetResult<Split> {
        self.split(n)?.into_iter().nth(fold).ok_or_else(|| {
            UnetError::InvalidArgument(format!(
                "fold {} out of range for {} folds",
                fold, self.n_splits
            ))
        })
    }
}

pub fn get_split<T: Clone>(items: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| items[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_partition_indices() {
        let kfold = KFold::new(5).unwrap();
        let splits = kfold.split(23).unwrap();
        assert_eq!(splits.len(), 5);

        let sizes: Vec<usize> = splits.iter().map(|s| s.val.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);

        let mut all_val: Vec<usize> = splits.iter().flat_map(|s| s.val.clone()).collect();
        all_val.sort_unstable();
        assert_eq!(all_val, (0..23).collect::<Vec<_>>());

        for split in &splits {
            assert_eq!(split.train.len() + split.val.len(), 23);
            assert!(split.val.iter().all(|v| !split.train.contains(v)));
        }
    }

    #[test]
    fn test_split_is_seeded() {
        let a = KFold::new(3).unwrap().fold(10, 1).unwrap();
        let b = KFold::new(3).unwrap().fold(10, 1).unwrap();
        assert_eq!(a.val, b.val);
        let c = KFold::new(3).unwrap().with_seed(7).split(10).unwrap();
        let d = KFold::new(3).unwrap().split(10).unwrap();
        assert!(c.iter().zip(&d).any(|(x, y)| x.val != y.val));
    }

    #[test]
    fn test_invalid_splits() {
        assert!(KFold::new(1).is_err());
        assert!(KFold::new(5).unwrap().split(3).is_err());
        assert!(KFold::new(5).unwrap().fold(10, 5).is_err());
    }

    #[test]
    fn test_get_split() {
        let items = vec!["a", "b", "c", "d"];
        assert_eq!(get_split(&items, &[3, 0]), vec!["d", "a"]);
    }
}
