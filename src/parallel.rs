//! Parallel-For Primitive
//!
//! Layers split their work into index-disjoint units (one sample, one output
//! unit, one weight id) and hand them to [`for_each_index_mut`]. Each unit
//! receives exclusive `&mut` access to its own item, so the borrow checker
//! rules out two units writing the same slot.
//!
//! ## Strategies
//!
//! - **Rayon**: units are distributed across the global Rayon thread pool
//! - **Sequential**: units run in index order on the calling thread
//!
//! Sequential execution is useful when profiling (flat call stacks) or when
//! bit-exact reproducibility of floating point summation order across runs
//! matters more than speed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Minimum number of units handed to one Rayon task
///
/// Per-unit work in these layers is tiny (a handful of multiply-adds), so
/// splitting below this granularity costs more in scheduling than it saves.
const MIN_UNITS_PER_TASK: usize = 64;

/// Execution strategy for per-index work
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    /// Run every unit on the calling thread, in index order
    Sequential,
    /// Run units on the Rayon thread pool, in no particular order
    #[default]
    Rayon,
}

/// Run `work(index, item)` once for every item
///
/// No ordering between indices is guaranteed under [`Parallelism::Rayon`].
///
/// # Example
///
/// ```rust
/// use gatenet::parallel::{for_each_index_mut, Parallelism};
///
/// let mut squares = vec![0usize; 8];
/// for_each_index_mut(Parallelism::Rayon, &mut squares, |i, slot| *slot = i * i);
/// assert_eq!(squares[7], 49);
/// ```
pub fn for_each_index_mut<T, F>(parallelism: Parallelism, items: &mut [T], work: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    match parallelism {
        Parallelism::Sequential => {
            for (index, item) in items.iter_mut().enumerate() {
                work(index, item);
            }
        }
        Parallelism::Rayon => {
            items
                .par_iter_mut()
                .enumerate()
                .with_min_len(MIN_UNITS_PER_TASK)
                .for_each(|(index, item)| work(index, item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_index_visited_once() {
        for parallelism in [Parallelism::Sequential, Parallelism::Rayon] {
            let mut hits = vec![0u32; 1000];
            for_each_index_mut(parallelism, &mut hits, |_, hit| *hit += 1);
            assert!(hits.iter().all(|&h| h == 1), "{:?}", parallelism);
        }
    }

    #[test]
    fn test_index_matches_position() {
        let mut slots = vec![0usize; 300];
        for_each_index_mut(Parallelism::Rayon, &mut slots, |i, slot| *slot = i);
        assert!(slots.iter().enumerate().all(|(i, &s)| i == s));
    }

    #[test]
    fn test_empty_input() {
        let mut empty: Vec<f32> = Vec::new();
        for_each_index_mut(Parallelism::Rayon, &mut empty, |_, _| unreachable!());
    }
}
