use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Shuffle `records` with a seeded RNG and split off the evaluation set.
///
/// The seed makes the split reproducible across processes, so the same rows
/// end up in the same set on every run.
pub fn split_train_eval<T>(
    mut records: Vec<T>,
    eval_fraction: f64,
    seed: u64,
) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);

    let total = records.len();
    let eval_count = ((total as f64) * eval_fraction).round() as usize;
    let split_at = total.saturating_sub(eval_count);

    let eval = records.split_off(split_at);

    debug!(
        train = records.len(),
        eval = eval.len(),
        seed,
        "Dataset split"
    );

    (records, eval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes() {
        let records: Vec<u32> = (0..100).collect();
        let (train, eval) = split_train_eval(records, 0.2, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(eval.len(), 20);
    }

    #[test]
    fn test_split_is_deterministic_for_a_seed() {
        let records: Vec<u32> = (0..50).collect();
        let (train_a, eval_a) = split_train_eval(records.clone(), 0.2, 42);
        let (train_b, eval_b) = split_train_eval(records, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(eval_a, eval_b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let records: Vec<u32> = (0..50).collect();
        let (train_a, _) = split_train_eval(records.clone(), 0.2, 42);
        let (train_b, _) = split_train_eval(records, 0.2, 7);
        assert_ne!(train_a, train_b);
    }

    #[test]
    fn test_no_record_is_lost_or_duplicated() {
        let records: Vec<u32> = (0..31).collect();
        let (mut train, eval) = split_train_eval(records, 0.2, 42);
        train.extend(eval);
        train.sort_unstable();
        assert_eq!(train, (0..31).collect::<Vec<u32>>());
    }

    #[test]
    fn test_tiny_dataset_does_not_panic() {
        let (train, eval) = split_train_eval(vec![1u32], 0.2, 42);
        assert_eq!(train.len() + eval.len(), 1);
    }
}
