use rand::seq::SliceRandom;
use rand::Rng;

/// Return `list` in a random order drawn from `rng`. The same seeded
/// generator always yields the same order.
pub fn shuffle<T, R: Rng + ?Sized>(rng: &mut R, mut list: Vec<T>) -> Vec<T> {
    list.shuffle(rng);
    list
}
