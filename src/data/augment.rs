// ============================================================
// Layer 4 - Map Augmentation
// ============================================================
// Parameters do not change when a map is rotated or mirrored,
// so every training map has 8 equally valid views: the four
// 90-degree rotations, each with or without a horizontal flip
// (the dihedral group of the square).
//
// Transforms operate on channel-major [C, H, W] buffers of
// square maps.

use rand::Rng;

/// One of the 8 symmetries of a square map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dihedral {
    /// Counter-clockwise quarter turns, 0..4
    pub quarter_turns: u8,
    /// Mirror left/right before rotating
    pub flip: bool,
}

impl Dihedral {
    pub const IDENTITY: Dihedral = Dihedral { quarter_turns: 0, flip: false };

    /// All 8 transforms, identity first.
    pub fn all() -> impl Iterator<Item = Dihedral> {
        (0..8u8).map(|k| Dihedral { quarter_turns: k % 4, flip: k >= 4 })
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let k: u8 = rng.gen_range(0..8);
        Dihedral { quarter_turns: k % 4, flip: k >= 4 }
    }

    /// Apply to a `[channels, side, side]` buffer.
    pub fn apply(self, map: &[f32], channels: usize, side: usize) -> Vec<f32> {
        if self == Self::IDENTITY {
            return map.to_vec();
        }

        let plane = side * side;
        let mut out = vec![0.0f32; map.len()];

        for c in 0..channels {
            let src = &map[c * plane..(c + 1) * plane];
            let dst = &mut out[c * plane..(c + 1) * plane];

            for i in 0..side {
                for j in 0..side {
                    // Where does output pixel (i, j) come from?
                    let (mut si, mut sj) = (i, j);
                    for _ in 0..self.quarter_turns {
                        // inverse of a counter-clockwise turn
                        (si, sj) = (sj, side - 1 - si);
                    }
                    if self.flip {
                        sj = side - 1 - sj;
                    }
                    dst[i * side + j] = src[si * side + sj];
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ramp(side: usize) -> Vec<f32> {
        (0..side * side).map(|v| v as f32).collect()
    }

    #[test]
    fn test_eight_distinct_views() {
        let map = ramp(3);
        let views: Vec<Vec<f32>> = Dihedral::all().map(|d| d.apply(&map, 1, 3)).collect();
        assert_eq!(views.len(), 8);
        for a in 0..8 {
            for b in (a + 1)..8 {
                assert_ne!(views[a], views[b], "views {a} and {b} coincide");
            }
        }
        assert_eq!(views[0], map);
    }

    #[test]
    fn test_four_quarter_turns_return_to_start() {
        let map  = ramp(4);
        let turn = Dihedral { quarter_turns: 1, flip: false };
        let mut m = map.clone();
        for _ in 0..4 {
            m = turn.apply(&m, 1, 4);
        }
        assert_eq!(m, map);
    }

    #[test]
    fn test_transform_is_a_permutation_per_channel() {
        let mut map = ramp(2);
        map.extend(ramp(2).iter().map(|v| v + 100.0));
        let out = Dihedral { quarter_turns: 3, flip: true }.apply(&map, 2, 2);

        let mut first:  Vec<f32> = out[..4].to_vec();
        let mut second: Vec<f32> = out[4..].to_vec();
        first.sort_by(|a, b| a.partial_cmp(b).unwrap());
        second.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(first, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(second, vec![100.0, 101.0, 102.0, 103.0]);
    }

    #[test]
    fn test_random_is_seeded() {
        let mut a = StdRng::seed_from_u64(5);
        let mut b = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            assert_eq!(Dihedral::random(&mut a), Dihedral::random(&mut b));
        }
    }
}
