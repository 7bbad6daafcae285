use log::warn;

/// Edge detector for a host-controlled `0`/`1` toggle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Toggle {
    label: &'static str,
    previous: i32,
}

impl Toggle {
    pub fn new(label: &'static str) -> Self {
        Self { label, previous: 0 }
    }

    /// Returns `true` exactly when the toggle goes from `0` to `1`.
    ///
    /// Values outside of `0..=1` are clamped (and reported).
    pub fn check_rising_edge(&mut self, current: i32) -> bool {
        let current = if (0..=1).contains(&current) {
            current
        } else {
            let clamped = current.clamp(0, 1);

            warn!(
                "Toggle `{}` got invalid value {current}; clamping to {clamped}",
                self.label
            );

            clamped
        };

        let edge = self.previous == 0 && current == 1;

        self.previous = current;

        edge
    }

    pub fn previous(&self) -> i32 {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn edges(values: &[i32]) -> Vec<bool> {
        let mut target = Toggle::new("test");

        values
            .iter()
            .map(|&value| target.check_rising_edge(value))
            .collect()
    }

    #[test]
    fn rising_edges() {
        assert_eq!(vec![false, false, false], edges(&[0, 0, 0]));
        assert_eq!(vec![true, false, false], edges(&[1, 1, 1]));
        assert_eq!(vec![false, true, false, false], edges(&[0, 1, 1, 0]));

        assert_eq!(
            vec![false, true, false, true, false, false, false, true],
            edges(&[0, 1, 0, 1, 1, 0, 0, 1]),
        );
    }

    #[test]
    fn clamping() {
        assert_eq!(vec![true, false, false, true], edges(&[7, 1, -3, 1]));

        let mut target = Toggle::new("test");

        target.check_rising_edge(42);
        assert_eq!(1, target.previous());

        target.check_rising_edge(-42);
        assert_eq!(0, target.previous());
    }

    #[test]
    fn independent_instances() {
        let mut hold = Toggle::new("hold");
        let mut capture = Toggle::new("capture");

        assert!(hold.check_rising_edge(1));
        assert!(capture.check_rising_edge(1));
        assert!(!hold.check_rising_edge(1));
        assert!(!capture.check_rising_edge(0));
        assert!(capture.check_rising_edge(1));
        assert!(!hold.check_rising_edge(1));
    }

    #[test]
    fn one_edge_per_run_of_ones() {
        let mut rng = StdRng::seed_from_u64(1234);

        for _ in 0..256 {
            let len = rng.gen_range(0..64);
            let values: Vec<i32> =
                (0..len).map(|_| rng.gen_range(0..=1)).collect();

            let runs = values
                .iter()
                .enumerate()
                .filter(|&(idx, &value)| {
                    value == 1 && (idx == 0 || values[idx - 1] == 0)
                })
                .count();

            let fired = edges(&values).into_iter().filter(|&e| e).count();

            assert_eq!(runs, fired, "values: {values:?}");
        }
    }
}
