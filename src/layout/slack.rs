//! Max-min fair distribution of leftover space

use crate::timeline::geometry::FUDGE;

/// One value taking part in a water-filling pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub value: f64,
    pub max: f64,
    /// Fixed levels are never raised
    pub fixed: bool,
}

impl Level {
    pub fn new(value: f64, max: f64) -> Self {
        Self {
            value,
            max: max.max(value),
            fixed: false,
        }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            max: value,
            fixed: true,
        }
    }

    fn open(&self) -> bool {
        !self.fixed && self.value < self.max - FUDGE
    }
}

/// Hand `slack` out to `levels`, always raising the smallest open values
/// together, never past their maximum. Returns what could not be used.
pub fn water_fill(levels: &mut [Level], slack: f64) -> f64 {
    let mut slack = slack.max(0.0);

    while slack > FUDGE {
        let open: Vec<usize> = (0..levels.len()).filter(|&i| levels[i].open()).collect();
        if open.is_empty() {
            break;
        }

        let smallest = open
            .iter()
            .map(|&i| levels[i].value)
            .fold(f64::INFINITY, f64::min);
        let ties: Vec<usize> = open
            .iter()
            .copied()
            .filter(|&i| levels[i].value <= smallest + FUDGE)
            .collect();
        let second = open
            .iter()
            .map(|&i| levels[i].value)
            .filter(|&v| v > smallest + FUDGE)
            .fold(f64::INFINITY, f64::min);
        let lowest_max = open
            .iter()
            .map(|&i| levels[i].max)
            .fold(f64::INFINITY, f64::min);

        let step = (slack / ties.len() as f64).min(second.min(lowest_max) - smallest);
        if step <= 0.0 {
            break;
        }

        let target = smallest + step;
        for &i in &ties {
            let level = &mut levels[i];
            let raised = target.max(level.value).min(level.max);
            slack -= raised - level.value;
            level.value = raised;
        }
    }

    slack.max(0.0)
}
