use crate::models::config::BitrateMode;

/// JPEG quality used for `BitrateMode::UnconstrainedVariable`.
pub const UNCONSTRAINED_QUALITY: u8 = 92;

const CBR_START: u8 = 75;
const CBR_STEP: u8 = 4;
const CBR_MIN: u8 = 5;
const CBR_MAX: u8 = 95;

/// Map the 0..=100 quality target onto the JPEG 1..=100 scale.
///
/// Monotonic: a higher target never yields a lower JPEG quality.
pub fn quality_to_jpeg(quality: u8) -> u8 {
    (1 + (quality.min(100) as u32 * 99 + 50) / 100) as u8
}

/// Per-frame quality selection for one encoder instance.
///
/// Quality and unconstrained modes are fixed. Constant-bitrate mode starts
/// mid-scale and nudges quality after every frame to keep coded frames
/// within 10% of the per-frame byte budget.
#[derive(Debug, Clone)]
pub struct RateController {
    quality: u8,
    budget_bytes: Option<u64>,
}

impl RateController {
    pub fn new(mode: BitrateMode, frame_rate: u32) -> Self {
        match mode {
            BitrateMode::Quality(q) => Self {
                quality: quality_to_jpeg(q),
                budget_bytes: None,
            },
            BitrateMode::UnconstrainedVariable => Self {
                quality: UNCONSTRAINED_QUALITY,
                budget_bytes: None,
            },
            BitrateMode::Constant { bits_per_second } => Self {
                quality: CBR_START,
                budget_bytes: Some((bits_per_second as u64 / 8 / frame_rate.max(1) as u64).max(1)),
            },
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn budget_bytes(&self) -> Option<u64> {
        self.budget_bytes
    }

    /// Feed back the size of the frame just coded.
    pub fn observe(&mut self, coded_bytes: usize) {
        let Some(budget) = self.budget_bytes else {
            return;
        };
        let coded = coded_bytes as u64 * 10;
        if coded > budget * 11 {
            self.quality = self.quality.saturating_sub(CBR_STEP).max(CBR_MIN);
        } else if coded < budget * 9 {
            self.quality = (self.quality + CBR_STEP).min(CBR_MAX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_mapping_covers_jpeg_range_monotonically() {
        assert_eq!(quality_to_jpeg(0), 1);
        assert_eq!(quality_to_jpeg(100), 100);
        let mut last = 0;
        for q in 0..=100 {
            let jpeg = quality_to_jpeg(q);
            assert!(jpeg >= last);
            last = jpeg;
        }
    }

    #[test]
    fn fixed_modes_ignore_feedback() {
        let mut rc = RateController::new(BitrateMode::Quality(50), 30);
        let before = rc.quality();
        rc.observe(10_000_000);
        assert_eq!(rc.quality(), before);
        assert_eq!(RateController::new(BitrateMode::UnconstrainedVariable, 30).quality(), 92);
    }

    #[test]
    fn constant_bitrate_steers_toward_budget() {
        let mut rc = RateController::new(BitrateMode::Constant { bits_per_second: 240_000 }, 30);
        assert_eq!(rc.budget_bytes(), Some(1000));
        assert_eq!(rc.quality(), 75);

        rc.observe(2000);
        assert_eq!(rc.quality(), 71);
        rc.observe(1000);
        assert_eq!(rc.quality(), 71);
        rc.observe(100);
        assert_eq!(rc.quality(), 75);

        for _ in 0..100 {
            rc.observe(1_000_000);
        }
        assert_eq!(rc.quality(), 5);
    }
}
