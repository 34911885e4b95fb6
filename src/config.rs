use crate::sort::{SortError, SortResult};

pub const DEFAULT_BUCKET_BITS: u32 = 16;
pub const MAX_BUCKET_BITS: u32 = 24;
pub const DEFAULT_CAMERA_EPSILON: f32 = 1e-3;
pub const DEFAULT_PARITY_OFFSET: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortConfig {
    /// Depth quantization width; the histogram has `2^bucket_bits + 1` buckets.
    pub bucket_bits: u32,
    pub camera_epsilon: f32,
    /// Fraction added to every index written in float index mode.
    pub parity_offset: f32,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            bucket_bits: DEFAULT_BUCKET_BITS,
            camera_epsilon: DEFAULT_CAMERA_EPSILON,
            parity_offset: DEFAULT_PARITY_OFFSET,
        }
    }
}

impl SortConfig {
    pub fn with_bucket_bits(mut self, bits: u32) -> Self {
        self.bucket_bits = bits;
        self
    }

    pub fn with_camera_epsilon(mut self, epsilon: f32) -> Self {
        self.camera_epsilon = epsilon;
        self
    }

    pub fn with_parity_offset(mut self, offset: f32) -> Self {
        self.parity_offset = offset;
        self
    }

    pub fn bucket_count(&self) -> usize {
        (1usize << self.bucket_bits) + 1
    }

    pub fn validate(&self) -> SortResult<()> {
        if self.bucket_bits == 0 || self.bucket_bits > MAX_BUCKET_BITS {
            return Err(SortError::InvalidConfig(format!(
                "bucket_bits must be in 1..={MAX_BUCKET_BITS}, got {}",
                self.bucket_bits
            )));
        }
        if !self.camera_epsilon.is_finite() || self.camera_epsilon < 0.0 {
            return Err(SortError::InvalidConfig(format!(
                "camera_epsilon must be a finite non-negative value, got {}",
                self.camera_epsilon
            )));
        }
        // Offsets of 0.5 or more would round to the neighbouring index.
        if !(0.0..0.5).contains(&self.parity_offset) {
            return Err(SortError::InvalidConfig(format!(
                "parity_offset must be in [0, 0.5), got {}",
                self.parity_offset
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SortConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bucket_count(), 65_537);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(SortConfig::default().with_bucket_bits(0).validate().is_err());
        assert!(SortConfig::default().with_bucket_bits(25).validate().is_err());
        assert!(SortConfig::default()
            .with_camera_epsilon(f32::NAN)
            .validate()
            .is_err());
        assert!(SortConfig::default()
            .with_parity_offset(0.5)
            .validate()
            .is_err());
    }
}
