//! A-weighting power multipliers

/// Per-bin power multiplier for A-weighting
///
/// Bin `i` sits at `i * sample_rate / fft_len` Hz. The result has
/// `fft_len/2 + 1` entries and multiplies a power spectrum.
pub fn a_weighting_factors(fft_len: usize, sample_rate: f64) -> Vec<f64> {
    (0..=fft_len / 2)
        .map(|i| a_weighting_power(i as f64 / fft_len as f64 * sample_rate))
        .collect()
}

/// A-weighting power gain at `f` Hz, normalized to ~1.0 at 1 kHz
pub fn a_weighting_power(f: f64) -> f64 {
    let f2 = f * f;
    let r = 12200.0_f64.powi(2) * f2 * f2
        / ((f2 + 20.6_f64.powi(2))
            * ((f2 + 107.7_f64.powi(2)) * (f2 + 737.9_f64.powi(2))).sqrt()
            * (f2 + 12200.0_f64.powi(2)));
    // 10^(1/5), i.e. +2.0 dB
    r * r * 1.58489319246111
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(p: f64) -> f64 {
        10.0 * p.log10()
    }

    #[test]
    fn test_unity_near_1khz() {
        assert!(db(a_weighting_power(1000.0)).abs() < 0.01);
    }

    #[test]
    fn test_reference_points() {
        // IEC 61672 nominal values
        assert!((db(a_weighting_power(100.0)) + 19.1).abs() < 0.1);
        assert!((db(a_weighting_power(10_000.0)) + 2.5).abs() < 0.1);
        assert_eq!(a_weighting_power(0.0), 0.0);
    }

    #[test]
    fn test_factor_table_layout() {
        let factors = a_weighting_factors(1024, 8000.0);
        assert_eq!(factors.len(), 513);
        assert_eq!(factors[0], 0.0);
        assert_eq!(factors[128], a_weighting_power(1000.0));
    }
}
