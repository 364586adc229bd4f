// SPDX-License-Identifier: Apache-2.0

use log::debug;

use super::entropy::entropy;

/// How the noise floor that a bit's information must clear is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    /// the binomial free entropy alone
    #[default]
    FreeEntropy,

    /// `max(free entropy, 1.5 * max(bi[..3]))`: additionally treats
    /// 1.5x the strongest of the three lowest mantissa bits as noise.
    /// Kept for parity with earlier analyses; the free-entropy form
    /// is the better justified of the two.
    LowBitFloor,
}

/// Acklam's rational approximation to the inverse of the standard
/// normal CDF, |relative error| < 1.2e-9 over (0, 1). Deterministic,
/// so a keep-bits result is reproducible for a given input.
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        return (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0);
    }
    if p > 1.0 - P_LOW {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        return -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0);
    }

    let q = p - 0.5;
    let r = q * q;
    (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
        / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
}

/// Upper bound of the central confidence interval of a Bernoulli(1/2)
/// proportion over `n` samples, clamped to 1.
pub fn binom_confidence(n: u64, ci: f64) -> f64 {
    let p = 0.5 + normal_quantile(1.0 - (1.0 - ci) / 2.0) / (2.0 * (n as f64).sqrt());
    p.min(1.0)
}

/// The information a bit must exceed to be distinguishable from
/// counting noise: one minus the entropy of the confidence bound.
pub fn free_entropy(n: u64, ci: f64) -> f64 {
    let p = binom_confidence(n, ci);
    1.0 - entropy(&[p, 1.0 - p], 2.0)
}

/// Number of significant mantissa bits to retain so that a fraction
/// `ci` of the real information survives quantisation.
///
/// Bits whose information does not clear the noise floor are zeroed,
/// the remainder is accumulated from the low end, and the cursor walks
/// the mantissa until the cumulative share reaches `1 - ci`; whatever
/// lies above the cursor is kept. An information vector that is all
/// noise yields 0 (a degenerate but valid outcome, logged rather than
/// raised).
pub fn keepbits(
    bi: &[f64],
    manbit: (u32, u32),
    elements: u64,
    ci: f64,
    policy: ThresholdPolicy,
) -> u32 {
    let fe = free_entropy(elements, ci);
    let threshold = match policy {
        ThresholdPolicy::FreeEntropy => fe,
        ThresholdPolicy::LowBitFloor => {
            let low = bi
                .iter()
                .take(3)
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            fe.max(1.5 * low)
        }
    };

    let mut cumulative: Vec<f64> = bi
        .iter()
        .map(|&v| if v <= threshold { 0.0 } else { v })
        .collect();
    let mut running = 0.0;
    for v in cumulative.iter_mut() {
        running += *v;
        *v = running;
    }

    let total = running;
    if total <= 0.0 {
        debug!(
            "no bit clears the information noise floor {:.6}, keeping 0 bits",
            threshold
        );
        return 0;
    }

    let (mlo, mhi) = manbit;
    let mut i = mlo;
    while i < mhi && cumulative[i as usize] / total < 1.0 - ci {
        i += 1;
    }
    return mhi - i;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_matches_known_values() {
        assert!(normal_quantile(0.5).abs() < 1e-9);
        assert!((normal_quantile(0.975) - 1.959963985).abs() < 1e-6);
        assert!((normal_quantile(0.995) - 2.575829304).abs() < 1e-6);
        // symmetric tails
        assert!((normal_quantile(0.01) + normal_quantile(0.99)).abs() < 1e-9);
        // deep tail stays finite and monotone
        assert!(normal_quantile(1e-12) < normal_quantile(1e-6));
    }

    #[test]
    fn binom_confidence_shrinks_with_n() {
        let p100 = binom_confidence(100, 0.95);
        let p10000 = binom_confidence(10000, 0.95);
        assert!(p100 > p10000);
        assert!(p10000 > 0.5);
        // n=1000, ci=0.95: 0.5 + 1.9600/(2*sqrt(1000))
        assert!((binom_confidence(1000, 0.95) - 0.530990).abs() < 1e-5);
        // tiny n clamps at 1
        assert_eq!(binom_confidence(1, 0.999999999), 1.0);
    }

    #[test]
    fn free_entropy_is_a_small_positive_floor() {
        let fe = free_entropy(10000, 0.99);
        assert!(fe > 0.0 && fe < 0.01, "fe = {}", fe);
        // more samples, lower floor
        assert!(free_entropy(1_000_000, 0.99) < fe);
    }

    #[test]
    fn all_noise_keeps_nothing() {
        let bi = vec![0.0; 32];
        assert_eq!(keepbits(&bi, (0, 23), 1000, 0.95, ThresholdPolicy::FreeEntropy), 0);
        let bi16 = vec![0.0; 16];
        assert_eq!(keepbits(&bi16, (0, 10), 1000, 0.95, ThresholdPolicy::FreeEntropy), 0);
        let bi64 = vec![0.0; 64];
        assert_eq!(keepbits(&bi64, (0, 52), 1000, 0.95, ThresholdPolicy::FreeEntropy), 0);
    }

    #[test]
    fn information_at_the_top_of_the_mantissa_is_kept() {
        // one fully informative bit at mantissa position 22
        let mut bi = vec![0.0; 32];
        bi[22] = 1.0;
        let kept = keepbits(&bi, (0, 23), 100_000, 0.99, ThresholdPolicy::FreeEntropy);
        assert_eq!(kept, 1);
    }

    #[test]
    fn information_spread_down_keeps_more_bits(){
        let mut bi = vec![0.0; 32];
        for b in 15..23 {
            bi[b] = 0.5;
        }
        let kept = keepbits(&bi, (0, 23), 100_000, 0.99, ThresholdPolicy::FreeEntropy);
        assert_eq!(kept, 23 - 15);
    }

    #[test]
    fn low_bit_floor_policy_can_suppress_weak_bits() {
        let mut bi = vec![0.0; 32];
        bi[0] = 0.2; // strong "noise" in the lowest mantissa bit
        bi[20] = 0.25;
        bi[22] = 0.9;
        let free = keepbits(&bi, (0, 23), 100_000, 0.99, ThresholdPolicy::FreeEntropy);
        let floor = keepbits(&bi, (0, 23), 100_000, 0.99, ThresholdPolicy::LowBitFloor);
        // the floor policy raises the threshold to 0.3 and drops the
        // 0.2/0.25 entries that the free-entropy policy retains
        assert!(floor <= free);
        assert_eq!(floor, 1);
    }

    #[test]
    fn cursor_is_bounded_by_the_mantissa() {
        // information only above the mantissa: the cursor must stop at
        // the mantissa top and report 0, never underflow
        let mut bi = vec![0.0; 32];
        bi[25] = 1.0;
        let kept = keepbits(&bi, (0, 23), 100_000, 0.99, ThresholdPolicy::FreeEntropy);
        assert_eq!(kept, 0);
    }
}
