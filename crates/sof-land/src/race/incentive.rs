//! Risk-scaled incentive sizing for the guaranteed channel.

/// Incentive bounds in lamports.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IncentivePolicy {
    /// Smallest incentive ever paid.
    pub min_lamports: u64,
    /// Largest incentive ever paid.
    pub cap_lamports: u64,
}

impl Default for IncentivePolicy {
    fn default() -> Self {
        Self {
            min_lamports: 1_000,
            cap_lamports: 1_000_000,
        }
    }
}

impl IncentivePolicy {
    /// Returns a policy whose minimum does not exceed its cap.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            min_lamports: self.min_lamports.min(self.cap_lamports),
            cap_lamports: self.cap_lamports,
        }
    }

    /// Incentive for `risk`: `risk² × cap`, clamped to `[min, cap]`.
    #[must_use]
    pub fn incentive_for(&self, risk: f64) -> u64 {
        let policy = self.normalized();
        let risk = clamp_risk(risk);
        let scaled = (risk * risk * policy.cap_lamports as f64).round();
        // `as` saturates; NaN cannot occur after clamping.
        let lamports = scaled as u64;
        lamports.clamp(policy.min_lamports, policy.cap_lamports)
    }
}

/// Clamps a risk score into `[0, 1]`, mapping NaN to zero.
#[must_use]
pub fn clamp_risk(risk: f64) -> f64 {
    if risk.is_nan() { 0.0 } else { risk.clamp(0.0, 1.0) }
}
