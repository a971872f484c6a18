/// Bolus injection washing out of the plasma: `Cp(t) = dose * exp(-t / tau)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlasmaInput {
    pub dose: f64,
    pub tau: f64,
}

impl PlasmaInput {
    pub fn new(dose: f64, tau: f64) -> Self {
        Self { dose, tau }
    }

    /// Plasma concentration at time `t >= 0`.
    #[inline]
    pub fn concentration(&self, t: f64) -> f64 {
        self.dose * (-t / self.tau).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_dose() {
        let plasma = PlasmaInput::new(1000.0, 60.0);
        assert_eq!(plasma.concentration(0.0), 1000.0);
    }

    #[test]
    fn decays_by_e_per_time_constant() {
        let plasma = PlasmaInput::new(1000.0, 60.0);
        let ratio = plasma.concentration(60.0) / plasma.concentration(0.0);
        assert!((ratio - (-1.0f64).exp()).abs() < 1e-12);
        assert!(plasma.concentration(600.0) < plasma.concentration(599.0));
    }
}
