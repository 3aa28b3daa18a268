//! Atmospheric transmittance along the line of sight.

use super::TransmittanceCurve;

/// Something that can estimate atmospheric transmittance for an observer.
///
/// Returning `None` means the model has nothing to say about the requested
/// geometry or wavelengths, and the atmosphere is treated as transparent.
pub trait AtmosphereModel: Sync {
    fn transmittance(
        &self,
        obs_alt_km: f64,
        zenith_deg: f64,
        wavelength_range_nm: (f64, f64),
    ) -> Option<TransmittanceCurve>;

    fn name(&self) -> &str;
}

/// No absorption at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transparent;

impl AtmosphereModel for Transparent {
    fn transmittance(&self, _: f64, _: f64, _: (f64, f64)) -> Option<TransmittanceCurve> {
        None
    }

    fn name(&self) -> &str {
        "transparent"
    }
}

/// A precomputed transmittance curve (e.g. LOWTRAN output) for a fixed
/// observing geometry.
#[derive(Debug, Clone)]
pub struct Tabulated {
    curve: TransmittanceCurve,
    obs_alt_km: f64,
    zenith_deg: f64,
}

impl Tabulated {
    pub fn new(curve: TransmittanceCurve, obs_alt_km: f64, zenith_deg: f64) -> Tabulated {
        Tabulated {
            curve,
            obs_alt_km,
            zenith_deg,
        }
    }
}

impl AtmosphereModel for Tabulated {
    fn transmittance(
        &self,
        obs_alt_km: f64,
        zenith_deg: f64,
        wavelength_range_nm: (f64, f64),
    ) -> Option<TransmittanceCurve> {
        if (obs_alt_km - self.obs_alt_km).abs() > 1e-6 || (zenith_deg - self.zenith_deg).abs() > 1e-6
        {
            log::warn!(
                "Tabulated atmosphere is for {} km / {} deg, but {} km / {} deg was requested; using it anyway",
                self.obs_alt_km,
                self.zenith_deg,
                obs_alt_km,
                zenith_deg
            );
        }

        let (min, max) = wavelength_range_nm;
        let lambda = self.curve.wavelength_nm();
        if lambda[lambda.len() - 1] < min || lambda[0] > max {
            return None;
        }
        Some(self.curve.clone())
    }

    fn name(&self) -> &str {
        "tabulated"
    }
}
