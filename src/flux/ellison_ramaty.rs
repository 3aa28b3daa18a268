use ndarray::prelude::*;

use super::{broadcast, FluxError};
use crate::numeric::gradient;

/// Ellison & Ramaty differential number flux parameterisation:
///
/// `Phi = C0 * E^-gamma * exp(-((E - E0) / dE)^kappa)`
///
/// where `dE` is the numerical gradient of the energy grid. Each parameter is
/// a scalar or a vector; the output has one column per element of the longest
/// parameter, with scalars applied to every column.
pub fn ellison_ramaty(
    energy_ev: ArrayView1<f64>,
    e0_ev: &[f64],
    gamma: &[f64],
    kappa: &[f64],
    c0: &[f64],
) -> Result<Array2<f64>, FluxError> {
    if energy_ev.len() < 2 {
        return Err(FluxError::EnergyGridTooSmall);
    }
    let n = [e0_ev.len(), gamma.len(), kappa.len(), c0.len()]
        .into_iter()
        .max()
        .unwrap_or(0);
    if n == 0 {
        return Err(FluxError::NoCharacteristicEnergies);
    }
    let e0_ev = broadcast("E0", e0_ev, n)?;
    let gamma = broadcast("gamma", gamma, n)?;
    let kappa = broadcast("kappa", kappa, n)?;
    let c0 = broadcast("C0", c0, n)?;

    let energy = energy_ev.to_vec();
    let de = gradient(&energy);

    Ok(Array2::from_shape_fn((energy.len(), n), |(i, j)| {
        let e = energy[i];
        c0[j] * e.powf(-gamma[j]) * (-((e - e0_ev[j]) / de[i]).powf(kappa[j])).exp()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kappa_one_is_an_exponential_cutoff() {
        // Uniform grid, so dE == 100 everywhere.
        let energy = Array1::linspace(100.0, 1000.0, 10);
        let phi = ellison_ramaty(energy.view(), &[300.0], &[-1.0], &[1.0], &[2.0]).unwrap();
        assert_eq!(phi.dim(), (10, 1));
        for (i, &e) in energy.iter().enumerate() {
            let expected = 2.0 * e * (-(e - 300.0) / 100.0).exp();
            assert_relative_eq!(phi[[i, 0]], expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn scalars_broadcast_against_vectors() {
        let energy = Array1::linspace(100.0, 1000.0, 10);
        let phi = ellison_ramaty(energy.view(), &[300.0], &[-1.0, 0.0, 1.0], &[1.0], &[1.0])
            .unwrap();
        assert_eq!(phi.dim(), (10, 3));
        // gamma = 0 removes the power law.
        assert_relative_eq!(phi[[2, 1]], 1.0, max_relative = 1e-12);

        assert!(matches!(
            ellison_ramaty(energy.view(), &[300.0, 400.0], &[-1.0, 0.0, 1.0], &[1.0], &[1.0]),
            Err(FluxError::BadParameterLength { name: "E0", .. })
        ));
    }
}
