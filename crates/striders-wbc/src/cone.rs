//! Linearized contact cones.
//!
//! Every contact contributes nine inequality rows `C·Δf ≥ l`, with the
//! lower bounds evaluated at the current force reference so that
//! reference plus correction stays inside the cone. Point contacts get a
//! four-sided friction pyramid on (fx, fy, fz) plus repeated unilateral
//! rows; wrench contacts additionally bound the tangential moments
//! against the patch half-extents. The row count is the same for both
//! force sizes, so the workspace dimensions never depend on the contact
//! parameterization.

use nalgebra::DMatrix;

use striders_core::schedule::ForceSize;

/// Inequality rows per contact.
pub const CONE_ROWS: usize = 9;

/// Cone coefficient block, `CONE_ROWS` × `force_size.dim()`.
pub(crate) fn cone_block(
    force_size: ForceSize,
    mu: f64,
    half_width: f64,
    half_length: f64,
) -> DMatrix<f64> {
    match force_size {
        ForceSize::Point => DMatrix::from_row_slice(
            CONE_ROWS,
            3,
            &[
                -1.0, 0.0, mu, //
                1.0, 0.0, mu, //
                0.0, -1.0, mu, //
                0.0, 1.0, mu, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0,
            ],
        ),
        ForceSize::Wrench => DMatrix::from_row_slice(
            CONE_ROWS,
            6,
            &[
                -1.0, 0.0, mu, 0.0, 0.0, 0.0, //
                1.0, 0.0, mu, 0.0, 0.0, 0.0, //
                0.0, -1.0, mu, 0.0, 0.0, 0.0, //
                0.0, 1.0, mu, 0.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, half_width, -1.0, 0.0, 0.0, //
                0.0, 0.0, half_width, 1.0, 0.0, 0.0, //
                0.0, 0.0, half_length, 0.0, -1.0, 0.0, //
                0.0, 0.0, half_length, 0.0, 1.0, 0.0,
            ],
        ),
    }
}

/// Lower bounds for the nine cone rows at the given reference force.
pub(crate) fn fill_cone_lower(
    force_size: ForceSize,
    mu: f64,
    half_width: f64,
    half_length: f64,
    force_ref: &[f64],
    lower: &mut [f64; CONE_ROWS],
) {
    let (fx, fy, fz) = (force_ref[0], force_ref[1], force_ref[2]);
    lower[0] = fx - fz * mu;
    lower[1] = -fx - fz * mu;
    lower[2] = fy - fz * mu;
    lower[3] = -fy - fz * mu;
    lower[4] = -fz;
    match force_size {
        ForceSize::Point => {
            for row in &mut lower[5..] {
                *row = -fz;
            }
        }
        ForceSize::Wrench => {
            let (mx, my) = (force_ref[3], force_ref[4]);
            lower[5] = mx - fz * half_width;
            lower[6] = -mx - fz * half_width;
            lower[7] = my - fz * half_length;
            lower[8] = -my - fz * half_length;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn block_shapes_keep_nine_rows_for_both_sizes() {
        let point = cone_block(ForceSize::Point, 0.5, 0.05, 0.1);
        let wrench = cone_block(ForceSize::Wrench, 0.5, 0.05, 0.1);
        assert_eq!(point.shape(), (9, 3));
        assert_eq!(wrench.shape(), (9, 6));
    }

    #[test]
    fn point_rows_bound_tangential_forces() {
        let mu = 0.5;
        let block = cone_block(ForceSize::Point, mu, 0.05, 0.1);
        // A force on the cone boundary: fx = mu * fz.
        let f = DVector::from_vec(vec![5.0, 0.0, 10.0]);
        let residual = &block * &f;
        // Row 0: −fx + mu fz = 0 at the boundary.
        assert_relative_eq!(residual[0], 0.0, epsilon = 1e-12);
        // Unilateral rows repeat fz.
        for row in 4..9 {
            assert_relative_eq!(residual[row], 10.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn wrench_rows_bound_moments_against_patch_extents() {
        let (mu, w, l) = (0.6, 0.05, 0.1);
        let block = cone_block(ForceSize::Wrench, mu, w, l);
        // Moments exactly at the patch limits.
        let f = DVector::from_vec(vec![0.0, 0.0, 100.0, w * 100.0, -l * 100.0, 0.0]);
        let residual = &block * &f;
        assert_relative_eq!(residual[5], 0.0, epsilon = 1e-12); // −mx + W fz
        assert_relative_eq!(residual[6], 2.0 * w * 100.0, epsilon = 1e-12);
        assert_relative_eq!(residual[8], 0.0, epsilon = 1e-12); // my + L fz
        assert_relative_eq!(residual[7], 2.0 * l * 100.0, epsilon = 1e-12);
        // The yaw moment column is unconstrained.
        for row in 0..9 {
            assert_relative_eq!(block[(row, 5)], 0.0);
        }
    }

    #[test]
    fn lower_bounds_vanish_for_a_strictly_interior_reference() {
        // C·(f_ref + Δf) ≥ 0 at Δf = 0 means C·f_ref ≥ l must hold with
        // slack: l = −C·f_ref row-wise.
        let mu = 0.7;
        let f_ref = [1.0, -2.0, 30.0, 0.5, -0.4, 0.0];
        let mut lower = [0.0; CONE_ROWS];
        fill_cone_lower(ForceSize::Wrench, mu, 0.05, 0.1, &f_ref, &mut lower);

        let block = cone_block(ForceSize::Wrench, mu, 0.05, 0.1);
        let residual = &block * &DVector::from_column_slice(&f_ref);
        for row in 0..CONE_ROWS {
            assert_relative_eq!(lower[row], -residual[row], epsilon = 1e-12);
        }
    }

    #[test]
    fn point_lower_bounds_repeat_the_unilateral_row() {
        let mut lower = [0.0; CONE_ROWS];
        fill_cone_lower(ForceSize::Point, 0.5, 0.05, 0.1, &[2.0, 1.0, 40.0], &mut lower);
        for row in 4..9 {
            assert_relative_eq!(lower[row], -40.0, epsilon = 1e-12);
        }
    }
}
