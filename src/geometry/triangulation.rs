//! Multi-view triangulation with conditioning checks.
//!
//! Used to seed the position of a landmark when it gains an explicit point
//! variable. The linear solve is the N-view generalization of the two-view
//! DLT: each view contributes two rows `x * P[2] - P[0]`, `y * P[2] - P[1]`
//! and the homogeneous point is the null vector of the stacked system.

use nalgebra::{Matrix4, RowVector4, SMatrix, Vector3};

use super::SE3;

/// Minimum parallax and reprojection thresholds for accepting a point.
#[derive(Debug, Clone, Copy)]
pub struct TriangulationThresholds {
    /// Largest pairwise ray angle must reach this (rad).
    pub min_parallax: f64,
    /// Mean reprojection error bound in normalized image units.
    pub max_mean_error: f64,
}

/// Triangulated point together with its conditioning diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Triangulated {
    pub point: Vector3<f64>,
    pub max_parallax: f64,
    pub mean_error: f64,
}

/// Why a landmark could not be triangulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriangulationFailure {
    TooFewViews(usize),
    LowParallax(f64),
    NoSolution,
    BehindCamera,
    LargeError(f64),
}

/// Triangulate from normalized left-camera coordinates and world camera poses
/// (`T_world_cam`).
pub fn triangulate_views(
    views: &[(SE3, Vector3<f64>)],
    thresholds: &TriangulationThresholds,
) -> Result<Triangulated, TriangulationFailure> {
    if views.len() < 2 {
        return Err(TriangulationFailure::TooFewViews(views.len()));
    }

    let max_parallax = max_ray_angle(views);
    if max_parallax < thresholds.min_parallax {
        return Err(TriangulationFailure::LowParallax(max_parallax));
    }

    let mut ata = Matrix4::<f64>::zeros();
    for (pose_wc, xn) in views {
        let p = projection_matrix(&pose_wc.inverse());
        let row_x: RowVector4<f64> = xn.x * p.row(2) - p.row(0);
        let row_y: RowVector4<f64> = xn.y * p.row(2) - p.row(1);
        ata += row_x.transpose() * row_x + row_y.transpose() * row_y;
    }

    let eigen = ata.symmetric_eigen();
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &v)| {
            if v < best.1 {
                (i, v)
            } else {
                best
            }
        });
    let h = eigen.eigenvectors.column(min_idx);
    if h[3].abs() < 1e-12 {
        return Err(TriangulationFailure::NoSolution);
    }
    let point = Vector3::new(h[0] / h[3], h[1] / h[3], h[2] / h[3]);

    let mut total_error = 0.0;
    for (pose_wc, xn) in views {
        let p_cam = pose_wc.inverse().transform_point(&point);
        if p_cam.z <= 0.0 {
            return Err(TriangulationFailure::BehindCamera);
        }
        let dx = p_cam.x / p_cam.z - xn.x;
        let dy = p_cam.y / p_cam.z - xn.y;
        total_error += (dx * dx + dy * dy).sqrt();
    }
    let mean_error = total_error / views.len() as f64;
    if mean_error > thresholds.max_mean_error {
        return Err(TriangulationFailure::LargeError(mean_error));
    }

    Ok(Triangulated {
        point,
        max_parallax,
        mean_error,
    })
}

/// Largest angle between any two viewing rays, expressed in the world frame.
fn max_ray_angle(views: &[(SE3, Vector3<f64>)]) -> f64 {
    let rays: Vec<Vector3<f64>> = views
        .iter()
        .map(|(pose_wc, xn)| pose_wc.rotation * xn.normalize())
        .collect();

    let mut best = 0.0_f64;
    for i in 0..rays.len() {
        for j in (i + 1)..rays.len() {
            best = best.max(rays[i].angle(&rays[j]));
        }
    }
    best
}

/// 3×4 projection `[R | t]` of a world-to-camera transform.
fn projection_matrix(pose_cw: &SE3) -> SMatrix<f64, 3, 4> {
    let mut p = SMatrix::<f64, 3, 4>::zeros();
    p.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&pose_cw.rotation_matrix());
    p.fixed_view_mut::<3, 1>(0, 3).copy_from(&pose_cw.translation);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn thresholds() -> TriangulationThresholds {
        TriangulationThresholds {
            min_parallax: 1.0_f64.to_radians(),
            max_mean_error: 0.01,
        }
    }

    fn observe(pose_wc: &SE3, p_world: &Vector3<f64>) -> (SE3, Vector3<f64>) {
        let p_cam = pose_wc.inverse().transform_point(p_world);
        (*pose_wc, Vector3::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z, 1.0))
    }

    #[test]
    fn test_three_view_triangulation() {
        let p_world = Vector3::new(0.3, -0.2, 5.0);
        let views: Vec<_> = [-0.5, 0.0, 0.5]
            .iter()
            .map(|&x| observe(&SE3::from_translation(Vector3::new(x, 0.1 * x, 0.0)), &p_world))
            .collect();

        let tri = triangulate_views(&views, &thresholds()).unwrap();
        assert_relative_eq!(tri.point, p_world, epsilon = 1e-6);
        assert!(tri.mean_error < 1e-9);
    }

    #[test]
    fn test_collinear_views_rejected() {
        // Cameras translate along the ray toward the point: zero parallax.
        let p_world = Vector3::new(0.0, 0.0, 5.0);
        let views: Vec<_> = [0.0, 0.5, 1.0]
            .iter()
            .map(|&z| observe(&SE3::from_translation(Vector3::new(0.0, 0.0, z)), &p_world))
            .collect();

        assert!(matches!(
            triangulate_views(&views, &thresholds()),
            Err(TriangulationFailure::LowParallax(_))
        ));
    }

    #[test]
    fn test_single_view_rejected() {
        let views = vec![(SE3::identity(), Vector3::new(0.0, 0.0, 1.0))];
        assert_eq!(
            triangulate_views(&views, &thresholds()).unwrap_err(),
            TriangulationFailure::TooFewViews(1)
        );
    }
}
