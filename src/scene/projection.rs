//! Projections and view rays

use glam::{Mat4, Vec3, Vec4};

/// Projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => *far,
        }
    }
}

/// Eye-space rays through the four corners of the view frustum
///
/// Corner order is (-x, -y), (+x, -y), (-x, +y), (+x, +y). Each ray starts
/// on the near plane and its direction is scaled so that `z == -1`, so an
/// eye-space position at depth `d` behind the near plane is
/// `origin + direction * d`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewRays {
    pub origins: [Vec3; 4],
    pub directions: [Vec3; 4],
}

impl ViewRays {
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)];

    /// Compute rays from an inverse projection with a `[0, 1]` depth range.
    pub fn from_inverse_projection(inverse_projection: Mat4) -> Self {
        let unproject = |x: f32, y: f32, z: f32| {
            let p = inverse_projection * Vec4::new(x, y, z, 1.0);
            p.truncate() / p.w
        };

        let mut rays = ViewRays::default();
        for (i, (x, y)) in Self::CORNERS.iter().enumerate() {
            let near = unproject(*x, *y, 0.0);
            let far = unproject(*x, *y, 1.0);
            let span = near.z - far.z;
            rays.origins[i] = near;
            rays.directions[i] = if span.abs() > f32::EPSILON {
                (far - near) / span
            } else {
                Vec3::NEG_Z
            };
        }
        rays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_far() {
        let p = Projection::perspective(90.0, 1.0, 1.0, 100.0);
        assert_eq!(p.near(), 1.0);
        assert_eq!(p.far(), 100.0);
    }

    #[test]
    fn test_view_rays_orthographic_are_parallel() {
        let p = Projection::orthographic(4.0, 2.0, 1.0, 10.0);
        let rays = ViewRays::from_inverse_projection(p.matrix().inverse());
        for direction in rays.directions {
            assert!(direction.abs_diff_eq(Vec3::NEG_Z, 1e-4));
        }
        assert!(rays.origins[0].abs_diff_eq(Vec3::new(-2.0, -1.0, -1.0), 1e-4));
        assert!(rays.origins[3].abs_diff_eq(Vec3::new(2.0, 1.0, -1.0), 1e-4));
    }

    #[test]
    fn test_view_rays_perspective_diverge() {
        let p = Projection::perspective(90.0, 1.0, 1.0, 100.0);
        let rays = ViewRays::from_inverse_projection(p.matrix().inverse());
        // 90 degree frustum: corners widen by one unit per unit of depth
        assert!(rays.directions[3].abs_diff_eq(Vec3::new(1.0, 1.0, -1.0), 1e-3));
        assert!(rays.origins[0].abs_diff_eq(Vec3::new(-1.0, -1.0, -1.0), 1e-3));
    }
}
