use crate::{EngineError, EngineResult, Mat4, Vec3};

const PARALLEL_EPSILON: f32 = 1e-6;

/// Right-handed view matrix looking from `eye` towards `target`.
///
/// Fails with [`EngineError::DegenerateCamera`] when the basis cannot be built:
/// `eye == target`, `up` parallel to the view direction, or non-finite input.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> EngineResult<Mat4> {
    if !(eye.is_finite() && target.is_finite() && up.is_finite()) {
        return Err(EngineError::DegenerateCamera {
            reason: "non-finite eye, target or up vector".into(),
        });
    }

    let forward = target - eye;
    if forward.length_squared() <= PARALLEL_EPSILON * PARALLEL_EPSILON {
        return Err(EngineError::DegenerateCamera {
            reason: format!("eye and target coincide at {eye}"),
        });
    }
    if up.length_squared() <= PARALLEL_EPSILON * PARALLEL_EPSILON {
        return Err(EngineError::DegenerateCamera {
            reason: "up vector has zero length".into(),
        });
    }

    let side = forward.normalize().cross(up.normalize());
    if side.length_squared() <= PARALLEL_EPSILON {
        return Err(EngineError::DegenerateCamera {
            reason: format!("up {up} is parallel to view direction {forward}"),
        });
    }

    Ok(Mat4::look_at_rh(eye, target, up))
}

/// Simple perspective camera (right-handed).
#[derive(Clone, Copy, Debug)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            position,
            target,
            up,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_perspective(mut self, fov_y_rad: f32, z_near: f32, z_far: f32) -> Self {
        self.fov_y_rad = fov_y_rad;
        self.z_near = z_near;
        self.z_far = z_far;
        self
    }

    #[inline]
    pub fn view(&self) -> EngineResult<Mat4> {
        look_at(self.position, self.target, self.up)
    }

    /// NOTE: depth maps to [0,1]; wgpu normalizes clip space this way on the GL backend too.
    #[inline]
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_rad, aspect.max(1e-6), self.z_near, self.z_far)
    }

    #[inline]
    pub fn view_projection(&self, aspect: f32) -> EngineResult<Mat4> {
        Ok(self.projection(aspect) * self.view()?)
    }
}

impl Default for Camera3D {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_rad: 60f32.to_radians(),
            z_near: 0.1,
            z_far: 100.0,
        }
    }
}
