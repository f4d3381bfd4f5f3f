use crate::{EulerRot, Mat4, Quat, Vec3};

/// Placement of a drawn mesh: position, Euler rotation in degrees (XYZ), scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_deg: Vec3,
    pub scale: Vec3,
}

impl Transform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation_deg: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    #[inline]
    pub fn from_trs(position: Vec3, rotation_deg: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation_deg,
            scale,
        }
    }

    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.rotation_deg.x.to_radians(),
            self.rotation_deg.y.to_radians(),
            self.rotation_deg.z.to_radians(),
        )
    }

    /// Model matrix = T * R * S (column-major Mat4 per glam).
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.position)
    }

    /// Inverse-transpose of the model matrix, for transforming normals.
    pub fn normal_matrix(&self) -> Mat4 {
        let m = self.matrix();
        if m.determinant().abs() <= f32::EPSILON {
            return Mat4::IDENTITY;
        }
        m.inverse().transpose()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3;

    #[test]
    fn rotation_is_in_degrees() {
        let t = Transform::from_trs(Vec3::ZERO, vec3(0.0, 90.0, 0.0), Vec3::ONE);
        let p = t.matrix().transform_point3(Vec3::X);
        assert!((p - vec3(0.0, 0.0, -1.0)).length() < 1e-5, "got {p}");
    }

    #[test]
    fn zero_scale_normal_matrix_falls_back_to_identity() {
        let t = Transform::from_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ZERO);
        assert_eq!(t.normal_matrix(), Mat4::IDENTITY);
    }
}
