use nalgebra as na;
use na::{vector, Vector3, Vector4};

/// Transformation of a point to homogenous coordinates.
pub fn to_hom_point(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 1.0];
}

/// Transformation of a vector to homogenous coordinates.
pub fn to_hom_vector(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 0.0];
}

/// Transformation of a point from homogenous coordinates.
pub fn from_hom_point(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x / v.w, v.y / v.w, v.z / v.w];
}

/// Transformation of a vector from homogenous coordinates.
pub fn from_hom_vector(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x, v.y, v.z];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_embed_and_project_are_inverse() {
        let p = vector![1.0, -2.0, 3.0];
        assert_eq!(from_hom_point(to_hom_point(p)), p);
    }

    #[test]
    fn point_projection_divides_by_w() {
        let p = from_hom_point(vector![2.0, 4.0, 6.0, 2.0]);
        assert_eq!(p, vector![1.0, 2.0, 3.0]);
    }

    #[test]
    fn vector_embed_has_zero_w() {
        let v = to_hom_vector(vector![1.0, 2.0, 3.0]);
        assert_eq!(v.w, 0.0);
        assert_eq!(from_hom_vector(v), vector![1.0, 2.0, 3.0]);
    }
}
