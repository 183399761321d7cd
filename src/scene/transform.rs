use anyhow::{Context, Result};
use na::{matrix, vector, Matrix4, Vector3};
use nalgebra as na;

use crate::util::{from_hom_vector, to_hom_vector};

/// Resolution of the depth range produced by [`viewport`]; used only for
/// depth-buffer comparison, never for color.
pub const DEPTH_RESOLUTION: f32 = 255.0;

/// Camera and frustum parameters for one render pass.
///
/// `near` and `far` are negative distances along the viewing axis (the camera
/// looks down negative z in its own frame), `fov` is the vertical half-angle
/// in degrees and `aspect` is height over width. With this convention the
/// near plane lands at normalized device z = +1 and the far plane at -1, so
/// larger depth values are nearer.
pub struct Camera {
    pub eye: Vector3<f32>,
    pub target: Vector3<f32>,
    pub up: Vector3<f32>,
    pub near: f32,
    pub far: f32,
    pub fov: f32,
    pub aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        return Self {
            eye: vector![1.0, 1.0, 3.0],
            target: vector![0.0, 0.0, 0.0],
            up: vector![0.0, 1.0, 0.0],
            near: -1.0,
            far: -100.0,
            fov: 30.0,
            aspect: 1.0,
        };
    }
}

/// Object space scaling, identity elsewhere.
pub fn model(scale: Vector3<f32>) -> Matrix4<f32> {
    return matrix![scale.x, 0.0,     0.0,     0.0;
                   0.0,     scale.y, 0.0,     0.0;
                   0.0,     0.0,     scale.z, 0.0;
                   0.0,     0.0,     0.0,     1.0];
}

/// World to camera space. The basis is re-orthogonalized around the viewing
/// direction, so `up` only has to be non-parallel to it.
/// Precondition: eye != target (a zero forward vector propagates NaN).
pub fn view(eye: Vector3<f32>, target: Vector3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    let forward = (target - eye).normalize();
    let right = forward.cross(&up).normalize();
    let true_up = right.cross(&forward);
    let rotation = matrix![right.x,    right.y,    right.z,    0.0;
                           true_up.x,  true_up.y,  true_up.z,  0.0;
                           -forward.x, -forward.y, -forward.z, 0.0;
                           0.0,        0.0,        0.0,        1.0];
    let translation = matrix![1.0, 0.0, 0.0, -eye.x;
                              0.0, 1.0, 0.0, -eye.y;
                              0.0, 0.0, 1.0, -eye.z;
                              0.0, 0.0, 0.0, 1.0];
    return rotation * translation;
}

/// Perspective projection via the perspective-to-orthographic factorization:
/// a matrix squashing the frustum into a box, followed by an orthographic
/// scale and translate derived from the field-of-view-implied bounds.
/// Undefined result if near == far.
pub fn projection(near: f32, far: f32, fov: f32, aspect: f32) -> Matrix4<f32> {
    let persp_to_ortho = matrix![near, 0.0,  0.0,        0.0;
                                 0.0,  near, 0.0,        0.0;
                                 0.0,  0.0,  near + far, -near * far;
                                 0.0,  0.0,  1.0,        0.0];
    let top = -near * fov.to_radians().tan();
    let bottom = -top;
    let right = top / aspect;
    let left = -right;
    let ortho_scale = matrix![2.0 / (right - left), 0.0,                  0.0,                0.0;
                              0.0,                  2.0 / (top - bottom), 0.0,                0.0;
                              0.0,                  0.0,                  2.0 / (near - far), 0.0;
                              0.0,                  0.0,                  0.0,                1.0];
    let ortho_translate = matrix![1.0, 0.0, 0.0, -(left + right) / 2.0;
                                  0.0, 1.0, 0.0, -(top + bottom) / 2.0;
                                  0.0, 0.0, 1.0, -(near + far) / 2.0;
                                  0.0, 0.0, 0.0, 1.0];
    return ortho_scale * ortho_translate * persp_to_ortho;
}

/// Normalized device coordinates to pixel coordinates in [0, width] x
/// [0, height], with depth remapped to [0, DEPTH_RESOLUTION].
pub fn viewport(width: u32, height: u32) -> Matrix4<f32> {
    let w = width as f32;
    let h = height as f32;
    let d = DEPTH_RESOLUTION;
    return matrix![w / 2.0, 0.0,     0.0,     w / 2.0;
                   0.0,     h / 2.0, 0.0,     h / 2.0;
                   0.0,     0.0,     d / 2.0, d / 2.0;
                   0.0,     0.0,     0.0,     1.0];
}

/// Per-render-pass constants shared by every shader: the composed vertex
/// transform and the matrices and light direction needed to shade in camera
/// space. Built once by the caller and passed by reference, replacing any
/// process-wide matrix state.
pub struct Uniforms {
    /// viewport * projection * view * model, applied to vertex positions.
    pub transform: Matrix4<f32>,
    /// view * model, applied to positions and directions shaded in camera space.
    pub model_view: Matrix4<f32>,
    /// Inverse transpose of `model_view`, applied to normals.
    pub it_model_view: Matrix4<f32>,
    /// Light direction in camera space, normalized.
    pub light_direction: Vector3<f32>,
}

impl Uniforms {
    pub fn new(
        camera: &Camera,
        light_direction: Vector3<f32>,
        scale: Vector3<f32>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let model_view = view(camera.eye, camera.target, camera.up) * model(scale);
        let transform = viewport(width, height)
            * projection(camera.near, camera.far, camera.fov, camera.aspect)
            * model_view;
        let it_model_view = model_view
            .transpose()
            .try_inverse()
            .context("camera basis is degenerate, model-view matrix is not invertible")?;
        let light_direction = from_hom_vector(model_view * to_hom_vector(light_direction)).normalize();
        return Ok(Self {
            transform,
            model_view,
            it_model_view,
            light_direction,
        });
    }
}
