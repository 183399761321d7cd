use anyhow::{bail, Context, Result};
use na::{vector, Matrix2x3, Matrix3, Vector3, Vector4};
use nalgebra as na;

use super::model::{Model, Texture};
use super::transform::Uniforms;
use super::{Color, BLACK};
use crate::util::{from_hom_point, from_hom_vector, to_hom_point, to_hom_vector};

/// A shading policy: the only extension point of the pipeline.
///
/// `vertex` is invoked exactly three times per face, in order 0, 1, 2; it
/// applies the full composed transform to the vertex position and stashes
/// whatever varying state `fragment` will interpolate. `fragment` is invoked
/// once per covered sample with the barycentric weights of that sample and
/// returns whether the sample should be discarded (true = write nothing).
pub trait Shader {
    fn vertex(&mut self, face: usize, nthvert: usize) -> Vector4<f32>;
    fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool;
}

/// Looks up a shading policy by pipeline name. Pipelines that need companion
/// textures the model does not carry fail here, never mid-render.
pub fn create_shader<'a>(
    name: &str,
    model: &'a Model,
    uniforms: &'a Uniforms,
) -> Result<Box<dyn Shader + 'a>> {
    return match name {
        "default" => Ok(Box::new(FlatShader::new(model, uniforms))),
        "gouraud" => Ok(Box::new(GouraudShader::new(model, uniforms))),
        "normal_map" => {
            let normal_map = model
                .normal_map()
                .context("the normal_map pipeline needs a _nm companion texture")?;
            Ok(Box::new(NormalMapShader::new(model, uniforms, normal_map)))
        }
        "specular" => {
            let normal_map = model
                .normal_map()
                .context("the specular pipeline needs a _nm companion texture")?;
            let specular_map = model
                .specular_map()
                .context("the specular pipeline needs a _spec companion texture")?;
            Ok(Box::new(SpecularShader::new(model, uniforms, normal_map, specular_map)))
        }
        "darboux" => {
            let tangent_map = model
                .tangent_map()
                .context("the darboux pipeline needs a _nm_tangent companion texture")?;
            Ok(Box::new(DarbouxShader::new(model, uniforms, tangent_map)))
        }
        _ => bail!("unsupported shader pipeline: {}", name),
    };
}

fn transform_position(uniforms: &Uniforms, model: &Model, face: usize, nthvert: usize) -> Vector4<f32> {
    return uniforms.transform * to_hom_point(model.position(face, nthvert));
}

fn transform_normal(uniforms: &Uniforms, normal: Vector3<f32>) -> Vector3<f32> {
    return from_hom_vector(uniforms.it_model_view * to_hom_vector(normal)).normalize();
}

/// Face-normal diffuse shading: one intensity per face, flat across it,
/// modulating the diffuse texture.
pub struct FlatShader<'a> {
    model: &'a Model,
    uniforms: &'a Uniforms,
    uvs: Matrix2x3<f32>,
    intensity: f32,
}

impl<'a> FlatShader<'a> {
    pub fn new(model: &'a Model, uniforms: &'a Uniforms) -> Self {
        return Self {
            model,
            uniforms,
            uvs: Matrix2x3::zeros(),
            intensity: 0.0,
        };
    }
}

impl Shader for FlatShader<'_> {
    fn vertex(&mut self, face: usize, nthvert: usize) -> Vector4<f32> {
        if nthvert == 0 {
            let normal = transform_normal(self.uniforms, self.model.face_normal(face));
            self.intensity = self.uniforms.light_direction.dot(&normal).max(0.0);
        }
        self.uvs.set_column(nthvert, &self.model.uv(face, nthvert));
        return transform_position(self.uniforms, self.model, face, nthvert);
    }

    fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool {
        let uv = self.uvs * bar;
        *color = Color::blend(self.model.diffuse_at(uv), BLACK, self.intensity);
        return false;
    }
}

/// Gouraud shading: light intensity at each vertex, interpolated across the
/// face in the fragment stage.
pub struct GouraudShader<'a> {
    model: &'a Model,
    uniforms: &'a Uniforms,
    uvs: Matrix2x3<f32>,
    varying_intensity: Vector3<f32>,
}

impl<'a> GouraudShader<'a> {
    pub fn new(model: &'a Model, uniforms: &'a Uniforms) -> Self {
        return Self {
            model,
            uniforms,
            uvs: Matrix2x3::zeros(),
            varying_intensity: Vector3::zeros(),
        };
    }
}

impl Shader for GouraudShader<'_> {
    fn vertex(&mut self, face: usize, nthvert: usize) -> Vector4<f32> {
        let normal = transform_normal(self.uniforms, self.model.normal(face, nthvert));
        self.varying_intensity[nthvert] = self.uniforms.light_direction.dot(&normal).max(0.0);
        self.uvs.set_column(nthvert, &self.model.uv(face, nthvert));
        return transform_position(self.uniforms, self.model, face, nthvert);
    }

    fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool {
        let intensity = bar.dot(&self.varying_intensity);
        let uv = self.uvs * bar;
        *color = Color::blend(self.model.diffuse_at(uv), BLACK, intensity);
        return false;
    }
}

/// Per-fragment normals looked up in a normal map in global coordinates.
pub struct NormalMapShader<'a> {
    model: &'a Model,
    uniforms: &'a Uniforms,
    normal_map: &'a Texture,
    uvs: Matrix2x3<f32>,
}

impl<'a> NormalMapShader<'a> {
    pub fn new(model: &'a Model, uniforms: &'a Uniforms, normal_map: &'a Texture) -> Self {
        return Self {
            model,
            uniforms,
            normal_map,
            uvs: Matrix2x3::zeros(),
        };
    }
}

impl Shader for NormalMapShader<'_> {
    fn vertex(&mut self, face: usize, nthvert: usize) -> Vector4<f32> {
        self.uvs.set_column(nthvert, &self.model.uv(face, nthvert));
        return transform_position(self.uniforms, self.model, face, nthvert);
    }

    fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool {
        let uv = self.uvs * bar;
        let normal = transform_normal(self.uniforms, self.normal_map.normal_at(uv));
        let intensity = self.uniforms.light_direction.dot(&normal).max(0.0);
        *color = Color::blend(self.model.diffuse_at(uv), BLACK, intensity);
        return false;
    }
}

/// Normal-map shading plus a specular term with a per-fragment shininess
/// exponent from the specular map.
pub struct SpecularShader<'a> {
    model: &'a Model,
    uniforms: &'a Uniforms,
    normal_map: &'a Texture,
    specular_map: &'a Texture,
    uvs: Matrix2x3<f32>,
}

impl<'a> SpecularShader<'a> {
    pub fn new(
        model: &'a Model,
        uniforms: &'a Uniforms,
        normal_map: &'a Texture,
        specular_map: &'a Texture,
    ) -> Self {
        return Self {
            model,
            uniforms,
            normal_map,
            specular_map,
            uvs: Matrix2x3::zeros(),
        };
    }
}

impl Shader for SpecularShader<'_> {
    fn vertex(&mut self, face: usize, nthvert: usize) -> Vector4<f32> {
        self.uvs.set_column(nthvert, &self.model.uv(face, nthvert));
        return transform_position(self.uniforms, self.model, face, nthvert);
    }

    fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool {
        let uv = self.uvs * bar;
        let light = self.uniforms.light_direction;
        let normal = transform_normal(self.uniforms, self.normal_map.normal_at(uv));
        let reflected = (2.0 * normal * normal.dot(&light) - light).normalize();
        let diffuse = normal.dot(&light).max(0.0);
        // In camera space the view direction is the z axis, so only the z
        // component of the reflected ray contributes.
        let specular = 0.6 * reflected.z.max(0.0).powf(self.specular_map.scalar_at(uv));
        let base = self.model.diffuse_at(uv);
        *color = Color {
            r: ((diffuse + specular) * base.r as f32).min(255.0) as u8,
            g: ((diffuse + specular) * base.g as f32).min(255.0) as u8,
            b: ((diffuse + specular) * base.b as f32).min(255.0) as u8,
        };
        return false;
    }
}

/// Tangent-space normal mapping: the map stores normals in the Darboux frame
/// of the surface, reconstructed per fragment from the interpolated normal
/// and the uv parametrization.
pub struct DarbouxShader<'a> {
    model: &'a Model,
    uniforms: &'a Uniforms,
    tangent_map: &'a Texture,
    uvs: Matrix2x3<f32>,
    varying_normals: Matrix3<f32>,  // Transformed vertex normals as columns.
    varying_positions: Matrix3<f32>, // Camera space vertex positions as columns.
}

impl<'a> DarbouxShader<'a> {
    pub fn new(model: &'a Model, uniforms: &'a Uniforms, tangent_map: &'a Texture) -> Self {
        return Self {
            model,
            uniforms,
            tangent_map,
            uvs: Matrix2x3::zeros(),
            varying_normals: Matrix3::zeros(),
            varying_positions: Matrix3::zeros(),
        };
    }
}

impl Shader for DarbouxShader<'_> {
    fn vertex(&mut self, face: usize, nthvert: usize) -> Vector4<f32> {
        let normal = transform_normal(self.uniforms, self.model.normal(face, nthvert));
        self.varying_normals.set_column(nthvert, &normal);
        let position = from_hom_point(
            self.uniforms.model_view * to_hom_point(self.model.position(face, nthvert)),
        );
        self.varying_positions.set_column(nthvert, &position);
        self.uvs.set_column(nthvert, &self.model.uv(face, nthvert));
        return transform_position(self.uniforms, self.model, face, nthvert);
    }

    fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool {
        let base_normal = (self.varying_normals * bar).normalize();

        // Rows are the face edges and the interpolated normal; inverting this
        // frame expresses the uv gradients in camera space.
        let mut frame = Matrix3::zeros();
        frame.set_row(0, &(self.varying_positions * vector![-1.0, 1.0, 0.0]).transpose());
        frame.set_row(1, &(self.varying_positions * vector![-1.0, 0.0, 1.0]).transpose());
        frame.set_row(2, &base_normal.transpose());
        let inverse_frame = match frame.try_inverse() {
            Some(inverse) => inverse,
            // Degenerate frame, nothing sensible to shade.
            None => return true,
        };
        let tangent = inverse_frame
            * vector![self.uvs.m12 - self.uvs.m11, self.uvs.m13 - self.uvs.m11, 0.0];
        let bitangent = inverse_frame
            * vector![self.uvs.m22 - self.uvs.m21, self.uvs.m23 - self.uvs.m21, 0.0];

        let mut darboux = Matrix3::zeros();
        darboux.set_column(0, &tangent.normalize());
        darboux.set_column(1, &bitangent.normalize());
        darboux.set_column(2, &base_normal);

        let uv = self.uvs * bar;
        let normal = (darboux * self.tangent_map.normal_at(uv)).normalize();
        let intensity = self.uniforms.light_direction.dot(&normal).max(0.0);
        *color = Color::blend(self.model.diffuse_at(uv), BLACK, intensity);
        return false;
    }
}
