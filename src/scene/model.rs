use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use image::RgbImage;
use log::{debug, info};
use na::{vector, Vector2, Vector3};
use nalgebra as na;
use obj::raw::object::Polygon;
use obj::raw::{parse_obj, RawObj};

use super::{Color, WHITE};

/// Image used as a shading input, sampled by normalized uv coordinates.
pub struct Texture {
    image: RgbImage,
}

impl Texture {
    pub fn open(path: &Path) -> Result<Texture> {
        let image = image::open(path)
            .with_context(|| format!("failed to read texture {}", path.display()))?
            .to_rgb8();
        return Ok(Texture { image });
    }

    pub fn from_image(image: RgbImage) -> Texture {
        return Texture { image };
    }

    /// Raw sample at a normalized uv coordinate. v is flipped to match the
    /// bottom-up row order of the source rasters; indices are clamped to the
    /// texture bounds.
    pub fn sample(&self, uv: Vector2<f32>) -> [u8; 3] {
        let (width, height) = self.image.dimensions();
        let x = ((uv.x * width as f32) as i64).clamp(0, width as i64 - 1) as u32;
        let y = ((uv.y * height as f32) as i64).clamp(0, height as i64 - 1) as u32;
        return self.image.get_pixel(x, height - 1 - y).0;
    }

    pub fn color_at(&self, uv: Vector2<f32>) -> Color {
        let pixel = self.sample(uv);
        return Color { r: pixel[0], g: pixel[1], b: pixel[2] };
    }

    /// Decodes an rgb-encoded unit vector, one channel per component mapped
    /// from [0, 255] to [-1, 1].
    pub fn normal_at(&self, uv: Vector2<f32>) -> Vector3<f32> {
        let pixel = self.sample(uv);
        return vector![
            pixel[0] as f32 / 255.0 * 2.0 - 1.0,
            pixel[1] as f32 / 255.0 * 2.0 - 1.0,
            pixel[2] as f32 / 255.0 * 2.0 - 1.0
        ]
        .normalize();
    }

    /// Scalar value of the first channel, e.g. a shininess exponent.
    pub fn scalar_at(&self, uv: Vector2<f32>) -> f32 {
        return self.sample(uv)[0] as f32;
    }
}

/// Triangle mesh with its companion textures.
///
/// Faces resolve separate position / texture coordinate / normal indices per
/// vertex; accessors take a face index and a vertex-in-face index 0..2.
pub struct Model {
    raw: RawObj,
    diffuse: Option<Texture>,
    normal_map: Option<Texture>,
    specular_map: Option<Texture>,
    tangent_map: Option<Texture>,
}

impl Model {
    /// Loads `<base_path>.obj` and whichever companion textures exist next to
    /// it (`_diffuse.tga`, `_nm.tga`, `_spec.tga`, `_nm_tangent.tga`).
    pub fn open(base_path: &str) -> Result<Model> {
        let obj_path = format!("{}.obj", base_path);
        let file = File::open(&obj_path).with_context(|| format!("failed to open model {}", obj_path))?;
        let mut model = Model::from_reader(BufReader::new(file))?;
        info!("loaded model {}: {} vertices, {} faces", obj_path, model.nverts(), model.nfaces());

        model.diffuse = load_companion_texture(base_path, "_diffuse.tga");
        model.normal_map = load_companion_texture(base_path, "_nm.tga");
        model.specular_map = load_companion_texture(base_path, "_spec.tga");
        model.tangent_map = load_companion_texture(base_path, "_nm_tangent.tga");
        return Ok(model);
    }

    /// Parses OBJ records from a reader; the mesh must be triangulated and
    /// all face indices must resolve.
    pub fn from_reader(reader: impl BufRead) -> Result<Model> {
        let raw = parse_obj(reader)?;
        validate_faces(&raw)?;
        return Ok(Model {
            raw,
            diffuse: None,
            normal_map: None,
            specular_map: None,
            tangent_map: None,
        });
    }

    pub fn nverts(&self) -> usize {
        return self.raw.positions.len();
    }

    pub fn nfaces(&self) -> usize {
        return self.raw.polygons.len();
    }

    fn indices(&self, face: usize, nthvert: usize) -> (usize, Option<usize>, Option<usize>) {
        return match &self.raw.polygons[face] {
            Polygon::P(v) => (v[nthvert], None, None),
            Polygon::PT(v) => (v[nthvert].0, Some(v[nthvert].1), None),
            Polygon::PN(v) => (v[nthvert].0, None, Some(v[nthvert].1)),
            Polygon::PTN(v) => (v[nthvert].0, Some(v[nthvert].1), Some(v[nthvert].2)),
        };
    }

    /// Object space position of a face vertex.
    pub fn position(&self, face: usize, nthvert: usize) -> Vector3<f32> {
        let (position, _, _) = self.indices(face, nthvert);
        let (x, y, z, _) = self.raw.positions[position];
        return vector![x, y, z];
    }

    /// Texture coordinate of a face vertex; (0, 0) when the mesh has none.
    pub fn uv(&self, face: usize, nthvert: usize) -> Vector2<f32> {
        let (_, tex_coord, _) = self.indices(face, nthvert);
        return match tex_coord {
            Some(index) => {
                let (u, v, _) = self.raw.tex_coords[index];
                vector![u, v]
            }
            None => Vector2::zeros(),
        };
    }

    /// Unit normal of a face vertex, falling back to the face normal when the
    /// mesh carries no normal records.
    pub fn normal(&self, face: usize, nthvert: usize) -> Vector3<f32> {
        let (_, _, normal) = self.indices(face, nthvert);
        return match normal {
            Some(index) => {
                let (x, y, z) = self.raw.normals[index];
                vector![x, y, z].normalize()
            }
            None => self.face_normal(face),
        };
    }

    /// Unit normal of the face plane.
    pub fn face_normal(&self, face: usize) -> Vector3<f32> {
        let a = self.position(face, 0);
        let b = self.position(face, 1);
        let c = self.position(face, 2);
        return (b - a).cross(&(c - a)).normalize();
    }

    /// Diffuse color at a uv coordinate; white for an untextured model.
    pub fn diffuse_at(&self, uv: Vector2<f32>) -> Color {
        return match &self.diffuse {
            Some(texture) => texture.color_at(uv),
            None => WHITE,
        };
    }

    pub fn normal_map(&self) -> Option<&Texture> {
        return self.normal_map.as_ref();
    }

    pub fn specular_map(&self) -> Option<&Texture> {
        return self.specular_map.as_ref();
    }

    pub fn tangent_map(&self) -> Option<&Texture> {
        return self.tangent_map.as_ref();
    }
}

fn validate_faces(raw: &RawObj) -> Result<()> {
    for (face, polygon) in raw.polygons.iter().enumerate() {
        let vertices: Vec<(usize, Option<usize>, Option<usize>)> = match polygon {
            Polygon::P(v) => v.iter().map(|&p| (p, None, None)).collect(),
            Polygon::PT(v) => v.iter().map(|&(p, t)| (p, Some(t), None)).collect(),
            Polygon::PN(v) => v.iter().map(|&(p, n)| (p, None, Some(n))).collect(),
            Polygon::PTN(v) => v.iter().map(|&(p, t, n)| (p, Some(t), Some(n))).collect(),
        };
        ensure!(
            vertices.len() == 3,
            "face {} has {} vertices, only triangulated meshes are supported",
            face,
            vertices.len()
        );
        for &(position, tex_coord, normal) in &vertices {
            ensure!(
                position < raw.positions.len(),
                "face {} references missing position {}", face, position
            );
            if let Some(index) = tex_coord {
                ensure!(
                    index < raw.tex_coords.len(),
                    "face {} references missing texture coordinate {}", face, index
                );
            }
            if let Some(index) = normal {
                ensure!(
                    index < raw.normals.len(),
                    "face {} references missing normal {}", face, index
                );
            }
        }
    }
    return Ok(());
}

fn load_companion_texture(base_path: &str, suffix: &str) -> Option<Texture> {
    let path = format!("{}{}", base_path, suffix);
    return match Texture::open(Path::new(&path)) {
        Ok(texture) => {
            info!("loaded texture {}", path);
            Some(texture)
        }
        Err(err) => {
            debug!("skipping texture: {:#}", err);
            None
        }
    };
}
