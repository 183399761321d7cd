use std::time;

use anyhow::{ensure, Context, Result};
use image::RgbImage;
use log::info;
use na::{vector, Vector4};
use nalgebra as na;

use crate::scene::model::Model;
use crate::scene::shader::create_shader;
use crate::scene::transform::{Camera, Uniforms};
use crate::scene::RenderTarget;

/// Everything one render pass needs, owned by the caller.
pub struct Params {
    pub width: u32,
    pub height: u32,
    pub supersampling: u32,
    pub asset_path: String,
    pub shader_pipeline_name: String,
    pub output_path: String,
    pub depth_path: Option<String>,
}

/// Runs a single offline pass: load assets, render every face of the model in
/// mesh order, write the output raster.
pub fn run(params: Params) -> Result<()> {
    ensure!(params.supersampling >= 1, "supersampling factor must be at least 1");

    let model = Model::open(&params.asset_path)?;

    let camera = Camera {
        aspect: params.height as f32 / params.width as f32,
        ..Camera::default()
    };
    let light_direction = vector![1.0, 1.0, 1.0];
    let uniforms = Uniforms::new(
        &camera,
        light_direction,
        vector![1.0, 1.0, 1.0],
        params.width,
        params.height,
    )?;

    let mut shader = create_shader(&params.shader_pipeline_name, &model, &uniforms)?;
    let mut target = RenderTarget::new(params.width, params.height, params.supersampling);

    let time_begin = time::Instant::now();
    for face in 0..model.nfaces() {
        let mut pts = [Vector4::zeros(); 3];
        for nthvert in 0..3 {
            pts[nthvert] = shader.vertex(face, nthvert);
        }
        target.draw_triangle(&pts, shader.as_ref());
    }
    info!(
        "rendered {} faces with the {} pipeline in {:.3}s",
        model.nfaces(),
        params.shader_pipeline_name,
        time_begin.elapsed().as_secs_f32()
    );

    let image = RgbImage::from_raw(params.width, params.height, target.as_render_data().to_vec())
        .context("render target produced a malformed pixel buffer")?;
    image
        .save(&params.output_path)
        .with_context(|| format!("failed to write {}", params.output_path))?;
    info!("wrote {}", params.output_path);

    if let Some(depth_path) = &params.depth_path {
        let depth = RgbImage::from_raw(params.width, params.height, target.as_depth_data().to_vec())
            .context("render target produced a malformed depth buffer")?;
        depth
            .save(depth_path)
            .with_context(|| format!("failed to write {}", depth_path))?;
        info!("wrote {}", depth_path);
    }

    return Ok(());
}
