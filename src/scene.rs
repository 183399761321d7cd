pub mod model;
pub mod shader;
pub mod transform;

use nalgebra as na;
use na::{vector, Vector2, Vector3, Vector4};

use self::shader::Shader;

/// Struct, representing raw rgb8 pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };
pub const BLACK: Color = Color { r: 0,   g: 0,   b: 0   };

impl Color {
    /// Get convex combination of two colors: t * c_1 + (1 - t) * c_2.
    /// t is unrestricted.
    pub fn blend(color_1: Color, color_2: Color, t: f32) -> Color {
        return Color {
            r: (t * color_1.r as f32 + (1.0 - t) * color_2.r as f32) as u8,
            g: (t * color_1.g as f32 + (1.0 - t) * color_2.g as f32) as u8,
            b: (t * color_1.b as f32 + (1.0 - t) * color_2.b as f32) as u8,
        }
    }
}

/// Barycentric coordinates of p with respect to the projected triangle (a, b, c),
/// via the cross-product formulation. A degenerate triangle (twice the signed
/// area below threshold) reports a coordinate with a negative component, which
/// the coverage test treats as "outside".
fn barycentric(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>, p: Vector2<f32>) -> Vector3<f32> {
    let raw_cross = Vector3::new(b.x - a.x, c.x - a.x, a.x - p.x)
        .cross(&Vector3::new(b.y - a.y, c.y - a.y, a.y - p.y));
    if raw_cross.z.abs() < 1e-2 {
        return vector![-1.0, 1.0, 1.0];
    }
    return vector![
        1.0 - (raw_cross.x + raw_cross.y) / raw_cross.z,
        raw_cross.x / raw_cross.z,
        raw_cross.y / raw_cross.z
    ];
}

/// Render target for one pass, owning the output raster and the sample buffers
/// it is downsampled from.
///
/// Color and depth samples live at `factor` times the output resolution; with
/// factor 1 there is exactly one sample per pixel and the same code path
/// applies. (0, 0) is the bottom left screen coordinate; `render_data` is
/// stored top-to-bottom for viewing, the flip happens on pixel write.
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    factor: u32,
    sample_colors: Vec<Color>,
    sample_depths: Vec<f32>, // Fills out with every primitive drawn, larger depth is nearer.
    render_data: Vec<u8>,    // Flat rgb8 output raster.
    depth_data: Vec<u8>,     // Normalized depth values for visualization.
}

impl RenderTarget {
    /// Generates a new target with the specified output resolution and
    /// supersampling factor (1 disables supersampling).
    /// Pixel data format is assumed to be rgb8.
    pub fn new(width: u32, height: u32, factor: u32) -> RenderTarget {
        assert!(factor >= 1, "supersampling factor must be at least 1");
        let n_pixels = (width * height) as usize;
        let n_samples = n_pixels * (factor * factor) as usize;
        return RenderTarget {
            width,
            height,
            factor,
            sample_colors: vec![BLACK; n_samples],
            sample_depths: vec![f32::MIN; n_samples],
            render_data: vec![0; 3 * n_pixels],
            depth_data: vec![0; 3 * n_pixels],
        }
    }

    /// Get rendered pass as a slice of color values of size 3 * (number of pixels),
    /// in top-to-bottom row order.
    pub fn as_render_data(&self) -> &[u8] {
        return &self.render_data[..];
    }

    /// Get image data, representing depth buffer values normalized over the
    /// written range. Lazy in a sense, that color data for the image is
    /// calculated only if this call is made.
    pub fn as_depth_data(&mut self) -> &[u8] {
        let mut z_min = f32::MAX;
        let mut z_max = f32::MIN;
        for &d in &self.sample_depths {
            if d > f32::MIN {
                z_min = z_min.min(d);
                z_max = z_max.max(d);
            }
        }
        let scale = z_max - z_min;
        for x in 0..self.width {
            for y in 0..self.height {
                // Nearest sample of the pixel represents it.
                let mut depth = f32::MIN;
                for i in 0..self.factor {
                    for j in 0..self.factor {
                        let index = self.sample_index(x * self.factor + i, y * self.factor + j);
                        depth = depth.max(self.sample_depths[index]);
                    }
                }
                let value = if depth == f32::MIN {
                    0
                } else if scale > 0.0 {
                    (((depth - z_min) / scale) * 255.0) as u8
                } else {
                    255
                };
                let index = (3 * (x + (self.height - 1 - y) * self.width)) as usize;
                self.depth_data[index + 0] = value;
                self.depth_data[index + 1] = value;
                self.depth_data[index + 2] = value;
            }
        }
        return &self.depth_data[..];
    }

    /// Get output pixel color at screen coordinate (bottom left origin).
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let index = (3 * (x + (self.height - 1 - y) * self.width)) as usize;
        return Color {
            r: self.render_data[index + 0],
            g: self.render_data[index + 1],
            b: self.render_data[index + 2],
        }
    }

    fn sample_index(&self, x: u32, y: u32) -> usize {
        return (x + y * self.width * self.factor) as usize;
    }

    /// Sets output pixel to a color at specified screen coordinate.
    ///
    /// Assumes, that pixel data is rgb8.
    fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        // Pixel data is rgb8, so we find the starting index of a 3-tuple and do 3 assignments.
        // Forcing (0, 0) to be in the bottom left here by inverting y.
        let index = (3 * (x + (self.height as i32 - 1 - y) * self.width as i32)) as usize;
        self.render_data[index + 0] = color.r;
        self.render_data[index + 1] = color.g;
        self.render_data[index + 2] = color.b;
    }

    /// Recomputes one output pixel as the unweighted average of its covering
    /// samples, so the output raster always agrees with the sample contents.
    fn recompute_pixel(&mut self, x: i32, y: i32) {
        let mut sum = [0u32; 3];
        for i in 0..self.factor {
            for j in 0..self.factor {
                let index = self.sample_index(x as u32 * self.factor + i, y as u32 * self.factor + j);
                let sample = self.sample_colors[index];
                sum[0] += sample.r as u32;
                sum[1] += sample.g as u32;
                sum[2] += sample.b as u32;
            }
        }
        let count = self.factor * self.factor;
        self.set_pixel(x, y, Color {
            r: (sum[0] / count) as u8,
            g: (sum[1] / count) as u8,
            b: (sum[2] / count) as u8,
        });
    }

    /// Rasterizes one triangle given the three positions produced by the
    /// shader's vertex stage (full transform applied, perspective division
    /// pending) and invokes the fragment stage for every covered sample that
    /// wins the depth test.
    pub fn draw_triangle(&mut self, pts: &[Vector4<f32>; 3], shader: &dyn Shader) {
        // One perspective division per vertex, up front.
        let mut screen = [Vector2::zeros(); 3];
        let mut depths = Vector3::zeros();
        for k in 0..3 {
            screen[k] = pts[k].xy() / pts[k].w;
            depths[k] = pts[k].z / pts[k].w;
        }

        // Bounding box of the projected triangle, clamped to the output bounds.
        // A triangle entirely outside produces an empty box and zero samples.
        let clamp = vector![(self.width - 1) as f32, (self.height - 1) as f32];
        let mut bbmin = vector![f32::MAX, f32::MAX];
        let mut bbmax = vector![-f32::MAX, -f32::MAX];
        for k in 0..3 {
            for j in 0..2 {
                bbmin[j] = bbmin[j].min(screen[k][j]).max(0.0);
                bbmax[j] = bbmax[j].max(screen[k][j]).min(clamp[j]);
            }
        }

        let factor = self.factor as i32;
        let cell = 1.0 / self.factor as f32;
        for x in (bbmin.x as i32)..=((bbmax.x + 0.5) as i32) {
            for y in (bbmin.y as i32)..=((bbmax.y + 0.5) as i32) {
                for i in 0..factor {
                    for j in 0..factor {
                        // Sub-sample cell center inside the pixel.
                        let sample = vector![
                            x as f32 + (i as f32 + 0.5) * cell,
                            y as f32 + (j as f32 + 0.5) * cell
                        ];
                        let bc_screen = barycentric(screen[0], screen[1], screen[2], sample);
                        if bc_screen.x < 0.0 || bc_screen.y < 0.0 || bc_screen.z < 0.0 {
                            // Sample is not in the triangle, skipping it.
                            continue;
                        }
                        // Depth is affine in screen space after the division,
                        // so screen weights interpolate it directly.
                        let depth = depths.dot(&bc_screen);
                        let index = self.sample_index((x * factor + i) as u32, (y * factor + j) as u32);
                        if depth <= self.sample_depths[index] {
                            continue;
                        }
                        // Attributes are not affine in screen space; the
                        // fragment stage gets weights corrected by each
                        // vertex's w and renormalized.
                        let mut bc_clip = vector![
                            bc_screen.x / pts[0].w,
                            bc_screen.y / pts[1].w,
                            bc_screen.z / pts[2].w
                        ];
                        bc_clip /= bc_clip.x + bc_clip.y + bc_clip.z;
                        let mut color = BLACK;
                        if shader.fragment(bc_clip, &mut color) {
                            // Discarded fragments leave both buffers untouched.
                            continue;
                        }
                        self.sample_colors[index] = color;
                        self.sample_depths[index] = depth;
                        self.recompute_pixel(x, y);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Fragment stage returning a fixed color for every covered sample.
    struct SolidShader {
        color: Color,
    }

    impl Shader for SolidShader {
        fn vertex(&mut self, _face: usize, _nthvert: usize) -> Vector4<f32> {
            unreachable!("tests feed positions straight to the rasterizer");
        }

        fn fragment(&self, _bar: Vector3<f32>, color: &mut Color) -> bool {
            *color = self.color;
            return false;
        }
    }

    /// Interpolates a varying that is equal at all three vertices and records
    /// the largest deviation from it seen by any fragment.
    struct ConstantVaryingShader {
        value: f32,
        max_deviation: Cell<f32>,
    }

    impl Shader for ConstantVaryingShader {
        fn vertex(&mut self, _face: usize, _nthvert: usize) -> Vector4<f32> {
            unreachable!("tests feed positions straight to the rasterizer");
        }

        fn fragment(&self, bar: Vector3<f32>, color: &mut Color) -> bool {
            let varying = Vector3::from_element(self.value);
            let deviation = (bar.dot(&varying) - self.value).abs();
            self.max_deviation.set(self.max_deviation.get().max(deviation));
            *color = WHITE;
            return false;
        }
    }

    /// Position with the full transform applied: screen (x, y), depth z,
    /// homogeneous w.
    fn screen_pt(x: f32, y: f32, z: f32, w: f32) -> Vector4<f32> {
        return vector![x * w, y * w, z * w, w];
    }

    #[test]
    fn barycentric_interior_weights_are_positive_and_sum_to_one() {
        let a = vector![0.0, 0.0];
        let b = vector![10.0, 0.0];
        let c = vector![0.0, 10.0];
        let bc = barycentric(a, b, c, vector![2.0, 3.0]);
        for k in 0..3 {
            assert!(bc[k] > 0.0 && bc[k] < 1.0, "weight {} out of (0, 1): {}", k, bc[k]);
        }
        assert!((bc.x + bc.y + bc.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn barycentric_matches_vertices() {
        let a = vector![0.0, 0.0];
        let b = vector![10.0, 0.0];
        let c = vector![0.0, 10.0];
        let bc = barycentric(a, b, c, a);
        assert!((bc.x - 1.0).abs() < 1e-4);
        assert!(bc.y.abs() < 1e-4);
        assert!(bc.z.abs() < 1e-4);
    }

    #[test]
    fn barycentric_degenerate_triangle_reports_outside() {
        // Collinear vertices span no area.
        let bc = barycentric(
            vector![0.0, 0.0],
            vector![5.0, 5.0],
            vector![10.0, 10.0],
            vector![3.0, 4.0],
        );
        assert!(bc.x < 0.0 || bc.y < 0.0 || bc.z < 0.0);
    }

    #[test]
    fn offscreen_triangle_writes_nothing() {
        let mut target = RenderTarget::new(100, 100, 1);
        let shader = SolidShader { color: WHITE };
        let pts = [
            screen_pt(-500.0, 20.0, 10.0, 1.0),
            screen_pt(-300.0, 80.0, 10.0, 1.0),
            screen_pt(-100.0, 20.0, 10.0, 1.0),
        ];
        target.draw_triangle(&pts, &shader);
        let pts_right = [
            screen_pt(500.0, 20.0, 10.0, 1.0),
            screen_pt(300.0, 80.0, 10.0, 1.0),
            screen_pt(700.0, 20.0, 10.0, 1.0),
        ];
        target.draw_triangle(&pts_right, &shader);
        assert!(target.as_render_data().iter().all(|&value| value == 0));
        assert!(target.sample_depths.iter().all(|&depth| depth == f32::MIN));
    }

    #[test]
    fn fills_reference_triangle_and_nothing_outside() {
        let mut target = RenderTarget::new(800, 800, 1);
        let shader = SolidShader { color: WHITE };
        let a = vector![100.0, 100.0];
        let b = vector![500.0, 300.0];
        let c = vector![300.0, 500.0];
        let pts = [
            screen_pt(a.x, a.y, 10.0, 1.0),
            screen_pt(b.x, b.y, 10.0, 1.0),
            screen_pt(c.x, c.y, 10.0, 1.0),
        ];
        target.draw_triangle(&pts, &shader);

        for x in 0..800u32 {
            for y in 0..800u32 {
                // The rasterizer samples pixel centers; classify the same
                // positions, leaving a small band around edges unchecked.
                let p = vector![x as f32 + 0.5, y as f32 + 0.5];
                let bc = barycentric(a, b, c, p);
                let inside = bc.x > 0.01 && bc.y > 0.01 && bc.z > 0.01;
                let outside = bc.x < -0.01 || bc.y < -0.01 || bc.z < -0.01;
                if inside {
                    assert_eq!(target.pixel(x, y), WHITE, "hole at ({}, {})", x, y);
                } else if outside {
                    assert_eq!(target.pixel(x, y), BLACK, "stray write at ({}, {})", x, y);
                }
            }
        }
    }

    #[test]
    fn depth_test_is_independent_of_submission_order() {
        let red = SolidShader { color: Color { r: 255, g: 0, b: 0 } };
        let blue = SolidShader { color: Color { r: 0, g: 0, b: 255 } };
        let far = [
            screen_pt(10.0, 10.0, 100.0, 1.0),
            screen_pt(180.0, 10.0, 100.0, 1.0),
            screen_pt(10.0, 180.0, 100.0, 1.0),
        ];
        let near = [
            screen_pt(10.0, 10.0, 200.0, 1.0),
            screen_pt(180.0, 10.0, 200.0, 1.0),
            screen_pt(10.0, 180.0, 200.0, 1.0),
        ];

        let mut target = RenderTarget::new(200, 200, 1);
        target.draw_triangle(&far, &red);
        target.draw_triangle(&near, &blue);
        assert_eq!(target.pixel(40, 40), Color { r: 0, g: 0, b: 255 });

        let mut target = RenderTarget::new(200, 200, 1);
        target.draw_triangle(&near, &blue);
        target.draw_triangle(&far, &red);
        assert_eq!(target.pixel(40, 40), Color { r: 0, g: 0, b: 255 });
    }

    #[test]
    fn equal_depth_keeps_first_submitted_fragment() {
        let red = SolidShader { color: Color { r: 255, g: 0, b: 0 } };
        let blue = SolidShader { color: Color { r: 0, g: 0, b: 255 } };
        let pts = [
            screen_pt(10.0, 10.0, 100.0, 1.0),
            screen_pt(180.0, 10.0, 100.0, 1.0),
            screen_pt(10.0, 180.0, 100.0, 1.0),
        ];
        let mut target = RenderTarget::new(200, 200, 1);
        target.draw_triangle(&pts, &red);
        target.draw_triangle(&pts, &blue);
        assert_eq!(target.pixel(40, 40), Color { r: 255, g: 0, b: 0 });
    }

    #[test]
    fn full_supersample_coverage_averages_to_the_exact_color() {
        let color = Color { r: 10, g: 200, b: 30 };
        let shader = SolidShader { color };
        let pts = [
            screen_pt(-20.0, -20.0, 10.0, 1.0),
            screen_pt(60.0, -20.0, 10.0, 1.0),
            screen_pt(-20.0, 60.0, 10.0, 1.0),
        ];
        let mut target = RenderTarget::new(16, 16, 2);
        target.draw_triangle(&pts, &shader);
        // Every sub-sample of (8, 8) is covered, so the box filter of four
        // identical colors reproduces the color exactly.
        assert_eq!(target.pixel(8, 8), color);
    }

    #[test]
    fn rerendering_the_same_pass_is_deterministic() {
        let red = SolidShader { color: Color { r: 255, g: 0, b: 0 } };
        let blue = SolidShader { color: Color { r: 0, g: 0, b: 255 } };
        let first = [
            screen_pt(10.0, 10.0, 100.0, 1.0),
            screen_pt(180.0, 10.0, 120.0, 1.0),
            screen_pt(10.0, 180.0, 140.0, 1.0),
        ];
        let second = [
            screen_pt(60.0, 20.0, 150.0, 1.0),
            screen_pt(190.0, 120.0, 90.0, 1.0),
            screen_pt(20.0, 170.0, 110.0, 1.0),
        ];

        let render = || {
            let mut target = RenderTarget::new(200, 200, 2);
            target.draw_triangle(&first, &red);
            target.draw_triangle(&second, &blue);
            return target.as_render_data().to_vec();
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn depth_data_marks_covered_pixels() {
        let mut target = RenderTarget::new(100, 100, 1);
        let shader = SolidShader { color: WHITE };
        let pts = [
            screen_pt(10.0, 10.0, 50.0, 1.0),
            screen_pt(90.0, 10.0, 50.0, 1.0),
            screen_pt(10.0, 90.0, 50.0, 1.0),
        ];
        target.draw_triangle(&pts, &shader);
        let depth_data = target.as_depth_data();
        // Uniform depth normalizes to full intensity inside, zero outside.
        let covered = (3 * (30 + (100 - 1 - 30) * 100)) as usize;
        let empty = (3 * (95 + (100 - 1 - 95) * 100)) as usize;
        assert_eq!(depth_data[covered], 255);
        assert_eq!(depth_data[empty], 0);
    }

    #[test]
    fn constant_varying_interpolates_to_the_constant_under_perspective() {
        let shader = ConstantVaryingShader {
            value: 0.5,
            max_deviation: Cell::new(0.0),
        };
        // Unequal w per vertex exercises the perspective correction.
        let pts = [
            screen_pt(100.0, 100.0, 50.0, 1.0),
            screen_pt(300.0, 100.0, 50.0, 2.0),
            screen_pt(200.0, 300.0, 50.0, 4.0),
        ];
        let mut target = RenderTarget::new(400, 400, 1);
        target.draw_triangle(&pts, &shader);
        assert!(target.pixel(200, 150) == WHITE, "triangle did not cover the probe pixel");
        assert!(shader.max_deviation.get() < 1e-4, "deviation {}", shader.max_deviation.get());
    }
}

