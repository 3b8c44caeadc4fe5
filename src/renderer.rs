//! OpenGL drawing of the cube scene into swapchain images, the quad layer
//! image and the desktop mirror.

use anyhow::{bail, format_err, Result};
use glow::HasContext;
use log::{debug, error, info, warn};
use nalgebra::Matrix4;

use crate::scene::CubeDraw;

pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.2, 1.0];

/// (0, 0, 0) as uniform color selects the UV color
const VERTEX_SHADER_SOURCE: &str = r#"#version 330 core
layout(location = 0) in vec3 aPos;
layout(location = 1) in vec2 aUV;
uniform mat4 model;
uniform mat4 view;
uniform mat4 proj;
out vec2 vertexUV;
void main() {
    gl_Position = proj * view * model * vec4(aPos, 1.0);
    vertexUV = aUV;
}
"#;

const FRAGMENT_SHADER_SOURCE: &str = r#"#version 330 core
out vec4 FragColor;
uniform vec3 uniformColor;
in vec2 vertexUV;
void main() {
    FragColor = (uniformColor.x < 0.01 && uniformColor.y < 0.01 && uniformColor.z < 0.01)
        ? vec4(vertexUV, 1.0, 1.0)
        : vec4(uniformColor, 1.0);
}
"#;

/// Position (3) + UV (2)
const FLOATS_PER_VERTEX: usize = 5;
pub const CUBE_VERTEX_COUNT: usize = 36;

/// Width of the diagonals in the quad image, in pixels
const QUAD_LINE_WIDTH: i64 = 3;

/// What the renderer needs to know about one view up front
#[derive(Debug, Clone, Copy)]
pub struct ViewSetup {
    pub image_count: usize,
    pub width: u32,
    pub height: u32,
    /// Depth comes from a depth swapchain. Otherwise the renderer allocates
    /// its own depth buffer for the view.
    pub depth_swapchain: bool,
}

/// The images to draw one view into
#[derive(Debug, Clone, Copy)]
pub struct ViewTarget {
    pub image_index: usize,
    pub color_texture: u32,
    pub depth_texture: Option<u32>,
    pub width: u32,
    pub height: u32,
}

struct ViewResources {
    framebuffers: Vec<glow::Framebuffer>,
    depth_renderbuffer: Option<glow::Renderbuffer>,
    width: u32,
    height: u32,
}

struct QuadImage {
    texture: glow::Texture,
    source_fbo: glow::Framebuffer,
    target_fbo: glow::Framebuffer,
    width: u32,
    height: u32,
}

pub struct Renderer {
    gl: glow::Context,
    program: glow::Program,
    vertex_array: glow::VertexArray,
    vertex_buffer: glow::Buffer,
    views: Vec<ViewResources>,
    quad: Option<QuadImage>,
}

impl Renderer {
    /// Compiles the shaders and uploads the cube. The GL context must be
    /// current on this thread.
    pub fn new(mut gl: glow::Context, views: &[ViewSetup]) -> Result<Self> {
        unsafe {
            install_debug_callback(&mut gl);

            let program = compile_glsl_program(
                &gl,
                &[
                    (glow::VERTEX_SHADER, VERTEX_SHADER_SOURCE),
                    (glow::FRAGMENT_SHADER, FRAGMENT_SHADER_SOURCE),
                ],
            )?;

            let vertex_array = gl
                .create_vertex_array()
                .map_err(|s| format_err!("Failed to create vertex array; {}", s))?;
            let vertex_buffer = gl
                .create_buffer()
                .map_err(|s| format_err!("Failed to create vertex buffer; {}", s))?;

            gl.bind_vertex_array(Some(vertex_array));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));
            let bytes: Vec<u8> = cube_vertices()
                .iter()
                .flat_map(|f| f.to_ne_bytes())
                .collect();
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW);

            let stride = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as i32;
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(
                1,
                2,
                glow::FLOAT,
                false,
                stride,
                (3 * std::mem::size_of::<f32>()) as i32,
            );
            gl.enable_vertex_attrib_array(1);
            gl.bind_vertex_array(None);

            let mut renderer = Self {
                gl,
                program,
                vertex_array,
                vertex_buffer,
                views: Vec::with_capacity(views.len()),
                quad: None,
            };
            for setup in views {
                let resources = renderer.create_view_resources(setup)?;
                renderer.views.push(resources);
            }
            info!("Renderer ready for {} views", renderer.views.len());

            Ok(renderer)
        }
    }

    unsafe fn create_view_resources(&self, setup: &ViewSetup) -> Result<ViewResources> {
        let gl = &self.gl;

        // One framebuffer per swapchain image
        let framebuffers = (0..setup.image_count)
            .map(|_| {
                gl.create_framebuffer()
                    .map_err(|s| format_err!("Failed to create framebuffer; {}", s))
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_renderbuffer = if setup.depth_swapchain {
            None
        } else {
            let renderbuffer = gl
                .create_renderbuffer()
                .map_err(|s| format_err!("Failed to create depth renderbuffer; {}", s))?;
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH_COMPONENT24,
                setup.width as i32,
                setup.height as i32,
            );
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            Some(renderbuffer)
        };

        Ok(ViewResources {
            framebuffers,
            depth_renderbuffer,
            width: setup.width,
            height: setup.height,
        })
    }

    /// Draws `scene` into the swapchain image(s) of one view
    pub fn render_view(
        &self,
        view_index: usize,
        target: &ViewTarget,
        projection: &Matrix4<f32>,
        view: &Matrix4<f32>,
        scene: &[CubeDraw],
    ) -> Result<()> {
        let resources = self
            .views
            .get(view_index)
            .ok_or_else(|| format_err!("No render resources for view {}", view_index))?;
        let framebuffer = *resources
            .framebuffers
            .get(target.image_index)
            .ok_or_else(|| format_err!("No framebuffer for image {}", target.image_index))?;

        unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));

            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture_from_name(target.color_texture),
                0,
            );
            match (target.depth_texture, resources.depth_renderbuffer) {
                (Some(depth), _) => gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::DEPTH_ATTACHMENT,
                    glow::TEXTURE_2D,
                    texture_from_name(depth),
                    0,
                ),
                (None, renderbuffer) => gl.framebuffer_renderbuffer(
                    glow::FRAMEBUFFER,
                    glow::DEPTH_ATTACHMENT,
                    glow::RENDERBUFFER,
                    renderbuffer,
                ),
            }

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                bail!("Framebuffer for view {} incomplete: {:#x}", view_index, status);
            }

            self.draw_scene(target.width, target.height, projection, view, scene);

            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }

        Ok(())
    }

    /// Draws `scene` into the window's default framebuffer
    pub fn render_window(
        &self,
        width: u32,
        height: u32,
        projection: &Matrix4<f32>,
        view: &Matrix4<f32>,
        scene: &[CubeDraw],
    ) {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.draw_scene(width, height, projection, view, scene);
        }
    }

    unsafe fn draw_scene(
        &self,
        width: u32,
        height: u32,
        projection: &Matrix4<f32>,
        view: &Matrix4<f32>,
        scene: &[CubeDraw],
    ) {
        let gl = &self.gl;

        gl.viewport(0, 0, width as i32, height as i32);
        gl.scissor(0, 0, width as i32, height as i32);
        gl.enable(glow::DEPTH_TEST);

        let [r, g, b, a] = CLEAR_COLOR;
        gl.clear_color(r, g, b, a);
        gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);

        gl.use_program(Some(self.program));
        gl.bind_vertex_array(Some(self.vertex_array));

        let model_loc = gl.get_uniform_location(self.program, "model");
        let color_loc = gl.get_uniform_location(self.program, "uniformColor");
        let view_loc = gl.get_uniform_location(self.program, "view");
        let proj_loc = gl.get_uniform_location(self.program, "proj");
        gl.uniform_matrix_4_f32_slice(view_loc.as_ref(), false, view.as_slice());
        gl.uniform_matrix_4_f32_slice(proj_loc.as_ref(), false, projection.as_slice());

        for cube in scene {
            let [r, g, b] = cube.color.unwrap_or([0.0; 3]);
            gl.uniform_3_f32(color_loc.as_ref(), r, g, b);
            gl.uniform_matrix_4_f32_slice(model_loc.as_ref(), false, cube.model.as_slice());
            gl.draw_arrays(glow::TRIANGLES, 0, CUBE_VERTEX_COUNT as i32);
        }

        gl.bind_vertex_array(None);
        gl.use_program(None);
    }

    /// Copies the last image rendered for `view_index` to the window at half size
    pub fn mirror(&self, view_index: usize, image_index: usize) {
        let Some(resources) = self.views.get(view_index) else {
            return;
        };
        let Some(&framebuffer) = resources.framebuffers.get(image_index) else {
            return;
        };

        let w = resources.width as i32;
        let h = resources.height as i32;
        unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(framebuffer));
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            gl.blit_framebuffer(
                0,
                0,
                w,
                h,
                0,
                0,
                w / 2,
                h / 2,
                glow::COLOR_BUFFER_BIT,
                glow::LINEAR,
            );
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    /// Uploads the generated quad layer image
    pub fn init_quad(&mut self, width: u32, height: u32) -> Result<()> {
        let pixels = quad_pixels(width, height);
        unsafe {
            let gl = &self.gl;
            let texture = gl
                .create_texture()
                .map_err(|s| format_err!("Failed to create quad texture; {}", s))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(&pixels),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            let source_fbo = gl
                .create_framebuffer()
                .map_err(|s| format_err!("Failed to create framebuffer; {}", s))?;
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(source_fbo));
            gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);

            let target_fbo = gl
                .create_framebuffer()
                .map_err(|s| format_err!("Failed to create framebuffer; {}", s))?;

            self.quad = Some(QuadImage {
                texture,
                source_fbo,
                target_fbo,
                width,
                height,
            });
        }
        debug!("Created {}x{} quad texture", width, height);
        Ok(())
    }

    /// Copies the quad image into an acquired quad swapchain image
    pub fn render_quad(&self, swapchain_texture: u32) -> Result<()> {
        let quad = self
            .quad
            .as_ref()
            .ok_or_else(|| format_err!("Quad image was never initialized"))?;
        let w = quad.width as i32;
        let h = quad.height as i32;

        unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(quad.source_fbo));
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(quad.target_fbo));
            gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture_from_name(swapchain_texture),
                0,
            );
            gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, glow::COLOR_BUFFER_BIT, glow::NEAREST);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            let gl = &self.gl;
            if let Some(quad) = self.quad.take() {
                gl.delete_framebuffer(quad.source_fbo);
                gl.delete_framebuffer(quad.target_fbo);
                gl.delete_texture(quad.texture);
            }
            for view in self.views.drain(..) {
                for framebuffer in view.framebuffers {
                    gl.delete_framebuffer(framebuffer);
                }
                if let Some(renderbuffer) = view.depth_renderbuffer {
                    gl.delete_renderbuffer(renderbuffer);
                }
            }
            gl.delete_buffer(self.vertex_buffer);
            gl.delete_vertex_array(self.vertex_array);
            gl.delete_program(self.program);
        }
    }
}

/// Swapchain images are plain GL texture names
fn texture_from_name(name: u32) -> Option<glow::Texture> {
    (name != 0).then(|| unsafe { glow::Context::create_texture_from_gl_name(name) })
}

unsafe fn install_debug_callback(gl: &mut glow::Context) {
    if !gl.supports_debug() {
        debug!("GL debug output not supported");
        return;
    }
    gl.enable(glow::DEBUG_OUTPUT);
    gl.debug_message_callback(|_source, gltype, id, severity, message| match severity {
        glow::DEBUG_SEVERITY_NOTIFICATION => {}
        glow::DEBUG_SEVERITY_HIGH => error!("GL {:#x} ({}): {}", gltype, id, message),
        _ => warn!("GL {:#x} ({}): {}", gltype, id, message),
    });
}

/// Compiles (*_SHADER, <source>) into a shader program for OpenGL
fn compile_glsl_program(gl: &glow::Context, sources: &[(u32, &str)]) -> Result<glow::Program> {
    unsafe {
        let program = gl
            .create_program()
            .map_err(|s| format_err!("Cannot create program; {}", s))?;

        let mut shaders = vec![];

        for (stage, shader_source) in sources {
            let shader = gl
                .create_shader(*stage)
                .map_err(|s| format_err!("Cannot create shader; {}", s))?;

            gl.shader_source(shader, shader_source);

            gl.compile_shader(shader);

            if !gl.get_shader_compile_status(shader) {
                bail!(
                    "Failed to compile shader;\n{}",
                    gl.get_shader_info_log(shader)
                );
            }

            gl.attach_shader(program, shader);

            shaders.push(shader);
        }

        gl.link_program(program);

        if !gl.get_program_link_status(program) {
            bail!("{}", gl.get_program_info_log(program));
        }

        for shader in shaders {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }

        Ok(program)
    }
}

/// Unit cube centered on the origin as 12 triangles, position + UV per vertex
pub fn cube_vertices() -> Vec<f32> {
    // Each face: a fixed axis and sign, then the two in-plane axes
    const FACES: [(usize, f32); 6] = [
        (2, -1.0),
        (2, 1.0),
        (0, -1.0),
        (0, 1.0),
        (1, -1.0),
        (1, 1.0),
    ];
    // Two triangles over the unit square
    const CORNERS: [(f32, f32); 6] = [
        (0.0, 0.0),
        (1.0, 0.0),
        (1.0, 1.0),
        (1.0, 1.0),
        (0.0, 1.0),
        (0.0, 0.0),
    ];

    let mut vertices = Vec::with_capacity(CUBE_VERTEX_COUNT * FLOATS_PER_VERTEX);
    for (axis, sign) in FACES {
        let u_axis = (axis + 1) % 3;
        let v_axis = (axis + 2) % 3;
        for (u, v) in CORNERS {
            let mut position = [0.0f32; 3];
            position[axis] = 0.5 * sign;
            position[u_axis] = u - 0.5;
            position[v_axis] = v - 0.5;
            vertices.extend_from_slice(&position);
            vertices.extend_from_slice(&[u, v]);
        }
    }
    vertices
}

/// RGBA8 image for the quad layer: red increasing by row, a white main
/// diagonal and a black anti-diagonal
pub fn quad_pixels(width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as i64, height as i64);
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..h {
        for col in 0..w {
            let pixel = if ((w - col) - row).abs() < QUAD_LINE_WIDTH {
                [0, 0, 0, 255]
            } else if (row - col).abs() < QUAD_LINE_WIDTH {
                [255, 255, 255, 255]
            } else {
                [(row as f32 / h as f32 * 255.0) as u8, 0, 0, 255]
            };
            pixels.extend_from_slice(&pixel);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixels: &[u8], width: u32, row: u32, col: u32) -> [u8; 4] {
        let i = ((row * width + col) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn cube_has_36_vertices_on_the_unit_cube() {
        let vertices = cube_vertices();
        assert_eq!(vertices.len(), CUBE_VERTEX_COUNT * FLOATS_PER_VERTEX);
        for vertex in vertices.chunks(FLOATS_PER_VERTEX) {
            for &coord in &vertex[..3] {
                assert!(coord == 0.5 || coord == -0.5, "{:?}", vertex);
            }
            for &uv in &vertex[3..] {
                assert!((0.0..=1.0).contains(&uv));
            }
        }
    }

    #[test]
    fn cube_covers_every_face() {
        let vertices = cube_vertices();
        for axis in 0..3 {
            for side in [-0.5, 0.5] {
                let on_face = vertices
                    .chunks(FLOATS_PER_VERTEX)
                    .filter(|v| v[axis] == side)
                    .count();
                // 6 of the face's own vertices plus edge vertices of the 4 neighbours
                assert!(on_face >= 6, "axis {} side {}", axis, side);
            }
        }
    }

    #[test]
    fn quad_image_size() {
        assert_eq!(quad_pixels(320, 240).len(), 320 * 240 * 4);
    }

    #[test]
    fn quad_rows_get_redder() {
        let pixels = quad_pixels(320, 240);
        assert_eq!(pixel(&pixels, 320, 0, 100), [0, 0, 0, 255]);
        assert_eq!(pixel(&pixels, 320, 120, 10), [127, 0, 0, 255]);
        assert_eq!(pixel(&pixels, 320, 239, 10), [253, 0, 0, 255]);
    }

    #[test]
    fn quad_diagonals() {
        let pixels = quad_pixels(320, 240);
        assert_eq!(pixel(&pixels, 320, 50, 50), [255, 255, 255, 255]);
        assert_eq!(pixel(&pixels, 320, 50, 52), [255, 255, 255, 255]);
        assert_eq!(pixel(&pixels, 320, 50, 53)[1], 0);
        // anti-diagonal runs from the top right corner
        assert_eq!(pixel(&pixels, 320, 20, 300), [0, 0, 0, 255]);
        assert_eq!(pixel(&pixels, 320, 20, 290), [(20.0f32 / 240.0 * 255.0) as u8, 0, 0, 255]);
    }

    #[test]
    fn texture_name_zero_is_no_texture() {
        assert!(texture_from_name(0).is_none());
        assert!(texture_from_name(7).is_some());
    }
}
