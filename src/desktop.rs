//! Desktop preview: the same scene in a window, without an XR runtime.

use std::time::Instant;

use anyhow::{format_err, Context, Result};
use glutin::event::{Event, WindowEvent};
use glutin::event_loop::{ControlFlow, EventLoop};
use glutin::{Api, GlProfile, GlRequest};
use log::{error, info};

use crate::capabilities::DESIRED_OPENGL_VERSION;
use crate::desktop_camera::Camera;
use crate::renderer::Renderer;
use crate::scene;
use crate::tracking::FrameTracking;

pub fn run() -> Result<()> {
    let event_loop = EventLoop::new();
    let window_builder = glutin::window::WindowBuilder::new()
        .with_title("OpenXR Playground (desktop)")
        .with_inner_size(glutin::dpi::LogicalSize::new(1024.0, 768.0));

    let glutin_ctx = glutin::ContextBuilder::new()
        .with_gl(GlRequest::Specific(
            Api::OpenGl,
            (
                DESIRED_OPENGL_VERSION.major() as u8,
                DESIRED_OPENGL_VERSION.minor() as u8,
            ),
        ))
        .with_gl_profile(GlProfile::Core)
        .with_depth_buffer(24)
        .with_vsync(true)
        .build_windowed(window_builder, &event_loop)
        .context("Failed to create window")?;
    let glutin_ctx = unsafe { glutin_ctx.make_current() }
        .map_err(|(_, e)| format_err!("Failed to make GL context current; {}", e))?;

    let gl = unsafe {
        glow::Context::from_loader_function(|s| glutin_ctx.get_proc_address(s) as *const _)
    };
    let renderer = Renderer::new(gl, &[])?;
    info!("Desktop preview running, drag to orbit, right-drag to pan, scroll to zoom");

    let mut camera = Camera::default();
    let start = Instant::now();
    // Owned by the event loop from here on, dropped before the context
    let mut renderer = Some(renderer);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            Event::MainEventsCleared => {
                glutin_ctx.window().request_redraw();
            }
            Event::RedrawRequested(_) => {
                let Some(renderer) = &renderer else {
                    return;
                };
                let size = glutin_ctx.window().inner_size();
                let elapsed = start.elapsed().as_nanos() as i64;
                let scene = scene::build_scene(&FrameTracking::default(), elapsed);

                renderer.render_window(
                    size.width,
                    size.height,
                    &camera.projection(size.width as f32, size.height as f32),
                    &camera.view(),
                    &scene,
                );
                if let Err(e) = glutin_ctx.swap_buffers() {
                    error!("Failed to swap buffers: {}", e);
                    *control_flow = ControlFlow::Exit;
                }
            }
            Event::WindowEvent { ref event, .. } => {
                if camera.handle_events(event) {
                    return;
                }
                match event {
                    WindowEvent::Resized(physical_size) => {
                        glutin_ctx.resize(*physical_size);
                    }
                    WindowEvent::CloseRequested => {
                        renderer.take();
                        *control_flow = ControlFlow::Exit
                    }
                    _ => (),
                }
            }
            _ => (),
        }
    })
}
