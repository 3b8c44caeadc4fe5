//! The XR application: setup of instance, session and resources, then the
//! event and frame loop.

use std::time::Duration;

use anyhow::{bail, format_err, Context, Result};
use glutin::dpi::PhysicalSize;
use glutin::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use glutin::event_loop::{ControlFlow, EventLoop};
use glutin::platform::run_return::EventLoopExtRunReturn;
use glutin::window::Window;
use glutin::{Api, ContextWrapper, GlProfile, GlRequest, PossiblyCurrent};
use log::{debug, error, info, warn};

use crate::capabilities::{self, Capabilities};
use crate::config::Options;
use crate::input::{HandTracking, Input, PollSettings};
use crate::lifecycle::{SessionCommand, SessionLifecycle};
use crate::math;
use crate::renderer::{Renderer, ViewSetup, ViewTarget};
use crate::scene;
use crate::swapchain::Swapchain;

const NEAR_Z: f32 = 0.05;
const FAR_Z: f32 = 100.0;

const QUAD_PIXEL_WIDTH: u32 = 320;
const QUAD_PIXEL_HEIGHT: u32 = 240;
/// Meters
const QUAD_WIDTH: f32 = 1.0;
const QUAD_POSITION: xr::Vector3f = xr::Vector3f {
    x: 1.5,
    y: 0.7,
    z: -1.5,
};

/// Poll interval while the session isn't running
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Everything the frame loop uses. Field order is drop order: GL resources
/// go before the context, session resources before the instance.
struct Playground {
    renderer: Renderer,
    color_swapchains: Vec<Swapchain>,
    depth_swapchains: Option<Vec<Swapchain>>,
    quad_swapchain: Swapchain,
    hand_tracking: Option<HandTracking>,
    input: Input,
    play_space: xr::Space,
    frame_stream: xr::FrameStream<xr::OpenGL>,
    frame_waiter: xr::FrameWaiter,
    session: xr::Session<xr::OpenGL>,
    ctx: ContextWrapper<PossiblyCurrent, ()>,
    _window: Window,
    instance: xr::Instance,

    view_type: xr::ViewConfigurationType,
    blend_mode: xr::EnvironmentBlendMode,
    views: Vec<xr::ViewConfigurationView>,
    poll_settings: PollSettings,
    lifecycle: SessionLifecycle,
    exit_requested: bool,
}

pub fn run(options: &Options) -> Result<()> {
    let mut event_loop = EventLoop::new();
    let mut playground = Playground::new(options, &event_loop)?;

    let mut event_storage = xr::EventDataBuffer::new();
    loop {
        let mut window_exit = false;
        event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Poll;
            match event {
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    ..
                }
                | Event::WindowEvent {
                    event:
                        WindowEvent::KeyboardInput {
                            input:
                                KeyboardInput {
                                    virtual_keycode: Some(VirtualKeyCode::Escape),
                                    state: ElementState::Pressed,
                                    ..
                                },
                            ..
                        },
                    ..
                } => window_exit = true,
                Event::MainEventsCleared => *control_flow = ControlFlow::Exit,
                _ => (),
            }
        });
        if window_exit && !playground.request_exit()? {
            break;
        }

        if let Err(e) = playground.handle_events(&mut event_storage) {
            error!("Failed to poll events: {:#}", e);
            break;
        }
        if playground.lifecycle.should_quit() {
            break;
        }

        if !playground.lifecycle.should_render() {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        playground.frame()?;
    }

    info!("Cleaning up");
    Ok(())
}

impl Playground {
    fn new(options: &Options, event_loop: &EventLoop<()>) -> Result<Self> {
        // Load OpenXR from platform-specific location
        #[cfg(target_os = "linux")]
        let entry = unsafe { xr::Entry::load() }.context("Failed to load OpenXR loader")?;

        #[cfg(target_os = "windows")]
        let entry = xr::Entry::linked();

        let available = entry
            .enumerate_extensions()
            .context("Failed to enumerate extensions")?;
        info!("Runtime supports extensions:");
        capabilities::log_available_extensions(&available);
        let capabilities = Capabilities::from_available(&available)?;

        let app_info = xr::ApplicationInfo {
            application_name: "OpenXR Playground",
            application_version: 1,
            engine_name: "Playground Engine",
            engine_version: 0,
        };
        let instance = entry
            .create_instance(&app_info, &capabilities.enabled_extensions(), &[])
            .context("Failed to create XR instance")?;

        let instance_props = instance.properties()?;
        info!(
            "Runtime Name: {}, Runtime Version: {}",
            instance_props.runtime_name, instance_props.runtime_version
        );

        let system = instance
            .system(options.form_factor)
            .with_context(|| format!("No system for form factor {:?}", options.form_factor))?;
        log_system_properties(&instance, system)?;

        // Only ask the system once the extension is known to be enabled
        let hand_tracking_supported = capabilities.hand_tracking
            && capabilities.system_hand_tracking(instance.supports_hand_tracking(system)?);
        info!("Hand tracking supported: {}", hand_tracking_supported);

        log_view_configurations(&instance, system, options.view_type)?;

        let views = instance
            .enumerate_view_configuration_views(system, options.view_type)
            .context("Failed to enumerate view configuration views")?;
        info!("View count: {}", views.len());
        for (i, view) in views.iter().enumerate() {
            info!(
                "View {}: Recommended Width={} Height={} SampleCount={}",
                i,
                view.recommended_image_rect_width,
                view.recommended_image_rect_height,
                view.recommended_swapchain_sample_count
            );
            info!(
                "View {}: Maximum Width={} Height={} SampleCount={}",
                i,
                view.max_image_rect_width,
                view.max_image_rect_height,
                view.max_swapchain_sample_count
            );
        }
        let first_view = *views
            .first()
            .ok_or_else(|| format_err!("View configuration has no views"))?;

        // Take the runtime's most preferred blend mode
        let blend_mode = *instance
            .enumerate_environment_blend_modes(system, options.view_type)?
            .first()
            .ok_or_else(|| format_err!("No environment blend modes"))?;
        info!("Environment blend mode: {:?}", blend_mode);

        let opengl_requirements = instance.graphics_requirements::<xr::OpenGL>(system)?;
        capabilities::check_opengl_version(&opengl_requirements);

        // The desktop window mirrors the left eye at half size
        let window_builder = glutin::window::WindowBuilder::new()
            .with_title("OpenXR Playground")
            .with_inner_size(PhysicalSize::new(
                first_view.recommended_image_rect_width / 2,
                first_view.recommended_image_rect_height / 2,
            ));
        let (major, minor) = (
            capabilities::DESIRED_OPENGL_VERSION.major() as u8,
            capabilities::DESIRED_OPENGL_VERSION.minor() as u8,
        );
        let windowed_context = glutin::ContextBuilder::new()
            .with_gl(GlRequest::Specific(Api::OpenGl, (major, minor)))
            .with_gl_profile(GlProfile::Core)
            .with_vsync(false)
            .build_windowed(window_builder, event_loop)
            .context("Failed to create window")?;

        let (ctx, window) = unsafe { windowed_context.split() };
        let ctx = unsafe { ctx.make_current() }
            .map_err(|(_, e)| format_err!("Failed to make GL context current; {}", e))?;

        let gl = unsafe {
            glow::Context::from_loader_function(|s| ctx.get_proc_address(s) as *const _)
        };

        let session_create_info = crate::session_create_info(&ctx, &window)?;
        let (session, frame_waiter, frame_stream) = unsafe {
            instance.create_session::<xr::OpenGL>(system, &session_create_info)
        }
        .context("Failed to create session")?;
        info!("Successfully created a session with OpenGL!");

        let reference_spaces = session.enumerate_reference_spaces()?;
        info!("Runtime supports {} reference spaces:", reference_spaces.len());
        for space in &reference_spaces {
            info!("\t{:?}", space);
        }
        let play_space = session
            .create_reference_space(options.play_space_type, xr::Posef::IDENTITY)
            .with_context(|| format!("Failed to create {:?} play space", options.play_space_type))?;

        let formats = session.enumerate_swapchain_formats()?;
        info!("Runtime supports {} swapchain formats", formats.len());
        for format in &formats {
            debug!("\t{:#x}", format);
        }
        let color_format = capabilities::choose_swapchain_format(&formats, glow::SRGB8_ALPHA8, true)
            .ok_or_else(|| format_err!("Runtime offers no swapchain formats"))?;
        let depth_format = capabilities::choose_swapchain_format(&formats, glow::DEPTH_COMPONENT16, false);
        let quad_format = capabilities::choose_swapchain_format(&formats, glow::RGBA8, true)
            .ok_or_else(|| format_err!("Runtime offers no swapchain formats"))?;

        let color_usage = xr::SwapchainUsageFlags::SAMPLED | xr::SwapchainUsageFlags::COLOR_ATTACHMENT;
        let color_swapchains = Swapchain::for_views(&session, &views, color_format, color_usage)?;
        let depth_swapchains = match depth_format {
            Some(format) => Some(Swapchain::for_views(
                &session,
                &views,
                format,
                xr::SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            )?),
            None => {
                warn!("Preferred depth format GL_DEPTH_COMPONENT16 not supported, rendering with a private depth buffer");
                None
            }
        };
        let quad_swapchain = Swapchain::new(
            &session,
            quad_format,
            1,
            QUAD_PIXEL_WIDTH,
            QUAD_PIXEL_HEIGHT,
            color_usage,
        )?;

        let input = Input::new(&instance, &session, capabilities.vive_tracker)?;

        let hand_tracking = if hand_tracking_supported {
            match HandTracking::new(&session) {
                Ok(tracking) => Some(tracking),
                Err(e) => {
                    warn!("Hand tracking unavailable: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(rate) = options.refresh_rate {
            if capabilities.display_refresh_rate {
                request_refresh_rate(&session, rate)?;
            } else {
                warn!("Refresh rate {} requested, but runtime can't change it", rate);
            }
        }

        let view_setups: Vec<ViewSetup> = color_swapchains
            .iter()
            .map(|swapchain| ViewSetup {
                image_count: swapchain.image_count(),
                width: swapchain.width(),
                height: swapchain.height(),
                depth_swapchain: depth_swapchains.is_some(),
            })
            .collect();
        let mut renderer = Renderer::new(gl, &view_setups)?;
        renderer.init_quad(QUAD_PIXEL_WIDTH, QUAD_PIXEL_HEIGHT)?;

        input.attach(&session)?;

        Ok(Self {
            renderer,
            color_swapchains,
            depth_swapchains,
            quad_swapchain,
            hand_tracking,
            input,
            play_space,
            frame_stream,
            frame_waiter,
            session,
            ctx,
            _window: window,
            instance,
            view_type: options.view_type,
            blend_mode,
            views,
            poll_settings: PollSettings {
                hand_velocities: options.query_hand_velocities,
                joint_velocities: options.query_joint_velocities,
            },
            lifecycle: SessionLifecycle::new(),
            exit_requested: false,
        })
    }

    /// Asks the runtime to wind the session down. Returns false when there
    /// is no running session to wait for, so the caller can quit directly.
    fn request_exit(&mut self) -> Result<bool> {
        if !self.lifecycle.is_running() {
            return Ok(false);
        }
        if !self.exit_requested {
            info!("Requesting exit");
            self.session
                .request_exit()
                .context("Failed to request session exit")?;
            self.exit_requested = true;
        }
        Ok(true)
    }

    fn handle_events(&mut self, storage: &mut xr::EventDataBuffer) -> Result<()> {
        while let Some(event) = self.instance.poll_event(storage)? {
            use xr::Event::*;
            match event {
                EventsLost(e) => {
                    warn!("EVENT: {} events data lost!", e.lost_event_count());
                }
                InstanceLossPending(_) => {
                    warn!("EVENT: instance loss pending!");
                    self.lifecycle.on_instance_loss_pending();
                }
                SessionStateChanged(e) => match self.lifecycle.on_state_changed(e.state()) {
                    SessionCommand::Begin => {
                        self.session
                            .begin(self.view_type)
                            .context("Failed to begin session")?;
                        info!("Session started!");
                    }
                    SessionCommand::End => {
                        self.session.end().context("Failed to end session")?;
                        info!("Session ended");
                    }
                    SessionCommand::Exit | SessionCommand::Nothing => {}
                },
                ReferenceSpaceChangePending(e) => {
                    info!(
                        "EVENT: reference space change pending for {:?}",
                        e.reference_space_type()
                    );
                }
                InteractionProfileChanged(_) => {
                    info!("EVENT: interaction profile changed!");
                    self.input
                        .log_interaction_profiles(&self.instance, &self.session);
                }
                VisibilityMaskChangedKHR(_) => {
                    info!("EVENT: visibility mask changed!");
                }
                PerfSettingsEXT(_) => {
                    info!("EVENT: perf settings!");
                }
                _ => debug!("Unhandled event"),
            }
        }
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let frame_state = self.frame_waiter.wait().context("Failed to wait for frame")?;
        let display_time = frame_state.predicted_display_time;

        let (view_flags, view_poses) = self
            .session
            .locate_views(self.view_type, display_time, &self.play_space)
            .context("Failed to locate views")?;

        let tracking = self.input.poll(
            &self.session,
            &self.play_space,
            display_time,
            self.hand_tracking.as_ref(),
            self.poll_settings,
        );
        if !self.lifecycle.is_focused() {
            debug!("Session not focused, input may be inactive");
        }

        self.frame_stream.begin().context("Failed to begin frame")?;

        if !frame_state.should_render {
            return self.end_frame_empty(display_time);
        }
        if !view_flags.contains(xr::ViewStateFlags::ORIENTATION_VALID) {
            debug!("View orientation invalid, submitting no layers");
            return self.end_frame_empty(display_time);
        }

        let scene = scene::build_scene(&tracking, display_time.as_nanos());

        for (view_index, view_pose) in view_poses.iter().enumerate().take(self.views.len()) {
            let projection = math::projection_fov(&view_pose.fov, NEAR_Z, FAR_Z);
            let view = math::view_matrix(&view_pose.pose);

            let color = self.color_swapchains[view_index].acquire()?;
            let depth = match &mut self.depth_swapchains {
                Some(depth_swapchains) => Some(depth_swapchains[view_index].acquire()?),
                None => None,
            };

            let swapchain = &self.color_swapchains[view_index];
            let target = ViewTarget {
                image_index: color.index,
                color_texture: color.texture,
                depth_texture: depth.map(|image| image.texture),
                width: swapchain.width(),
                height: swapchain.height(),
            };
            let rendered = self
                .renderer
                .render_view(view_index, &target, &projection, &view, &scene);

            // Mirror while the image is still held, the runtime owns it after release
            if view_index == 0 && rendered.is_ok() {
                if let Some(held) = self.color_swapchains[view_index].held() {
                    self.renderer.mirror(view_index, held.index);
                    if let Err(e) = self.ctx.swap_buffers() {
                        warn!("Failed to swap desktop window buffers: {}", e);
                    }
                }
            }

            if let Some(depth_swapchains) = &mut self.depth_swapchains {
                depth_swapchains[view_index].release()?;
            }
            self.color_swapchains[view_index].release()?;
            rendered?;
        }

        let quad = self.quad_swapchain.acquire()?;
        let rendered = self.renderer.render_quad(quad.texture);
        self.quad_swapchain.release()?;
        rendered?;

        let projection_views: Vec<_> = view_poses
            .iter()
            .zip(&self.color_swapchains)
            .map(|(view_pose, swapchain)| {
                xr::CompositionLayerProjectionView::new()
                    .pose(view_pose.pose)
                    .fov(view_pose.fov)
                    .sub_image(swapchain.sub_image())
            })
            .collect();
        let projection_layer = xr::CompositionLayerProjection::new()
            .space(&self.play_space)
            .views(&projection_views);

        let quad_aspect = QUAD_PIXEL_WIDTH as f32 / QUAD_PIXEL_HEIGHT as f32;
        let quad_layer = xr::CompositionLayerQuad::new()
            .space(&self.play_space)
            .eye_visibility(xr::EyeVisibility::BOTH)
            .layer_flags(xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA)
            .pose(xr::Posef {
                orientation: xr::Posef::IDENTITY.orientation,
                position: QUAD_POSITION,
            })
            .size(xr::Extent2Df {
                width: QUAD_WIDTH,
                height: QUAD_WIDTH / quad_aspect,
            })
            .sub_image(self.quad_swapchain.sub_image());

        self.frame_stream
            .end(display_time, self.blend_mode, &[&projection_layer, &quad_layer])
            .context("Failed to end frame")?;
        Ok(())
    }

    fn end_frame_empty(&mut self, display_time: xr::Time) -> Result<()> {
        self.frame_stream
            .end(display_time, self.blend_mode, &[])
            .context("Failed to end frame")?;
        Ok(())
    }
}

fn log_system_properties(instance: &xr::Instance, system: xr::SystemId) -> Result<()> {
    let props = instance.system_properties(system)?;
    info!(
        "System properties for system {:?}: \"{}\", vendor ID {}",
        system, props.system_name, props.vendor_id
    );
    info!(
        "\tMax layers          : {}",
        props.graphics_properties.max_layer_count
    );
    info!(
        "\tMax swapchain height: {}",
        props.graphics_properties.max_swapchain_image_height
    );
    info!(
        "\tMax swapchain width : {}",
        props.graphics_properties.max_swapchain_image_width
    );
    info!(
        "\tOrientation Tracking: {}",
        props.tracking_properties.orientation_tracking
    );
    info!(
        "\tPosition Tracking   : {}",
        props.tracking_properties.position_tracking
    );
    Ok(())
}

/// Logs every view configuration and fails if `wanted` isn't among them
fn log_view_configurations(
    instance: &xr::Instance,
    system: xr::SystemId,
    wanted: xr::ViewConfigurationType,
) -> Result<()> {
    let view_types = instance.enumerate_view_configurations(system)?;
    info!("Runtime supports {} view configurations", view_types.len());
    for &view_type in &view_types {
        let props = instance.view_configuration_properties(system, view_type)?;
        info!(
            "\t{:?}{}: FOV mutable: {}",
            view_type,
            if view_type == wanted { " (selected)" } else { "" },
            props.fov_mutable
        );
    }
    if !view_types.contains(&wanted) {
        bail!("View configuration {:?} not supported by this system", wanted);
    }
    Ok(())
}

fn request_refresh_rate(session: &xr::Session<xr::OpenGL>, rate: f32) -> Result<()> {
    let rates = session.enumerate_display_refresh_rates()?;
    info!("Supported refresh rates: {:?}", rates);

    let current = session.get_display_refresh_rate()?;
    info!("Current refresh rate: {}", current);

    if let Err(e) = session.request_display_refresh_rate(rate) {
        warn!("Failed to request refresh rate {}: {}", rate, e);
        return Ok(());
    }
    info!("Requested refresh rate {}", rate);
    Ok(())
}
