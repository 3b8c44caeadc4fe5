use glutin::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
};
use log::warn;
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use std::f32::consts::FRAC_PI_2;

/// Mouse driven camera for the desktop preview
#[derive(Default, Copy, Clone)]
pub struct Camera {
    proj: Perspective,
    view: ArcBall,
    control: ArcBallController,

    last_mouse_position: Option<(f64, f64)>,
    left_is_clicked: bool,
    right_is_clicked: bool,
}

impl Camera {
    pub fn projection(&self, width: f32, height: f32) -> Matrix4<f32> {
        self.proj.matrix(width, height)
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.view.matrix()
    }

    /// Returns `true` if the event moved the camera or changed its input state
    pub fn handle_events(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let &PhysicalPosition { x, y } = position;
                if let Some((last_x, last_y)) = self.last_mouse_position {
                    let x_delta = (last_x - x) as f32;
                    let y_delta = (last_y - y) as f32;
                    if self.left_is_clicked {
                        self.control.pivot(&mut self.view, x_delta, y_delta);
                    } else if self.right_is_clicked {
                        self.control.pan(&mut self.view, x_delta, y_delta);
                    }
                }
                self.last_mouse_position = Some((x, y));
                true
            }
            WindowEvent::MouseInput { state, button, .. } => match button {
                MouseButton::Left => {
                    self.left_is_clicked = *state == ElementState::Pressed;
                    true
                }
                MouseButton::Right => {
                    self.right_is_clicked = *state == ElementState::Pressed;
                    true
                }
                _ => false,
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_x, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / PIXELS_PER_LINE) as f32,
                };
                // Scrolling up moves closer
                self.control.zoom(&mut self.view, -lines);
                true
            }
            _ => false,
        }
    }
}

const PIXELS_PER_LINE: f64 = 20.0;

/// Perspective projection parameters
#[derive(Copy, Clone)]
pub struct Perspective {
    pub fov: f32,
    pub clip_near: f32,
    pub clip_far: f32,
}

/// Orbit around a pivot point
#[derive(Copy, Clone)]
pub struct ArcBall {
    pub pivot: Point3<f32>,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Copy, Clone)]
pub struct ArcBallController {
    pub pan_sensitivity: f32,
    pub swivel_sensitivity: f32,
    pub zoom_sensitivity: f32,
    pub closest_zoom: f32,
}

impl Perspective {
    pub fn matrix(&self, width: f32, height: f32) -> Matrix4<f32> {
        Matrix4::new_perspective(width / height.max(1.0), self.fov, self.clip_near, self.clip_far)
    }
}

impl ArcBall {
    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(
            &(self.pivot + self.eye()),
            &self.pivot,
            &Vector3::new(0.0, 1.0, 0.0),
        )
    }

    /// Eye position relative to the pivot
    pub fn eye(&self) -> Vector3<f32> {
        Vector3::new(
            self.yaw.cos() * self.pitch.cos().abs(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos().abs(),
        ) * self.distance
    }
}

impl ArcBallController {
    pub fn pivot(&self, arcball: &mut ArcBall, delta_x: f32, delta_y: f32) {
        arcball.yaw += delta_x * self.swivel_sensitivity;
        arcball.pitch += delta_y * self.swivel_sensitivity;

        arcball.pitch = arcball.pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    /// Moves the pivot in the view plane
    pub fn pan(&self, arcball: &mut ArcBall, delta_x: f32, delta_y: f32) {
        let delta = Vector4::new(
            delta_x * arcball.distance,
            -delta_y * arcball.distance,
            0.0,
            0.0,
        ) * self.pan_sensitivity;

        match arcball.matrix().try_inverse() {
            Some(inv) => arcball.pivot += (inv * delta).xyz(),
            None => warn!("Failed to invert camera matrix!"),
        }
    }

    pub fn zoom(&self, arcball: &mut ArcBall, delta: f32) {
        arcball.distance += delta * self.zoom_sensitivity * arcball.distance;
        arcball.distance = arcball.distance.max(self.closest_zoom);
    }
}

impl Default for ArcBall {
    fn default() -> Self {
        // Standing height, looking at the ring of cubes
        Self {
            pivot: Point3::new(0.0, 0.5, 0.0),
            pitch: 0.5,
            yaw: -1.92,
            distance: 4.,
        }
    }
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov: 60.0f32.to_radians(),
            clip_near: 0.05,
            clip_far: 100.0,
        }
    }
}

impl Default for ArcBallController {
    fn default() -> Self {
        Self {
            pan_sensitivity: 0.0015,
            swivel_sensitivity: 0.005,
            zoom_sensitivity: 0.1,
            closest_zoom: 0.2,
        }
    }
}
