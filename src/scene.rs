use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::math;
use crate::tracking::{FrameTracking, HandFrame, TrackedPose, HAND_LEFT_INDEX};

pub const LEFT_HAND_COLOR: [f32; 3] = [1.0, 0.5, 0.5];
pub const RIGHT_HAND_COLOR: [f32; 3] = [0.5, 1.0, 0.5];
pub const TRACKER_COLOR: [f32; 3] = [0.5, 0.5, 1.0];

const CUBE_SIZE: f32 = 0.33;
const CUBE_DISTANCE: f32 = 1.5;
const CUBE_HEIGHT: f32 = 0.5;
const ROTATIONS_PER_SEC: f64 = 0.25;

const CONTROLLER_SCALE: [f32; 3] = [0.05, 0.05, 0.2];
const AIM_SCALE: [f32; 3] = [0.01, 0.01, 0.1];
const TRACKER_SCALE: [f32; 3] = [0.05, 0.05, 0.05];
const VELOCITY_ARROW_SIZE: f32 = 0.005;

/// One unit cube to draw
#[derive(Debug, Clone, PartialEq)]
pub struct CubeDraw {
    pub model: Matrix4<f32>,
    /// `None` draws the cube with its UV coordinates as color
    pub color: Option<[f32; 3]>,
}

/// Everything in the world for one frame, in play space
pub fn build_scene(tracking: &FrameTracking, display_time_nanos: i64) -> Vec<CubeDraw> {
    let mut draws = rotating_cubes(display_time_nanos);

    for (index, hand) in tracking.hands.iter().enumerate() {
        let color = if index == HAND_LEFT_INDEX {
            LEFT_HAND_COLOR
        } else {
            RIGHT_HAND_COLOR
        };
        draw_hand(&mut draws, hand, color);
    }

    for tracker in &tracking.trackers {
        if tracker.pose.orientation_valid {
            draws.push(block(&tracker.pose.pose, TRACKER_SCALE, TRACKER_COLOR));
        }
    }

    draws
}

fn rotating_cubes(display_time_nanos: i64) -> Vec<CubeDraw> {
    let angle = math::cube_rotation_degrees(display_time_nanos, ROTATIONS_PER_SEC);
    [
        Vector3::new(0.0, CUBE_HEIGHT, -CUBE_DISTANCE),
        Vector3::new(0.0, CUBE_HEIGHT, CUBE_DISTANCE),
        Vector3::new(CUBE_DISTANCE, CUBE_HEIGHT, 0.0),
        Vector3::new(-CUBE_DISTANCE, CUBE_HEIGHT, 0.0),
    ]
    .into_iter()
    .map(|position| CubeDraw {
        model: math::rotated_cube(position, CUBE_SIZE, angle),
        color: None,
    })
    .collect()
}

fn draw_hand(draws: &mut Vec<CubeDraw>, hand: &HandFrame, color: [f32; 3]) {
    // tracked joints replace the controller block
    let mut any_joints_valid = false;
    for joint in hand.joints.iter().flatten() {
        if !joint.position_valid {
            continue;
        }
        draws.push(CubeDraw {
            model: math::model_matrix(
                math::to_vector(joint.pose.position),
                math::to_rotation(joint.pose.orientation),
                Vector3::repeat(joint.radius / 2.0),
            ),
            color: Some(color),
        });
        if let Some(velocity) = joint.linear_velocity {
            push_velocity_arrow(draws, &joint.pose, velocity, color);
        }
        any_joints_valid = true;
    }

    if let Some(grip) = hand.grip.filter(|grip| grip.orientation_valid) {
        if !any_joints_valid {
            draws.push(block(&grip.pose, CONTROLLER_SCALE, color));
        }
        if let Some(velocity) = grip.linear_velocity {
            push_velocity_arrow(draws, &grip.pose, velocity, color);
        }
    }

    if let Some(aim) = hand.aim.filter(|aim| aim.orientation_valid) {
        draws.push(aim_pointer(&aim, color));
    }
}

fn block(pose: &xr::Posef, scale: [f32; 3], color: [f32; 3]) -> CubeDraw {
    CubeDraw {
        model: math::model_matrix(
            math::to_vector(pose.position),
            math::to_rotation(pose.orientation),
            Vector3::from(scale),
        ),
        color: Some(color),
    }
}

/// A thin stick pushed forward (-z) along the aim ray so it starts at the aim origin
fn aim_pointer(aim: &TrackedPose, color: [f32; 3]) -> CubeDraw {
    let rotation: UnitQuaternion<f32> = math::to_rotation(aim.pose.orientation);
    let forward = rotation * Vector3::new(0.0, 0.0, -AIM_SCALE[2] / 2.0);
    CubeDraw {
        model: math::model_matrix(
            math::to_vector(aim.pose.position) + forward,
            rotation,
            Vector3::from(AIM_SCALE),
        ),
        color: Some(color),
    }
}

fn push_velocity_arrow(
    draws: &mut Vec<CubeDraw>,
    base: &xr::Posef,
    velocity: xr::Vector3f,
    color: [f32; 3],
) {
    if let Some(model) = math::velocity_arrow(
        math::to_vector(base.position),
        math::to_vector(velocity),
        VELOCITY_ARROW_SIZE,
    ) {
        draws.push(CubeDraw {
            model,
            color: Some(color),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{HandJoint, TrackerFrame, HAND_RIGHT_INDEX};

    fn tracked(position: [f32; 3], velocity: Option<[f32; 3]>) -> TrackedPose {
        TrackedPose {
            pose: xr::Posef {
                orientation: xr::Posef::IDENTITY.orientation,
                position: xr::Vector3f {
                    x: position[0],
                    y: position[1],
                    z: position[2],
                },
            },
            orientation_valid: true,
            position_valid: true,
            linear_velocity: velocity.map(|[x, y, z]| xr::Vector3f { x, y, z }),
        }
    }

    fn joint(valid: bool) -> HandJoint {
        HandJoint {
            pose: xr::Posef::IDENTITY,
            radius: 0.02,
            position_valid: valid,
            linear_velocity: None,
        }
    }

    fn colored(draws: &[CubeDraw], color: [f32; 3]) -> usize {
        draws.iter().filter(|d| d.color == Some(color)).count()
    }

    #[test]
    fn empty_tracking_draws_four_rotating_cubes() {
        let draws = build_scene(&FrameTracking::default(), 0);
        assert_eq!(draws.len(), 4);
        assert!(draws.iter().all(|d| d.color.is_none()));
    }

    #[test]
    fn cubes_rotate_with_display_time() {
        let still = build_scene(&FrameTracking::default(), 0);
        let later = build_scene(&FrameTracking::default(), 1_000_000_000);
        assert_ne!(still[0].model, later[0].model);
        // a full turn takes four seconds
        let full_turn = build_scene(&FrameTracking::default(), 4_000_000_000);
        assert_eq!(still[0].model, full_turn[0].model);
    }

    #[test]
    fn controller_block_drawn_for_valid_grip() {
        let mut tracking = FrameTracking::default();
        tracking.hands[HAND_LEFT_INDEX].grip = Some(tracked([0.0, 1.0, -0.3], None));
        let draws = build_scene(&tracking, 0);
        assert_eq!(colored(&draws, LEFT_HAND_COLOR), 1);
        assert_eq!(colored(&draws, RIGHT_HAND_COLOR), 0);
    }

    #[test]
    fn invalid_grip_orientation_draws_nothing() {
        let mut tracking = FrameTracking::default();
        let mut grip = tracked([0.0, 1.0, -0.3], Some([1.0, 0.0, 0.0]));
        grip.orientation_valid = false;
        tracking.hands[HAND_RIGHT_INDEX].grip = Some(grip);
        assert_eq!(build_scene(&tracking, 0).len(), 4);
    }

    #[test]
    fn grip_velocity_adds_an_arrow() {
        let mut tracking = FrameTracking::default();
        tracking.hands[HAND_RIGHT_INDEX].grip =
            Some(tracked([0.0, 1.0, -0.3], Some([0.0, 0.0, -1.0])));
        let draws = build_scene(&tracking, 0);
        assert_eq!(colored(&draws, RIGHT_HAND_COLOR), 2);
    }

    #[test]
    fn valid_joints_replace_controller_block() {
        let mut tracking = FrameTracking::default();
        let hand = &mut tracking.hands[HAND_LEFT_INDEX];
        hand.grip = Some(tracked([0.0, 1.0, -0.3], Some([1.0, 0.0, 0.0])));
        hand.joints = Some(vec![joint(true), joint(false), joint(true)]);

        let draws = build_scene(&tracking, 0);
        // two joints plus the grip velocity arrow, no controller block
        assert_eq!(colored(&draws, LEFT_HAND_COLOR), 3);
    }

    #[test]
    fn no_valid_joints_keeps_controller_block() {
        let mut tracking = FrameTracking::default();
        let hand = &mut tracking.hands[HAND_LEFT_INDEX];
        hand.grip = Some(tracked([0.0, 1.0, -0.3], None));
        hand.joints = Some(vec![joint(false); 26]);
        assert_eq!(colored(&build_scene(&tracking, 0), LEFT_HAND_COLOR), 1);
    }

    #[test]
    fn joint_velocity_adds_an_arrow() {
        let mut tracking = FrameTracking::default();
        let mut moving = joint(true);
        moving.linear_velocity = Some(xr::Vector3f {
            x: 0.0,
            y: 0.5,
            z: 0.0,
        });
        tracking.hands[HAND_RIGHT_INDEX].joints = Some(vec![moving]);
        assert_eq!(colored(&build_scene(&tracking, 0), RIGHT_HAND_COLOR), 2);
    }

    #[test]
    fn aim_pointer_starts_at_aim_origin() {
        let mut tracking = FrameTracking::default();
        tracking.hands[HAND_LEFT_INDEX].aim = Some(tracked([0.0, 1.0, 0.0], None));
        let draws = build_scene(&tracking, 0);
        let pointer = draws.last().unwrap();
        let back = pointer.model * nalgebra::Vector4::new(0.0, 0.0, 0.5, 1.0);
        assert!((back.xyz() - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn trackers_are_drawn_when_oriented() {
        let mut tracking = FrameTracking::default();
        tracking.trackers.push(TrackerFrame {
            role: "waist",
            pose: tracked([0.0, 1.0, 0.0], None),
        });
        let mut lost = tracked([0.0, 0.2, 0.0], None);
        lost.orientation_valid = false;
        tracking.trackers.push(TrackerFrame {
            role: "left_foot",
            pose: lost,
        });
        assert_eq!(colored(&build_scene(&tracking, 0), TRACKER_COLOR), 1);
    }
}
