//! Owned snapshot of everything located during one frame

pub const HAND_LEFT_INDEX: usize = 0;
pub const HAND_RIGHT_INDEX: usize = 1;
pub const HAND_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPose {
    pub pose: xr::Posef,
    pub orientation_valid: bool,
    pub position_valid: bool,
    /// Only present when velocities were queried and the runtime marked them valid
    pub linear_velocity: Option<xr::Vector3f>,
}

impl TrackedPose {
    pub fn from_location(location: &xr::SpaceLocation) -> Self {
        let flags = location.location_flags;
        Self {
            pose: location.pose,
            orientation_valid: flags.contains(xr::SpaceLocationFlags::ORIENTATION_VALID),
            position_valid: flags.contains(xr::SpaceLocationFlags::POSITION_VALID),
            linear_velocity: None,
        }
    }

    pub fn from_relation(location: &xr::SpaceLocation, velocity: &xr::SpaceVelocity) -> Self {
        Self {
            linear_velocity: valid_linear_velocity(velocity.velocity_flags, velocity.linear_velocity),
            ..Self::from_location(location)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandJoint {
    pub pose: xr::Posef,
    pub radius: f32,
    pub position_valid: bool,
    pub linear_velocity: Option<xr::Vector3f>,
}

impl HandJoint {
    pub fn from_location(location: &xr::HandJointLocationEXT) -> Self {
        Self {
            pose: location.pose,
            radius: location.radius,
            position_valid: location
                .location_flags
                .contains(xr::SpaceLocationFlags::POSITION_VALID),
            linear_velocity: None,
        }
    }

    pub fn with_velocity(self, velocity: &xr::HandJointVelocityEXT) -> Self {
        Self {
            linear_velocity: valid_linear_velocity(velocity.velocity_flags, velocity.linear_velocity),
            ..self
        }
    }
}

fn valid_linear_velocity(
    flags: xr::SpaceVelocityFlags,
    linear_velocity: xr::Vector3f,
) -> Option<xr::Vector3f> {
    flags
        .contains(xr::SpaceVelocityFlags::LINEAR_VALID)
        .then_some(linear_velocity)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandFrame {
    pub grip: Option<TrackedPose>,
    pub aim: Option<TrackedPose>,
    pub grab: Option<f32>,
    pub accelerate: Option<f32>,
    /// Present when hand tracking is active for this hand
    pub joints: Option<Vec<HandJoint>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerFrame {
    pub role: &'static str,
    pub pose: TrackedPose,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTracking {
    pub hands: [HandFrame; HAND_COUNT],
    pub trackers: Vec<TrackerFrame>,
}
