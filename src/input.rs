//! Actions, suggested bindings and per-frame polling of controllers, hands
//! and trackers.

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::tracking::{
    FrameTracking, HandFrame, HandJoint, TrackedPose, TrackerFrame, HAND_COUNT,
};

pub const HAND_PATHS: [&str; HAND_COUNT] = ["/user/hand/left", "/user/hand/right"];

/// Grab values above this trigger a haptic pulse
pub const GRAB_HAPTIC_THRESHOLD: f32 = 0.75;
const HAPTIC_AMPLITUDE: f32 = 0.5;
/// XR_MIN_HAPTIC_DURATION
const MIN_HAPTIC_DURATION_NANOS: i64 = -1;
/// XR_FREQUENCY_UNSPECIFIED
const FREQUENCY_UNSPECIFIED: f32 = 0.0;

pub const TRACKER_PROFILE: &str = "/interaction_profiles/htc/vive_tracker_htcx";
pub const TRACKER_ROLES: [&str; 13] = [
    "handheld_object",
    "left_foot",
    "right_foot",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_knee",
    "right_knee",
    "waist",
    "chest",
    "camera",
    "keyboard",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandAction {
    Grab,
    Accelerate,
    HandPose,
    AimPose,
    Haptic,
}

/// Suggested bindings for one controller profile. Each binding is a path
/// relative to a hand, suggested for both hands.
#[derive(Debug)]
pub struct ControllerProfile {
    pub path: &'static str,
    pub bindings: &'static [(HandAction, &'static str)],
    /// The runtime must accept this profile's suggestions
    pub required: bool,
}

pub const CONTROLLER_PROFILES: &[ControllerProfile] = &[
    ControllerProfile {
        path: "/interaction_profiles/khr/simple_controller",
        bindings: &[
            (HandAction::Grab, "input/select/click"),
            (HandAction::HandPose, "input/grip/pose"),
            (HandAction::AimPose, "input/aim/pose"),
            (HandAction::Haptic, "output/haptic"),
        ],
        required: true,
    },
    ControllerProfile {
        path: "/interaction_profiles/valve/index_controller",
        bindings: &[
            (HandAction::Grab, "input/trigger/value"),
            (HandAction::Accelerate, "input/thumbstick/y"),
            (HandAction::HandPose, "input/grip/pose"),
            (HandAction::AimPose, "input/aim/pose"),
            (HandAction::Haptic, "output/haptic"),
        ],
        required: false,
    },
    ControllerProfile {
        path: "/interaction_profiles/oculus/touch_controller",
        bindings: &[
            (HandAction::Grab, "input/trigger/value"),
            (HandAction::Accelerate, "input/thumbstick/y"),
            (HandAction::HandPose, "input/grip/pose"),
            (HandAction::AimPose, "input/aim/pose"),
            (HandAction::Haptic, "output/haptic"),
        ],
        required: false,
    },
    ControllerProfile {
        path: "/interaction_profiles/htc/vive_controller",
        bindings: &[
            (HandAction::Grab, "input/trigger/value"),
            (HandAction::Accelerate, "input/trackpad/y"),
            (HandAction::HandPose, "input/grip/pose"),
            (HandAction::AimPose, "input/aim/pose"),
            (HandAction::Haptic, "output/haptic"),
        ],
        required: false,
    },
];

impl ControllerProfile {
    /// Full binding paths, left hand first
    pub fn binding_paths(&self) -> Vec<(HandAction, String)> {
        self.bindings
            .iter()
            .flat_map(|&(action, suffix)| {
                HAND_PATHS
                    .iter()
                    .map(move |hand| (action, format!("{}/{}", hand, suffix)))
            })
            .collect()
    }
}

pub fn tracker_role_path(role: &str) -> String {
    format!("/user/vive_tracker_htcx/role/{}", role)
}

pub fn tracker_pose_binding(role: &str) -> String {
    format!("{}/input/grip/pose", tracker_role_path(role))
}

/// What to query each frame
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub hand_velocities: bool,
    pub joint_velocities: bool,
}

struct TrackerRole {
    name: &'static str,
    path: xr::Path,
    space: xr::Space,
}

struct TrackerInput {
    pose: xr::Action<xr::Posef>,
    roles: Vec<TrackerRole>,
}

pub struct Input {
    action_set: xr::ActionSet,
    grab: xr::Action<f32>,
    accelerate: xr::Action<f32>,
    hand_pose: xr::Action<xr::Posef>,
    aim_pose: xr::Action<xr::Posef>,
    haptic: xr::Action<xr::Haptic>,
    hand_paths: [xr::Path; HAND_COUNT],
    grip_spaces: Vec<xr::Space>,
    aim_spaces: Vec<xr::Space>,
    trackers: Option<TrackerInput>,
}

impl Input {
    /// Creates the gameplay action set, suggests bindings for every known
    /// controller profile and creates the pose spaces. Call `attach` once the
    /// rest of the setup is done.
    pub fn new(
        instance: &xr::Instance,
        session: &xr::Session<xr::OpenGL>,
        vive_trackers: bool,
    ) -> Result<Self> {
        let hand_paths = [
            instance.string_to_path(HAND_PATHS[0])?,
            instance.string_to_path(HAND_PATHS[1])?,
        ];

        let action_set = instance
            .create_action_set("gameplay_actionset", "Gameplay Actions", 0)
            .context("failed to create actionset")?;

        // Grabbing isn't implemented, it only gives some haptic feedback
        let grab = action_set
            .create_action::<f32>("grabobjectfloat", "Grab Object", &hand_paths)
            .context("Failed to create action grabobjectfloat")?;
        // One axis of a 2D input
        let accelerate = action_set
            .create_action::<f32>("accelerate", "Accelerate", &hand_paths)
            .context("Failed to create action accelerate")?;
        let hand_pose = action_set
            .create_action::<xr::Posef>("handpose", "Hand Pose", &hand_paths)
            .context("Failed to create action handpose")?;
        let aim_pose = action_set
            .create_action::<xr::Posef>("aimpose", "Aim Pose", &hand_paths)
            .context("Failed to create action aimpose")?;
        let haptic = action_set
            .create_action::<xr::Haptic>("haptic", "Haptic Vibration", &hand_paths)
            .context("Failed to create action haptic")?;

        for profile in CONTROLLER_PROFILES {
            let suggested = suggest_controller_profile(
                instance,
                profile,
                &grab,
                &accelerate,
                &hand_pose,
                &aim_pose,
                &haptic,
            );
            match suggested {
                Ok(()) => {}
                Err(e) if !profile.required => {
                    warn!("Skipping bindings for {}: {:#}", profile.path, e)
                }
                Err(e) => return Err(e),
            }
        }

        let trackers = if vive_trackers {
            Some(create_tracker_input(instance, session, &action_set)?)
        } else {
            None
        };

        // Poses can't be queried directly, each needs a space
        let grip_spaces = hand_paths
            .iter()
            .map(|&path| hand_pose.create_space(session.clone(), path, xr::Posef::IDENTITY))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to create hand pose space")?;
        let aim_spaces = hand_paths
            .iter()
            .map(|&path| aim_pose.create_space(session.clone(), path, xr::Posef::IDENTITY))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to create aim pose space")?;

        Ok(Self {
            action_set,
            grab,
            accelerate,
            hand_pose,
            aim_pose,
            haptic,
            hand_paths,
            grip_spaces,
            aim_spaces,
            trackers,
        })
    }

    pub fn attach(&self, session: &xr::Session<xr::OpenGL>) -> Result<()> {
        session
            .attach_action_sets(&[&self.action_set])
            .context("failed to attach action set")
    }

    /// Syncs actions and reads everything for this frame. Failures of single
    /// queries are logged and leave that part of the snapshot empty.
    pub fn poll(
        &self,
        session: &xr::Session<xr::OpenGL>,
        play_space: &xr::Space,
        time: xr::Time,
        hand_tracking: Option<&HandTracking>,
        settings: PollSettings,
    ) -> FrameTracking {
        if let Err(e) = session.sync_actions(&[xr::ActiveActionSet::new(&self.action_set)]) {
            warn!("failed to sync actions! {}", e);
        }

        let mut tracking = FrameTracking::default();
        for (hand, frame) in tracking.hands.iter_mut().enumerate() {
            *frame = self.poll_hand(session, play_space, time, hand, settings);

            if let Some(hand_tracking) = hand_tracking {
                frame.joints = hand_tracking
                    .locate(play_space, time, hand, settings.joint_velocities)
                    .unwrap_or_else(|e| {
                        warn!("failed to locate hand joints! {}", e);
                        None
                    });
            }
        }

        if let Some(trackers) = &self.trackers {
            tracking.trackers = poll_trackers(trackers, session, play_space, time);
        }

        tracking
    }

    fn poll_hand(
        &self,
        session: &xr::Session<xr::OpenGL>,
        play_space: &xr::Space,
        time: xr::Time,
        hand: usize,
        settings: PollSettings,
    ) -> HandFrame {
        let path = self.hand_paths[hand];

        let grip = locate_pose(
            &self.hand_pose,
            &self.grip_spaces[hand],
            session,
            path,
            play_space,
            time,
            settings.hand_velocities,
        )
        .unwrap_or_else(|e| {
            warn!("Failed to get hand pose action data for hand {}: {}", hand, e);
            None
        });
        let aim = locate_pose(
            &self.aim_pose,
            &self.aim_spaces[hand],
            session,
            path,
            play_space,
            time,
            false,
        )
        .unwrap_or_else(|e| {
            warn!("Failed to get aim pose action data for hand {}: {}", hand, e);
            None
        });

        let grab = match self.grab.state(session, path) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Failed to get grab action data for hand {}: {}", hand, e);
                None
            }
        };
        if haptic_pulse_for(grab.as_ref()) {
            let vibration = xr::HapticVibration::new()
                .amplitude(HAPTIC_AMPLITUDE)
                .duration(xr::Duration::from_nanos(MIN_HAPTIC_DURATION_NANOS))
                .frequency(FREQUENCY_UNSPECIFIED);
            if let Err(e) = self.haptic.apply_feedback(session, path, &vibration) {
                warn!("failed to apply haptic feedback! {}", e);
            }
        }

        let accelerate = match self.accelerate.state(session, path) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Failed to get accelerate action data for hand {}: {}", hand, e);
                None
            }
        };
        if let Some(state) = &accelerate {
            if state.is_active && state.current_state != 0.0 {
                info!(
                    "Throttle value {}: changed {}: {}",
                    hand, state.changed_since_last_sync, state.current_state
                );
            }
        }

        HandFrame {
            grip,
            aim,
            grab: active_value(grab.as_ref()),
            accelerate: active_value(accelerate.as_ref()),
            joints: None,
        }
    }

    /// Logs the interaction profile the runtime picked for each hand
    pub fn log_interaction_profiles(
        &self,
        instance: &xr::Instance,
        session: &xr::Session<xr::OpenGL>,
    ) {
        for (hand, &path) in self.hand_paths.iter().enumerate() {
            let profile = match session.current_interaction_profile(path) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("Failed to get interaction profile for {}: {}", hand, e);
                    continue;
                }
            };
            if profile == xr::Path::NULL {
                info!("Event: Interaction profile changed for {}: none", hand);
                continue;
            }
            match instance.path_to_string(profile) {
                Ok(name) => info!("Event: Interaction profile changed for {}: {}", hand, name),
                Err(e) => warn!(
                    "Failed to get interaction profile path str for {}: {}",
                    hand, e
                ),
            }
        }
    }
}

/// Grab pressed past the threshold on an active binding
pub fn haptic_pulse_for(grab: Option<&xr::ActionState<f32>>) -> bool {
    grab.map_or(false, |state| {
        state.is_active && state.current_state > GRAB_HAPTIC_THRESHOLD
    })
}

/// The value of a float action, if it could be read and is bound
fn active_value(state: Option<&xr::ActionState<f32>>) -> Option<f32> {
    state
        .filter(|state| state.is_active)
        .map(|state| state.current_state)
}

#[allow(clippy::too_many_arguments)]
fn suggest_controller_profile(
    instance: &xr::Instance,
    profile: &ControllerProfile,
    grab: &xr::Action<f32>,
    accelerate: &xr::Action<f32>,
    hand_pose: &xr::Action<xr::Posef>,
    aim_pose: &xr::Action<xr::Posef>,
    haptic: &xr::Action<xr::Haptic>,
) -> Result<()> {
    let profile_path = instance
        .string_to_path(profile.path)
        .with_context(|| format!("Failed to get interaction profile path {}", profile.path))?;

    let mut bindings = Vec::new();
    for (action, path) in profile.binding_paths() {
        let binding_path = instance
            .string_to_path(&path)
            .with_context(|| format!("Failed to get binding path {}", path))?;
        debug!("{:?}: {}", action, path);
        bindings.push(match action {
            HandAction::Grab => xr::Binding::new(grab, binding_path),
            HandAction::Accelerate => xr::Binding::new(accelerate, binding_path),
            HandAction::HandPose => xr::Binding::new(hand_pose, binding_path),
            HandAction::AimPose => xr::Binding::new(aim_pose, binding_path),
            HandAction::Haptic => xr::Binding::new(haptic, binding_path),
        });
    }

    info!(
        "Suggesting {} bindings for {}",
        bindings.len(),
        profile.path
    );
    instance
        .suggest_interaction_profile_bindings(profile_path, &bindings)
        .context("Failed to suggest actions")?;
    Ok(())
}

fn create_tracker_input(
    instance: &xr::Instance,
    session: &xr::Session<xr::OpenGL>,
    action_set: &xr::ActionSet,
) -> Result<TrackerInput> {
    let role_paths = TRACKER_ROLES
        .iter()
        .map(|role| instance.string_to_path(&tracker_role_path(role)))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to get tracker role path")?;

    let pose = action_set
        .create_action::<xr::Posef>("trackerpose", "Tracker Pose", &role_paths)
        .context("Failed to create action trackerpose")?;

    let bindings = TRACKER_ROLES
        .iter()
        .map(|role| {
            let path = instance.string_to_path(&tracker_pose_binding(role))?;
            Ok(xr::Binding::new(&pose, path))
        })
        .collect::<Result<Vec<_>>>()
        .context("Failed to get tracker binding path")?;
    instance
        .suggest_interaction_profile_bindings(instance.string_to_path(TRACKER_PROFILE)?, &bindings)
        .context("Failed to suggest tracker actions")?;
    info!("Suggested {} tracker role bindings", bindings.len());

    let roles = TRACKER_ROLES
        .iter()
        .zip(role_paths)
        .map(|(&name, path)| {
            let space = pose.create_space(session.clone(), path, xr::Posef::IDENTITY)?;
            Ok(TrackerRole { name, path, space })
        })
        .collect::<Result<Vec<_>>>()
        .context("failed to create tracker pose space")?;

    Ok(TrackerInput { pose, roles })
}

fn locate_pose(
    action: &xr::Action<xr::Posef>,
    space: &xr::Space,
    session: &xr::Session<xr::OpenGL>,
    subaction_path: xr::Path,
    base: &xr::Space,
    time: xr::Time,
    velocities: bool,
) -> Result<Option<TrackedPose>> {
    if !action.is_active(session, subaction_path)? {
        return Ok(None);
    }

    let pose = if velocities {
        let (location, velocity) = space.relate(base, time)?;
        TrackedPose::from_relation(&location, &velocity)
    } else {
        TrackedPose::from_location(&space.locate(base, time)?)
    };
    Ok(Some(pose))
}

fn poll_trackers(
    trackers: &TrackerInput,
    session: &xr::Session<xr::OpenGL>,
    play_space: &xr::Space,
    time: xr::Time,
) -> Vec<TrackerFrame> {
    trackers
        .roles
        .iter()
        .filter_map(|role| {
            match locate_pose(
                &trackers.pose,
                &role.space,
                session,
                role.path,
                play_space,
                time,
                false,
            ) {
                Ok(pose) => pose.map(|pose| TrackerFrame {
                    role: role.name,
                    pose,
                }),
                Err(e) => {
                    warn!("Failed to locate tracker {}: {}", role.name, e);
                    None
                }
            }
        })
        .collect()
}

/// Articulated hand tracking through XR_EXT_hand_tracking
pub struct HandTracking {
    trackers: [xr::HandTracker; HAND_COUNT],
}

impl HandTracking {
    pub fn new(session: &xr::Session<xr::OpenGL>) -> Result<Self> {
        let left = session
            .create_hand_tracker(xr::Hand::LEFT)
            .context("Failed to create hand tracker 0")?;
        let right = session
            .create_hand_tracker(xr::Hand::RIGHT)
            .context("Failed to create hand tracker 1")?;
        info!("Created hand trackers");
        Ok(Self {
            trackers: [left, right],
        })
    }

    /// Joint poses for `hand`, or `None` if the hand isn't tracked right now
    pub fn locate(
        &self,
        base: &xr::Space,
        time: xr::Time,
        hand: usize,
        velocities: bool,
    ) -> Result<Option<Vec<HandJoint>>> {
        let tracker = &self.trackers[hand];
        if velocities {
            let located = base.relate_hand_joints(tracker, time)?;
            Ok(located.map(|(locations, joint_velocities)| {
                locations
                    .iter()
                    .zip(joint_velocities.iter())
                    .map(|(location, velocity)| {
                        HandJoint::from_location(location).with_velocity(velocity)
                    })
                    .collect()
            }))
        } else {
            let located = base.locate_hand_joints(tracker, time)?;
            Ok(located.map(|locations| locations.iter().map(HandJoint::from_location).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(path: &str) -> &'static ControllerProfile {
        CONTROLLER_PROFILES
            .iter()
            .find(|p| p.path == path)
            .unwrap()
    }

    #[test]
    fn every_binding_is_suggested_for_both_hands() {
        for profile in CONTROLLER_PROFILES {
            let paths = profile.binding_paths();
            assert_eq!(paths.len(), profile.bindings.len() * HAND_COUNT);
            let left = paths.iter().filter(|(_, p)| p.starts_with("/user/hand/left/")).count();
            let right = paths.iter().filter(|(_, p)| p.starts_with("/user/hand/right/")).count();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn simple_controller_grabs_with_select() {
        let paths = profile("/interaction_profiles/khr/simple_controller").binding_paths();
        assert!(paths.contains(&(
            HandAction::Grab,
            "/user/hand/left/input/select/click".to_owned()
        )));
        assert!(paths.contains(&(
            HandAction::Haptic,
            "/user/hand/right/output/haptic".to_owned()
        )));
        // no thumbstick on the simple controller
        assert!(paths.iter().all(|(action, _)| *action != HandAction::Accelerate));
    }

    #[test]
    fn index_controller_accelerates_with_thumbstick() {
        let paths = profile("/interaction_profiles/valve/index_controller").binding_paths();
        assert!(paths.contains(&(
            HandAction::Accelerate,
            "/user/hand/right/input/thumbstick/y".to_owned()
        )));
        assert!(paths.contains(&(
            HandAction::Grab,
            "/user/hand/left/input/trigger/value".to_owned()
        )));
    }

    #[test]
    fn only_simple_controller_is_required() {
        let required: Vec<_> = CONTROLLER_PROFILES
            .iter()
            .filter(|p| p.required)
            .map(|p| p.path)
            .collect();
        assert_eq!(required, ["/interaction_profiles/khr/simple_controller"]);
    }

    #[test]
    fn every_profile_binds_poses_and_haptics() {
        for profile in CONTROLLER_PROFILES {
            for needed in [HandAction::HandPose, HandAction::AimPose, HandAction::Haptic] {
                assert!(
                    profile.bindings.iter().any(|(action, _)| *action == needed),
                    "{} lacks {:?}",
                    profile.path,
                    needed
                );
            }
        }
    }

    fn float_state(value: f32, is_active: bool) -> xr::ActionState<f32> {
        xr::ActionState {
            current_state: value,
            changed_since_last_sync: false,
            last_change_time: xr::Time::from_nanos(0),
            is_active,
        }
    }

    #[test]
    fn haptics_only_past_grab_threshold() {
        assert!(haptic_pulse_for(Some(&float_state(0.9, true))));
        assert!(!haptic_pulse_for(Some(&float_state(GRAB_HAPTIC_THRESHOLD, true))));
        assert!(!haptic_pulse_for(Some(&float_state(0.5, true))));
        // unbound actions report stale values
        assert!(!haptic_pulse_for(Some(&float_state(1.0, false))));
    }

    #[test]
    fn unreadable_grab_gives_no_pulse_and_no_value() {
        assert!(!haptic_pulse_for(None));
        assert_eq!(active_value(None), None);
    }

    #[test]
    fn active_value_ignores_inactive_actions() {
        assert_eq!(active_value(Some(&float_state(0.3, true))), Some(0.3));
        assert_eq!(active_value(Some(&float_state(0.3, false))), None);
    }

    #[test]
    fn tracker_paths() {
        assert_eq!(
            tracker_role_path("waist"),
            "/user/vive_tracker_htcx/role/waist"
        );
        assert_eq!(
            tracker_pose_binding("left_foot"),
            "/user/vive_tracker_htcx/role/left_foot/input/grip/pose"
        );
        assert!(TRACKER_ROLES.contains(&"handheld_object"));
    }
}
