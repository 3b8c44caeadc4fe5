//! Matrix helpers for turning OpenXR poses and fields of view into
//! column-major OpenGL matrices.

use nalgebra::{
    Isometry3, Matrix4, Point3, Quaternion, Translation3, UnitQuaternion, Vector3,
};

pub fn to_vector(v: xr::Vector3f) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

pub fn to_rotation(q: xr::Quaternionf) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn to_isometry(pose: &xr::Posef) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::from(to_vector(pose.position)),
        to_rotation(pose.orientation),
    )
}

/// Projection matrix for an asymmetric field of view, in OpenGL clip space
/// (Y up, Z in [-1, 1]). A `far` not beyond `near` puts the far plane at
/// infinity.
pub fn projection_fov(fov: &xr::Fovf, near: f32, far: f32) -> Matrix4<f32> {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_down = fov.angle_down.tan();
    let tan_up = fov.angle_up.tan();

    let tan_width = tan_right - tan_left;
    let tan_height = tan_up - tan_down;

    // OpenGL's [-1, 1] depth range
    let offset_z = near;

    let (m22, m23) = if far <= near {
        (-1.0, -(near + offset_z))
    } else {
        (
            -(far + offset_z) / (far - near),
            -(far * (near + offset_z)) / (far - near),
        )
    };

    #[rustfmt::skip]
    let projection = Matrix4::new(
        2.0 / tan_width, 0.0,              (tan_right + tan_left) / tan_width, 0.0,
        0.0,             2.0 / tan_height, (tan_up + tan_down) / tan_height,   0.0,
        0.0,             0.0,              m22,                                m23,
        0.0,             0.0,              -1.0,                               0.0,
    );
    projection
}

/// World-to-eye matrix for an eye at `pose`
pub fn view_matrix(pose: &xr::Posef) -> Matrix4<f32> {
    to_isometry(pose).inverse().to_homogeneous()
}

/// Translation * rotation * scale
pub fn model_matrix(
    position: Vector3<f32>,
    orientation: UnitQuaternion<f32>,
    scale: Vector3<f32>,
) -> Matrix4<f32> {
    Matrix4::new_translation(&position)
        * orientation.to_homogeneous()
        * Matrix4::new_nonuniform_scaling(&scale)
}

/// A unit cube scaled to `size`, spun `angle_degrees` around its Y axis
pub fn rotated_cube(position: Vector3<f32>, size: f32, angle_degrees: f32) -> Matrix4<f32> {
    Matrix4::new_translation(&position)
        * Matrix4::new_scaling(size / 2.0)
        * Matrix4::from_axis_angle(&Vector3::y_axis(), angle_degrees.to_radians())
}

/// Places a unit cube as a block pointing from `base` along `linear_velocity`.
/// Its length grows with the speed, its thickness is `size`.
pub fn velocity_arrow(
    base: Vector3<f32>,
    linear_velocity: Vector3<f32>,
    size: f32,
) -> Option<Matrix4<f32>> {
    let speed = linear_velocity.norm();
    if !(speed > f32::EPSILON) {
        return None;
    }

    let cube_radius = size / 2.0;
    let block_radius = speed / 2.0;
    let direction = linear_velocity / speed;

    let from = Point3::from(base + direction * (block_radius / 2.0));
    let to = Point3::from(base + direction);

    // look_at degenerates when looking straight along the up vector
    let up = if direction.y.abs() > 0.999 {
        Vector3::z()
    } else {
        Vector3::y()
    };

    let placement = Isometry3::look_at_rh(&from, &to, &up).inverse();
    Some(
        placement.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&Vector3::new(cube_radius, cube_radius, block_radius)),
    )
}

/// Spin of the scene cubes in whole degrees at `display_time_nanos`
pub fn cube_rotation_degrees(display_time_nanos: i64, rotations_per_sec: f64) -> f32 {
    let seconds = display_time_nanos as f64 / 1_000_000_000.0;
    ((seconds * 360.0 * rotations_per_sec) as i64 % 360) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector4;

    const EPSILON: f32 = 1e-5;

    fn assert_close(a: &Matrix4<f32>, b: &Matrix4<f32>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < EPSILON, "\n{}\n!=\n{}", a, b);
        }
    }

    fn pose(position: [f32; 3], orientation: UnitQuaternion<f32>) -> xr::Posef {
        let q = orientation.quaternion();
        xr::Posef {
            orientation: xr::Quaternionf {
                x: q.i,
                y: q.j,
                z: q.k,
                w: q.w,
            },
            position: xr::Vector3f {
                x: position[0],
                y: position[1],
                z: position[2],
            },
        }
    }

    fn symmetric_fov(half_angle: f32) -> xr::Fovf {
        xr::Fovf {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }

    #[test]
    fn symmetric_projection_matches_perspective() {
        let fovy = std::f32::consts::FRAC_PI_2;
        let ours = projection_fov(&symmetric_fov(fovy / 2.0), 0.01, 100.0);
        let reference = Matrix4::new_perspective(1.0, fovy, 0.01, 100.0);
        assert_close(&ours, &reference);
    }

    #[test]
    fn near_and_far_planes_map_to_clip_bounds() {
        let near = 0.1;
        let far = 10.0;
        let projection = projection_fov(&symmetric_fov(0.7), near, far);

        let on_near = projection * Vector4::new(0.0, 0.0, -near, 1.0);
        let on_far = projection * Vector4::new(0.0, 0.0, -far, 1.0);
        assert!((on_near.z / on_near.w + 1.0).abs() < EPSILON);
        assert!((on_far.z / on_far.w - 1.0).abs() < EPSILON);
    }

    #[test]
    fn asymmetric_projection_shifts_center() {
        let fov = xr::Fovf {
            angle_left: -0.9,
            angle_right: 0.7,
            angle_up: 0.8,
            angle_down: -0.8,
        };
        let projection = projection_fov(&fov, 0.01, 100.0);
        let expected = (0.7f32.tan() + (-0.9f32).tan()) / (0.7f32.tan() - (-0.9f32).tan());
        assert!((projection[(0, 2)] - expected).abs() < EPSILON);
        assert!(projection[(0, 2)] < 0.0);
        assert_eq!(projection[(1, 2)], 0.0);
    }

    #[test]
    fn infinite_far_plane() {
        let near = 0.05;
        let projection = projection_fov(&symmetric_fov(0.7), near, near);
        assert_eq!(projection[(2, 2)], -1.0);
        assert!((projection[(2, 3)] + 2.0 * near).abs() < EPSILON);
        assert_eq!(projection[(3, 2)], -1.0);
    }

    #[test]
    fn view_matrix_undoes_the_eye_pose() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.6);
        let eye = pose([0.3, 1.6, -0.2], rotation);
        let view = view_matrix(&eye);

        let eye_position = Vector4::new(0.3, 1.6, -0.2, 1.0);
        let in_view = view * eye_position;
        assert!(in_view.xyz().norm() < EPSILON);

        let model = model_matrix(
            to_vector(eye.position),
            to_rotation(eye.orientation),
            Vector3::repeat(1.0),
        );
        assert_close(&(view * model), &Matrix4::identity());
    }

    #[test]
    fn model_matrix_scales_then_rotates_then_translates() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let model = model_matrix(Vector3::new(1.0, 2.0, 3.0), rotation, Vector3::new(2.0, 1.0, 1.0));
        let corner = model * Vector4::new(1.0, 0.0, 0.0, 1.0);
        // x scaled to 2, rotated onto +y, then moved
        assert!((corner - Vector4::new(1.0, 4.0, 3.0, 1.0)).norm() < EPSILON);
    }

    #[test]
    fn rotated_cube_has_half_size_scale() {
        let cube = rotated_cube(Vector3::new(0.0, 0.5, -1.5), 0.33, 0.0);
        let expected = Matrix4::new_translation(&Vector3::new(0.0, 0.5, -1.5))
            * Matrix4::new_scaling(0.165);
        assert_close(&cube, &expected);
    }

    #[test]
    fn zero_velocity_has_no_arrow() {
        assert!(velocity_arrow(Vector3::zeros(), Vector3::zeros(), 0.005).is_none());
    }

    #[test]
    fn arrow_points_along_velocity() {
        let base = Vector3::new(0.0, 1.0, 0.0);
        let arrow = velocity_arrow(base, Vector3::new(2.0, 0.0, 0.0), 0.01).unwrap();

        let center = arrow * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let tip = arrow * Vector4::new(0.0, 0.0, -1.0, 1.0);
        // the block is speed / 2 long and starts at the base
        assert!((center.xyz() - Vector3::new(0.5, 1.0, 0.0)).norm() < EPSILON);
        // local -z is stretched by speed / 2 and turned onto +x
        assert!((tip.xyz() - Vector3::new(1.5, 1.0, 0.0)).norm() < EPSILON);
    }

    #[test]
    fn vertical_arrow_is_finite() {
        let arrow = velocity_arrow(Vector3::zeros(), Vector3::new(0.0, 1.0, 0.0), 0.01).unwrap();
        assert!(arrow.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn cube_rotation_is_whole_degrees() {
        assert_eq!(cube_rotation_degrees(0, 0.25), 0.0);
        // 1 s at a quarter turn per second
        assert_eq!(cube_rotation_degrees(1_000_000_000, 0.25), 90.0);
        // wraps after 4 s, truncated toward zero
        assert_eq!(cube_rotation_degrees(4_500_000_000, 0.25), 45.0);
        assert_eq!(cube_rotation_degrees(1_005_000_000, 0.25), 90.0);
    }
}
