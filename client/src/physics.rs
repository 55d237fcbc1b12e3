//! Position integration and collision handling.
//!
//! The arithmetic here mirrors the server's simulation; in particular the
//! pre-offset both bodies receive in [`check_hit`] is part of the agreed
//! collision thresholds and must not be simplified away.

use crate::entity::{PodState, Position, Vector};

/// Advances a pod by its velocity, wrapping around the arena edges.
///
/// The arena is toroidal: leaving through one side re-enters through the
/// opposite side, offset by however far the pod overshot.
pub fn integrate(state: &mut PodState, arena_l: f64, arena_h: f64) {
    let Some(position) = state.position else {
        return;
    };
    state.position = Some(Position {
        x: wrap_axis(position.x + state.vector.x, arena_l),
        y: wrap_axis(position.y + state.vector.y, arena_h),
    });
}

fn wrap_axis(value: f64, extent: f64) -> f64 {
    let mut value = value;
    if value > extent {
        value = -extent + (value - extent);
    }
    if value < -extent {
        value = extent - (value + extent);
    }
    value
}

/// Tests whether two circular bodies touch.
///
/// Each center is first shifted by its own full side length; the shifted
/// centers are then compared against the sum of the half sides.
pub fn check_hit(x1: f64, y1: f64, side1: f64, x2: f64, y2: f64, side2: f64) -> bool {
    let x1 = x1 - side1;
    let y1 = y1 - side1;
    let x2 = x2 - side2;
    let y2 = y2 - side2;

    let distance = (x1 - x2) * (x1 - x2) + (y1 - y2) * (y1 - y2);
    distance <= (side1 / 2.0 + side2 / 2.0) * (side1 / 2.0 + side2 / 2.0)
}

/// Resolves a collision between two equal-mass pods.
///
/// The velocities exchange their components along the line of centers and
/// keep their tangential components; the second pod is then pushed out to
/// exact tangency along that line.
pub fn resolve_pod_collision(first: &mut PodState, second: &mut PodState, pod_side: f64) {
    let (Some(p1), Some(p2)) = (first.position, second.position) else {
        return;
    };

    let r1 = pod_side / 2.0;
    let r2 = pod_side / 2.0;

    let nx = (p2.x - p1.x) / (r1 + r2);
    let ny = (p2.y - p1.y) / (r1 + r2);
    let gx = -ny;
    let gy = nx;

    let v1n = nx * first.vector.x + ny * first.vector.y;
    let v1g = gx * first.vector.x + gy * first.vector.y;
    let v2n = nx * second.vector.x + ny * second.vector.y;
    let v2g = gx * second.vector.x + gy * second.vector.y;

    let d = ((p1.x - p2.x) * (p1.x - p2.x) + (p1.y - p2.y) * (p1.y - p2.y)).sqrt();
    if d == 0.0 {
        // Coincident centers have no usable normal.
        return;
    }

    first.vector = Vector {
        x: nx * v2n + gx * v1g,
        y: ny * v2n + gy * v1g,
    };
    second.vector = Vector {
        x: nx * v1n + gx * v2g,
        y: ny * v1n + gy * v2g,
    };

    second.position = Some(Position {
        x: p1.x + (r1 + r2) * (p2.x - p1.x) / d,
        y: p1.y + (r1 + r2) * (p2.y - p1.y) / d,
    });
}

/// Resolves a collision between a pod and an immovable obstacle.
///
/// The pod's velocity is reflected about the contact normal and the pod is
/// pushed back to the combined radius so it cannot stay embedded.
pub fn resolve_obstacle_collision(
    pod: &mut PodState,
    obstacle_x: f64,
    obstacle_y: f64,
    pod_side: f64,
    asteroid_side: f64,
) {
    let Some(position) = pod.position else {
        return;
    };

    let pod_radius = pod_side / 2.0;
    let obstacle_radius = asteroid_side / 2.0;

    let nx = (position.x - obstacle_x) / (obstacle_radius + pod_radius);
    let ny = (position.y - obstacle_y) / (obstacle_radius + pod_radius);
    let along_normal = pod.vector.x * nx + pod.vector.y * ny;

    let d = ((obstacle_x - position.x) * (obstacle_x - position.x)
        + (obstacle_y - position.y) * (obstacle_y - position.y))
        .sqrt();
    if d == 0.0 {
        return;
    }

    pod.vector = Vector {
        x: pod.vector.x - 2.0 * along_normal * nx,
        y: pod.vector.y - 2.0 * along_normal * ny,
    };
    pod.position = Some(Position {
        x: obstacle_x + (obstacle_radius + pod_radius) * (position.x - obstacle_x) / d,
        y: obstacle_y + (obstacle_radius + pod_radius) * (position.y - obstacle_y) / d,
    });
}
