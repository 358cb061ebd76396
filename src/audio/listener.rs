//! Listener placement
//!
//! The game works in a plane: the listener faces along a heading angle in
//! the XY plane with +Z as up.

use super::backend::ListenerState;

/// Build the listener state for a heading (radians), position and velocity
pub fn listener_from_heading(
    direction: f64,
    position: [f64; 2],
    velocity: [f64; 2],
) -> ListenerState {
    let (sin, cos) = direction.sin_cos();
    ListenerState {
        orientation: [cos as f32, sin as f32, 0.0, 0.0, 0.0, 1.0],
        position: [position[0] as f32, position[1] as f32, 0.0],
        velocity: [velocity[0] as f32, velocity[1] as f32, 0.0],
    }
}
