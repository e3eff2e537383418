/// Bodies moved around by the demo, and the pose snapshots taken of them.
use std::fmt;

use dynundo_history::UndoElement;
use serde::{Deserialize, Serialize};

/// A named rigid body with a local transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub name: String,
    pub position: [f32; 3],
    /// Unit quaternion `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Body {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: [0.0; 3],
            rotation: IDENTITY,
            scale: [1.0; 3],
        }
    }

    /// Rotates the body about the vertical axis by `degrees`.
    pub fn turn(&mut self, degrees: f32) {
        let half = degrees.to_radians() / 2.0;
        let yaw = [0.0, half.sin(), 0.0, half.cos()];
        self.rotation = normalize(multiply(yaw, self.rotation));
    }
}

const IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Snapshot of a body's local transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl UndoElement for Pose {
    type Owner = Body;

    fn capture(body: &Body) -> Self {
        Self {
            position: body.position,
            rotation: body.rotation,
            scale: body.scale,
        }
    }
}

impl Pose {
    /// Pose `t` of the way from `self` to `other`.
    ///
    /// Rotation uses normalized lerp along the shorter arc.
    pub fn lerp(&self, other: &Pose, t: f32) -> Pose {
        let mut to = other.rotation;
        if dot(self.rotation, to) < 0.0 {
            to = to.map(|c| -c);
        }

        Pose {
            position: lerp3(self.position, other.position, t),
            rotation: normalize(std::array::from_fn(|i| {
                self.rotation[i] + (to[i] - self.rotation[i]) * t
            })),
            scale: lerp3(self.scale, other.scale, t),
        }
    }

    pub fn apply(&self, body: &mut Body) {
        body.position = self.position;
        body.rotation = self.rotation;
        body.scale = self.scale;
    }

    /// Rotation about the vertical axis, in degrees.
    pub fn yaw_degrees(&self) -> f32 {
        let [_, y, _, w] = self.rotation;
        (2.0 * y.atan2(w)).to_degrees()
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.position;
        write!(
            f,
            "pos=({x:.2}, {y:.2}, {z:.2}) yaw={:.1} scale={:.2}",
            self.yaw_degrees(),
            self.scale[0]
        )
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

fn dot(a: [f32; 4], b: [f32; 4]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(q: [f32; 4]) -> [f32; 4] {
    let len = dot(q, q).sqrt();
    if len <= f32::EPSILON {
        return IDENTITY;
    }
    q.map(|c| c / len)
}

/// Hamilton product `a * b`.
fn multiply(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}
