use pose::{Pose, Vector3};

/// Head-tracking end of the audio graph. Every [`crate::Spatializer`] reads
/// the listener's current pose to compute a source's position relative to
/// the ears.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pose: Pose,
}

impl Listener {
    pub fn new() -> Self {
        Self {
            pose: Pose::identity(),
        }
    }

    pub fn update(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Orthonormal (forward, up, right) basis, right-handed: `right = forward x up`.
    pub fn basis(&self) -> (Vector3, Vector3, Vector3) {
        let forward = self.pose.f.normalize();
        let up = self.pose.u.normalize();
        let right = forward.cross(&up).normalize();
        (forward, up, right)
    }

    /// Source position expressed in the listener's local frame: `(right, up, -forward)`.
    pub fn relative(&self, source_position: &Vector3) -> Vector3 {
        let (forward, up, right) = self.basis();
        let delta = source_position.sub(&self.pose.p);
        Vector3::new(delta.dot(&right), delta.dot(&up), -delta.dot(&forward))
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_position_directly_ahead_has_zero_lateral_component() {
        let mut listener = Listener::new();
        listener.update(Pose::identity());
        let rel = listener.relative(&Vector3::new(0.0, 0.0, -5.0));
        assert!(rel.x.abs() < 1e-9);
        assert!(rel.z < 0.0, "source ahead should be negative z in local frame");
    }
}
