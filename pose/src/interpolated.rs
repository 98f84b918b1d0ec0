use crate::Pose;

/// Drives a [`Pose`] smoothly toward a moving target instead of snapping to
/// it every time a new network update arrives.
///
/// Invariant: `start.t <= end.t` always holds after construction and after
/// every `set_target` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatedPose {
    start: Pose,
    current: Pose,
    end: Pose,
}

impl InterpolatedPose {
    pub fn new(initial: Pose) -> Self {
        Self {
            start: initial,
            current: initial,
            end: initial,
        }
    }

    pub fn current(&self) -> &Pose {
        &self.current
    }

    /// Sets a new interpolation target reached at `t + dt`.
    ///
    /// If `dt <= 0` the new pose is applied immediately (both `start` and
    /// `current` snap to it). Otherwise the *currently interpolated* pose
    /// (not the previous `end`) becomes the new `start`, so a target that
    /// arrives mid-transition blends continuously rather than jumping back
    /// to wherever the last update left off.
    pub fn set_target(&mut self, target: Pose, t: f64, dt: f64) {
        if dt <= 0.0 {
            let mut snapped = target;
            snapped.t = t;
            self.start = snapped;
            self.current = snapped;
            self.end = snapped;
            return;
        }

        self.current.interpolate(&self.start, &self.end, t);
        self.start = self.current;
        self.start.t = t;

        let mut end = target;
        end.t = t + dt;
        self.end = end;
    }

    /// Advances `current` to time `t`, clamped to `[start.t, end.t]`.
    pub fn update(&mut self, t: f64) {
        let clamped = t.clamp(self.start.t, self.end.t);
        self.current.interpolate(&self.start, &self.end, clamped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector3;

    fn pose_at(t: f64, x: f64) -> Pose {
        Pose::new(
            t,
            Vector3::new(x, 0.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn immediate_snap_when_dt_not_positive() {
        let mut ip = InterpolatedPose::new(pose_at(0.0, 0.0));
        ip.set_target(pose_at(0.0, 9.0), 1.0, 0.0);
        assert_eq!(ip.current().p.x, 9.0);
        assert_eq!(ip.current().t, 1.0);
    }

    #[test]
    fn update_blends_linearly_over_dt() {
        let mut ip = InterpolatedPose::new(pose_at(0.0, 0.0));
        ip.set_target(pose_at(0.0, 10.0), 0.0, 2.0);
        ip.update(1.0);
        assert!((ip.current().p.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn update_clamps_past_end() {
        let mut ip = InterpolatedPose::new(pose_at(0.0, 0.0));
        ip.set_target(pose_at(0.0, 10.0), 0.0, 2.0);
        ip.update(100.0);
        assert_eq!(ip.current().p.x, 10.0);
    }

    #[test]
    fn retarget_mid_transition_starts_from_current_not_previous_end() {
        let mut ip = InterpolatedPose::new(pose_at(0.0, 0.0));
        ip.set_target(pose_at(0.0, 10.0), 0.0, 2.0);
        ip.update(1.0);
        assert!((ip.current().p.x - 5.0).abs() < 1e-9);

        // Retarget halfway through the first transition.
        ip.set_target(pose_at(0.0, 20.0), 1.0, 2.0);
        // The new start should be where we actually were (x=5), not the
        // abandoned end (x=10).
        assert!((ip.start.p.x - 5.0).abs() < 1e-9);

        ip.update(2.0);
        assert!((ip.current().p.x - 12.5).abs() < 1e-9);
    }
}
