use std::fmt;

/// Clamps one axis value to `[-limit, limit]`.
pub fn clamp_axis(v: i32, limit: i32) -> i32 {
    let limit = limit.abs();
    v.clamp(-limit, limit)
}

/// Unbounded axis values as computed by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawAxes {
    pub left_right: i32,
    pub forward_backward: i32,
    pub up_down: i32,
    pub yaw: i32,
}

impl RawAxes {
    /// The only way to get a [`VelocityCommand`] with motion in it.
    pub fn limit(self, limit: i32) -> VelocityCommand {
        VelocityCommand {
            left_right: clamp_axis(self.left_right, limit),
            forward_backward: clamp_axis(self.forward_backward, limit),
            up_down: clamp_axis(self.up_down, limit),
            yaw: clamp_axis(self.yaw, limit),
        }
    }
}

/// Clamped `rc` command, rendered as `rc <lr> <fb> <ud> <yaw>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VelocityCommand {
    left_right: i32,
    forward_backward: i32,
    up_down: i32,
    yaw: i32,
}

impl VelocityCommand {
    /// All-zero command, keeps the vehicle in place.
    pub fn hold() -> Self {
        Self::default()
    }

    pub fn is_hold(&self) -> bool {
        *self == Self::hold()
    }

    pub fn left_right(&self) -> i32 {
        self.left_right
    }

    pub fn forward_backward(&self) -> i32 {
        self.forward_backward
    }

    pub fn up_down(&self) -> i32 {
        self.up_down
    }

    pub fn yaw(&self) -> i32 {
        self.yaw
    }
}

impl fmt::Display for VelocityCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rc {} {} {} {}",
            self.left_right, self.forward_backward, self.up_down, self.yaw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_axis() {
        let limit = 30;
        for v in -limit..=limit {
            assert_eq!(clamp_axis(v, limit), v);
            assert_eq!(clamp_axis(clamp_axis(v, limit), limit), v);
        }
        assert_eq!(clamp_axis(limit + 1, limit), limit);
        assert_eq!(clamp_axis(-limit - 1, limit), -limit);
        assert_eq!(clamp_axis(i32::MAX, limit), limit);
        assert_eq!(clamp_axis(i32::MIN, limit), -limit);
    }

    #[test]
    fn test_each_axis_limited_independently() {
        let raw = RawAxes {
            left_right: 100,
            forward_backward: -5,
            up_down: -41,
            yaw: 40,
        };
        let cmd = raw.limit(40);
        assert_eq!(cmd.to_string(), "rc 40 -5 -40 40");
    }

    #[test]
    fn test_hold() {
        assert_eq!(VelocityCommand::hold().to_string(), "rc 0 0 0 0");
        assert!(RawAxes::default().limit(30).is_hold());
    }
}
