use serde::{Deserialize, Serialize};
use wedge::{Point3, PositionedSolid};

/// Longest frame a spring integrates in one go. Longer gaps (a backgrounded tab, a debugger
/// stop) are treated as this long.
pub const MAX_FRAME_SECONDS: f64 = 0.064;
const SUBSTEP_SECONDS: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringConfig {
    pub tension: f64,
    pub friction: f64,
    pub mass: f64,
    pub precision: f64,
}

impl SpringConfig {
    pub const WOBBLY: Self = Self {
        tension: 180.0,
        friction: 12.0,
        mass: 1.0,
        precision: 0.001,
    };

    pub const STIFF: Self = Self {
        tension: 210.0,
        friction: 20.0,
        mass: 1.0,
        precision: 0.001,
    };
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::WOBBLY
    }
}

/// Damped spring easing one scalar toward its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    value: f64,
    velocity: f64,
    target: f64,
    config: SpringConfig,
}

impl Spring {
    pub fn new(value: f64, config: SpringConfig) -> Self {
        Self {
            value,
            velocity: 0.0,
            target: value,
            config,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Jumps to `value` and stops.
    pub fn snap(&mut self, value: f64) {
        self.value = value;
        self.target = value;
        self.velocity = 0.0;
    }

    pub fn is_settled(&self) -> bool {
        (self.value - self.target).abs() < self.config.precision
            && self.velocity.abs() < self.config.precision
    }

    pub fn step(&mut self, dt: f64) -> f64 {
        if self.is_settled() {
            self.snap(self.target);
            return self.value;
        }

        let dt = if dt.is_finite() {
            dt.clamp(0.0, MAX_FRAME_SECONDS)
        } else {
            0.0
        };
        let steps = (dt / SUBSTEP_SECONDS).ceil() as usize;
        if steps == 0 {
            return self.value;
        }
        let h = dt / steps as f64;
        let SpringConfig {
            tension,
            friction,
            mass,
            ..
        } = self.config;

        for _ in 0..steps {
            let force = -tension * (self.value - self.target);
            let damping = -friction * self.velocity;
            self.velocity += (force + damping) / mass * h;
            self.value += self.velocity * h;
        }

        if self.is_settled() {
            self.snap(self.target);
        }
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring3 {
    x: Spring,
    y: Spring,
    z: Spring,
}

impl Spring3 {
    pub fn new(value: Point3, config: SpringConfig) -> Self {
        Self {
            x: Spring::new(value.x, config),
            y: Spring::new(value.y, config),
            z: Spring::new(value.z, config),
        }
    }

    pub fn value(&self) -> Point3 {
        Point3::new(self.x.value(), self.y.value(), self.z.value())
    }

    pub fn set_target(&mut self, target: Point3) {
        self.x.set_target(target.x);
        self.y.set_target(target.y);
        self.z.set_target(target.z);
    }

    pub fn step(&mut self, dt: f64) -> Point3 {
        Point3::new(self.x.step(dt), self.y.step(dt), self.z.step(dt))
    }

    pub fn is_settled(&self) -> bool {
        self.x.is_settled() && self.y.is_settled() && self.z.is_settled()
    }
}

/// Animated base position and extrusion depth of one wedge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceMotion {
    position: Spring3,
    depth: Spring,
}

impl SliceMotion {
    /// Starts at rest where `solid` is placed.
    pub fn new(solid: &PositionedSolid, config: SpringConfig) -> Self {
        Self {
            position: Spring3::new(solid.base_position, config),
            depth: Spring::new(solid.extrude_depth, config),
        }
    }

    pub fn retarget(&mut self, solid: &PositionedSolid) {
        self.position.set_target(solid.base_position);
        self.depth.set_target(solid.extrude_depth);
    }

    pub fn step(&mut self, dt: f64) -> (Point3, f64) {
        (self.position.step(dt), self.depth.step(dt))
    }

    pub fn position(&self) -> Point3 {
        self.position.value()
    }

    pub fn depth(&self) -> f64 {
        self.depth.value()
    }

    pub fn is_settled(&self) -> bool {
        self.position.is_settled() && self.depth.is_settled()
    }
}

/// Spins the whole chart about the vertical axis by a fixed amount per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Turntable {
    pub rotation_y: f64,
}

impl Turntable {
    pub fn tick(&mut self, speed: f64) -> f64 {
        if speed.is_finite() {
            self.rotation_y = (self.rotation_y + speed).rem_euclid(std::f64::consts::TAU);
        }
        self.rotation_y
    }
}
