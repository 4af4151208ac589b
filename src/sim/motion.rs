use crate::settings::Settings;

pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

/// Clamp each component to [-1, 1], then scale the pair back onto the unit
/// disk. Keeps diagonal inputs from exceeding unit magnitude.
pub fn normalize_axis(ax: f64, az: f64) -> (f64, f64) {
    let ax = clamp(ax, -1.0, 1.0);
    let az = clamp(az, -1.0, 1.0);
    let mag_sq = ax * ax + az * az;
    if mag_sq <= 1.0 {
        (ax, az)
    } else {
        let mag = mag_sq.sqrt();
        (ax / mag, az / mag)
    }
}

/// Stateless movement policy for one world rectangle.
/// Velocity is boxed to max_speed per axis; position is boxed to the world
/// rectangle, and a position clamp zeroes the velocity on that axis.
/// max_accel rides along for the integrator and is not consulted here.
#[derive(Debug, Clone, Copy)]
pub struct MoveConstraints {
    pub max_speed: f64,
    pub max_accel: f64,
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
}

/// Which clamps fired during one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClampFlags {
    pub speed_clamped: bool,
    pub x_clamped: bool,
    pub z_clamped: bool,
}

/// Corrected kinematics plus the flags describing what was corrected.
#[derive(Debug, Clone, Copy)]
pub struct Corrected {
    pub x: f64,
    pub z: f64,
    pub vx: f64,
    pub vz: f64,
    pub flags: ClampFlags,
}

impl From<&Settings> for MoveConstraints {
    fn from(settings: &Settings) -> Self {
        Self {
            max_speed: settings.player_max_speed,
            max_accel: settings.player_max_accel,
            min_x: settings.world_min_x,
            max_x: settings.world_max_x,
            min_z: settings.world_min_z,
            max_z: settings.world_max_z,
        }
    }
}

impl MoveConstraints {
    pub fn apply(&self, x: f64, z: f64, vx: f64, vz: f64) -> Corrected {
        let mut flags = ClampFlags::default();
        let max_v = self.max_speed.max(0.0);
        let mut vx2 = clamp(vx, -max_v, max_v);
        let mut vz2 = clamp(vz, -max_v, max_v);
        if vx2 != vx || vz2 != vz {
            flags.speed_clamped = true;
        }
        let x2 = clamp(x, self.min_x, self.max_x);
        let z2 = clamp(z, self.min_z, self.max_z);
        if x2 != x {
            flags.x_clamped = true;
            vx2 = 0.0;
        }
        if z2 != z {
            flags.z_clamped = true;
            vz2 = 0.0;
        }
        Corrected {
            x: x2,
            z: z2,
            vx: vx2,
            vz: vz2,
            flags,
        }
    }
}
