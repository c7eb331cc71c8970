use crate::utilities::vector::Vector;

/// Scalar spring settings describing the frequency and damping of a
/// springy constraint.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SpringSettings {
    /// Target number of undamped oscillations per unit of time, scaled by
    /// 2 * PI.
    pub angular_frequency: f32,
    /// Twice the ratio of the spring's actual damping to its critical
    /// damping.
    pub twice_damping_ratio: f32,
}

impl SpringSettings {
    /// Constructs spring settings.
    ///
    /// * `frequency` — target undamped oscillations per unit of time.
    /// * `damping_ratio` — ratio of actual damping to critical damping;
    ///   0 is undamped, 1 critically damped, higher overdamped.
    pub fn new(frequency: f32, damping_ratio: f32) -> Self {
        debug_assert!(
            frequency > 0.0 && damping_ratio >= 0.0,
            "Spring settings require positive frequency and nonnegative damping ratio."
        );
        Self {
            angular_frequency: frequency * (2.0 * std::f32::consts::PI),
            twice_damping_ratio: damping_ratio * 2.0,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.angular_frequency / (2.0 * std::f32::consts::PI)
    }

    pub fn damping_ratio(&self) -> f32 {
        self.twice_damping_ratio / 2.0
    }
}

impl Default for SpringSettings {
    fn default() -> Self {
        Self::new(30.0, 1.0)
    }
}

/// Wide mirror of `SpringSettings`, aligned with execution order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SpringSettingsWide {
    pub angular_frequency: Vector<f32>,
    pub twice_damping_ratio: Vector<f32>,
}

impl SpringSettingsWide {
    #[inline(always)]
    pub fn write_slot(&mut self, source: &SpringSettings, slot_index: usize) {
        self.angular_frequency.as_mut_array()[slot_index] = source.angular_frequency;
        self.twice_damping_ratio.as_mut_array()[slot_index] = source.twice_damping_ratio;
    }

    /// Maps spring settings and a timestep onto the implicit damped-spring
    /// solver terms: position error feedback, the scale applied to the
    /// effective mass, and the softness scale applied to accumulated
    /// impulses.
    #[inline(always)]
    pub fn compute_springiness(
        settings: &SpringSettingsWide,
        dt: f32,
    ) -> (Vector<f32>, Vector<f32>, Vector<f32>) {
        let one = Vector::splat(1.0);
        let dt_wide = Vector::splat(dt);
        let angular_frequency_dt = settings.angular_frequency * dt_wide;
        let position_error_to_velocity =
            settings.angular_frequency / (angular_frequency_dt + settings.twice_damping_ratio);
        let extra =
            one / (angular_frequency_dt * (angular_frequency_dt + settings.twice_damping_ratio));
        let effective_mass_cfm_scale = one / (one + extra);
        let softness_impulse_scale = extra * effective_mass_cfm_scale;
        (
            position_error_to_velocity,
            effective_mass_cfm_scale,
            softness_impulse_scale,
        )
    }
}
