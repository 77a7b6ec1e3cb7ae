use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::{MechanicalSystem, Steppable};

/// Forward Euler: positions and velocities both advance with the rates
/// evaluated at the start of the step.
///
/// Only conditionally stable for the stiff tire-slip coupling; low-inertia
/// wheels are the first to oscillate at coarse steps.
pub struct ExplicitEuler {
    acc: Vec<f64>,
    rates: Vec<f64>,
}

impl ExplicitEuler {
    pub fn new(position_dim: usize, velocity_dim: usize) -> Self {
        Self {
            acc: vec![0.0; velocity_dim],
            rates: vec![0.0; position_dim],
        }
    }
}

impl Steppable for ExplicitEuler {
    fn step<M: MechanicalSystem>(
        &mut self,
        system: &M,
        t: &mut f64,
        q: &mut [f64],
        v: &mut [f64],
        dt: f64,
    ) -> Result<M::Report> {
        let report = system.accelerations(*t, q, v, &mut self.acc)?;
        system.position_rates(q, v, &mut self.rates);

        for i in 0..v.len() {
            v[i] += self.acc[i] * dt;
        }
        for i in 0..q.len() {
            q[i] += self.rates[i] * dt;
        }

        *t += dt;
        Ok(report)
    }
}

/// Velocities by forward Euler, then positions from the updated velocities.
///
/// Accelerations still come from the start-of-step state, so the velocity
/// update has the same stability limit as `ExplicitEuler`.
pub struct SemiImplicitEuler {
    acc: Vec<f64>,
    rates: Vec<f64>,
}

impl SemiImplicitEuler {
    pub fn new(position_dim: usize, velocity_dim: usize) -> Self {
        Self {
            acc: vec![0.0; velocity_dim],
            rates: vec![0.0; position_dim],
        }
    }
}

impl Steppable for SemiImplicitEuler {
    fn step<M: MechanicalSystem>(
        &mut self,
        system: &M,
        t: &mut f64,
        q: &mut [f64],
        v: &mut [f64],
        dt: f64,
    ) -> Result<M::Report> {
        let report = system.accelerations(*t, q, v, &mut self.acc)?;

        for i in 0..v.len() {
            v[i] += self.acc[i] * dt;
        }

        system.position_rates(q, v, &mut self.rates);
        for i in 0..q.len() {
            q[i] += self.rates[i] * dt;
        }

        *t += dt;
        Ok(report)
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct Rk4 {
    kq: [Vec<f64>; 4],
    kv: [Vec<f64>; 4],
    tmp_q: Vec<f64>,
    tmp_v: Vec<f64>,
}

impl Rk4 {
    pub fn new(position_dim: usize, velocity_dim: usize) -> Self {
        let q = vec![0.0; position_dim];
        let v = vec![0.0; velocity_dim];
        Self {
            kq: [q.clone(), q.clone(), q.clone(), q.clone()],
            kv: [v.clone(), v.clone(), v.clone(), v.clone()],
            tmp_q: q,
            tmp_v: v,
        }
    }

    fn stage<M: MechanicalSystem>(
        &mut self,
        system: &M,
        k: usize,
        t: f64,
        q: &[f64],
        v: &[f64],
        scale: f64,
    ) -> Result<M::Report> {
        // tmp = y + scale * k_{k-1}
        for i in 0..q.len() {
            self.tmp_q[i] = q[i] + scale * self.kq[k - 1][i];
        }
        for i in 0..v.len() {
            self.tmp_v[i] = v[i] + scale * self.kv[k - 1][i];
        }
        let report = system.accelerations(t, &self.tmp_q, &self.tmp_v, &mut self.kv[k])?;
        system.position_rates(&self.tmp_q, &self.tmp_v, &mut self.kq[k]);
        Ok(report)
    }
}

impl Steppable for Rk4 {
    fn step<M: MechanicalSystem>(
        &mut self,
        system: &M,
        t: &mut f64,
        q: &mut [f64],
        v: &mut [f64],
        dt: f64,
    ) -> Result<M::Report> {
        let half = 0.5 * dt;
        let t0 = *t;

        // k1 = f(t, y)
        let report = system.accelerations(t0, q, v, &mut self.kv[0])?;
        system.position_rates(q, v, &mut self.kq[0]);

        // k2 = f(t + dt/2, y + dt*k1/2)
        self.stage(system, 1, t0 + half, q, v, half)?;
        // k3 = f(t + dt/2, y + dt*k2/2)
        self.stage(system, 2, t0 + half, q, v, half)?;
        // k4 = f(t + dt, y + dt*k3)
        self.stage(system, 3, t0 + dt, q, v, dt)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        let sixth = dt / 6.0;
        for i in 0..q.len() {
            q[i] += sixth * (self.kq[0][i] + 2.0 * self.kq[1][i] + 2.0 * self.kq[2][i] + self.kq[3][i]);
        }
        for i in 0..v.len() {
            v[i] += sixth * (self.kv[0][i] + 2.0 * self.kv[1][i] + 2.0 * self.kv[2][i] + self.kv[3][i]);
        }

        *t = t0 + dt;
        Ok(report)
    }
}

/// Selectable integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    ExplicitEuler,
    #[default]
    SemiImplicitEuler,
    Rk4,
}

impl IntegrationScheme {
    pub fn build(self, position_dim: usize, velocity_dim: usize) -> Integrator {
        match self {
            IntegrationScheme::ExplicitEuler => {
                Integrator::ExplicitEuler(ExplicitEuler::new(position_dim, velocity_dim))
            }
            IntegrationScheme::SemiImplicitEuler => {
                Integrator::SemiImplicitEuler(SemiImplicitEuler::new(position_dim, velocity_dim))
            }
            IntegrationScheme::Rk4 => Integrator::Rk4(Rk4::new(position_dim, velocity_dim)),
        }
    }
}

/// A built stepper for one of the `IntegrationScheme`s.
pub enum Integrator {
    ExplicitEuler(ExplicitEuler),
    SemiImplicitEuler(SemiImplicitEuler),
    Rk4(Rk4),
}

impl Integrator {
    pub fn scheme(&self) -> IntegrationScheme {
        match self {
            Integrator::ExplicitEuler(_) => IntegrationScheme::ExplicitEuler,
            Integrator::SemiImplicitEuler(_) => IntegrationScheme::SemiImplicitEuler,
            Integrator::Rk4(_) => IntegrationScheme::Rk4,
        }
    }
}

impl Steppable for Integrator {
    fn step<M: MechanicalSystem>(
        &mut self,
        system: &M,
        t: &mut f64,
        q: &mut [f64],
        v: &mut [f64],
        dt: f64,
    ) -> Result<M::Report> {
        match self {
            Integrator::ExplicitEuler(s) => s.step(system, t, q, v, dt),
            Integrator::SemiImplicitEuler(s) => s.step(system, t, q, v, dt),
            Integrator::Rk4(s) => s.step(system, t, q, v, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::assert_relative_eq;

    /// Point mass under constant acceleration.
    struct Falling {
        g: f64,
    }

    impl MechanicalSystem for Falling {
        type Report = f64;

        fn position_dim(&self) -> usize {
            1
        }

        fn velocity_dim(&self) -> usize {
            1
        }

        fn accelerations(&self, _t: f64, _q: &[f64], _v: &[f64], out: &mut [f64]) -> Result<f64> {
            out[0] = self.g;
            Ok(self.g)
        }

        fn position_rates(&self, _q: &[f64], v: &[f64], out: &mut [f64]) {
            out[0] = v[0];
        }
    }

    /// Unit harmonic oscillator.
    struct Spring;

    impl MechanicalSystem for Spring {
        type Report = ();

        fn position_dim(&self) -> usize {
            1
        }

        fn velocity_dim(&self) -> usize {
            1
        }

        fn accelerations(&self, _t: f64, q: &[f64], _v: &[f64], out: &mut [f64]) -> Result<()> {
            out[0] = -q[0];
            Ok(())
        }

        fn position_rates(&self, _q: &[f64], v: &[f64], out: &mut [f64]) {
            out[0] = v[0];
        }
    }

    struct Broken;

    impl MechanicalSystem for Broken {
        type Report = ();

        fn position_dim(&self) -> usize {
            1
        }

        fn velocity_dim(&self) -> usize {
            1
        }

        fn accelerations(&self, _t: f64, _q: &[f64], _v: &[f64], _out: &mut [f64]) -> Result<()> {
            Err(Error::SingularSystem {
                condition: f64::INFINITY,
                threshold: 1e12,
            })
        }

        fn position_rates(&self, _q: &[f64], v: &[f64], out: &mut [f64]) {
            out[0] = v[0];
        }
    }

    fn run(scheme: IntegrationScheme, system: &impl MechanicalSystem, q0: f64, steps: usize, dt: f64) -> (f64, f64, f64) {
        let mut stepper = scheme.build(1, 1);
        let (mut t, mut q, mut v) = (0.0, [q0], [0.0]);
        for _ in 0..steps {
            stepper.step(system, &mut t, &mut q, &mut v, dt).unwrap();
        }
        (t, q[0], v[0])
    }

    #[test]
    fn euler_variants_differ_only_in_position_update() {
        let system = Falling { g: 2.0 };
        let (n, dt) = (10usize, 0.1);

        let (t, q, v) = run(IntegrationScheme::ExplicitEuler, &system, 0.0, n, dt);
        assert_relative_eq!(t, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        assert_relative_eq!(q, 2.0 * dt * dt * (n * (n - 1) / 2) as f64, epsilon = 1e-12);

        let (_, q, v) = run(IntegrationScheme::SemiImplicitEuler, &system, 0.0, n, dt);
        assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        assert_relative_eq!(q, 2.0 * dt * dt * (n * (n + 1) / 2) as f64, epsilon = 1e-12);
    }

    #[test]
    fn rk4_is_exact_for_constant_acceleration() {
        let (_, q, v) = run(IntegrationScheme::Rk4, &Falling { g: 2.0 }, 0.0, 10, 0.1);
        assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        assert_relative_eq!(q, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rk4_tracks_oscillator() {
        let steps = 1000;
        let dt = 2.0 * std::f64::consts::PI / steps as f64;
        let (_, q, v) = run(IntegrationScheme::Rk4, &Spring, 1.0, steps, dt);
        assert!((q - 1.0).abs() < 1e-8);
        assert!(v.abs() < 1e-8);
    }

    #[test]
    fn explicit_euler_gains_energy_on_oscillator() {
        let (_, q, v) = run(IntegrationScheme::ExplicitEuler, &Spring, 1.0, 1000, 0.05);
        assert!(q * q + v * v > 2.0);

        let (_, q, v) = run(IntegrationScheme::SemiImplicitEuler, &Spring, 1.0, 1000, 0.05);
        assert!(q * q + v * v < 1.1);
    }

    #[test]
    fn step_reports_start_of_step_evaluation() {
        let mut stepper = IntegrationScheme::Rk4.build(1, 1);
        let (mut t, mut q, mut v) = (0.0, [0.0], [0.0]);
        let report = stepper
            .step(&Falling { g: -9.81 }, &mut t, &mut q, &mut v, 0.01)
            .unwrap();
        assert_eq!(report, -9.81);
        assert_eq!(stepper.scheme(), IntegrationScheme::Rk4);
    }

    #[test]
    fn failed_evaluation_leaves_state_untouched() {
        for scheme in [
            IntegrationScheme::ExplicitEuler,
            IntegrationScheme::SemiImplicitEuler,
            IntegrationScheme::Rk4,
        ] {
            let mut stepper = scheme.build(1, 1);
            let (mut t, mut q, mut v) = (0.0, [1.0], [2.0]);
            let result = stepper.step(&Broken, &mut t, &mut q, &mut v, 0.1);
            assert!(matches!(result, Err(Error::SingularSystem { .. })));
            assert_eq!((t, q[0], v[0]), (0.0, 1.0, 2.0));
        }
    }
}
