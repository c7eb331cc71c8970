//! Bundle storage for each constraint type and the type-id dispatch that
//! the solver and narrow phase drive. Constraint data lives in typed
//! structure-of-arrays bundles; dispatch is a match on the type id, never a
//! virtual call.

use crate::physics::bodies::{SolverBodyView, NO_BODY};
use crate::physics::body_properties::BodyVelocityWide;
use crate::physics::constraints::contact_constraint::{
    ContactConstraintDescription, ContactConstraintFunctions, ContactImpulsesWide,
    ContactPrestepWide, ContactProjectionWide,
};
use crate::physics::constraints::volume_constraint::{
    VolumeConstraintDescription, VolumeConstraintFunctions, VolumePrestepWide,
    VolumeProjectionWide,
};
use crate::physics::handles::ConstraintHandle;
use crate::physics::sequential_fallback_batch::JacobiDeltas;
use crate::utilities::bundle_indexing::BundleIndexing;
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Contact constraint type ids are the contact count minus one.
pub const CONTACT1_TYPE_ID: u32 = 0;
pub const CONTACT2_TYPE_ID: u32 = 1;
pub const CONTACT3_TYPE_ID: u32 = 2;
pub const CONTACT4_TYPE_ID: u32 = 3;
pub const VOLUME_TYPE_ID: u32 = 4;
/// Number of registered constraint type ids.
pub const CONSTRAINT_TYPE_COUNT: usize = 5;

#[inline(always)]
pub fn contact_type_id(contact_count: u32) -> u32 {
    debug_assert!(contact_count >= 1 && contact_count <= 4);
    contact_count - 1
}

/// Body references for a bundle of two-body constraints. Unoccupied lanes
/// hold `NO_BODY`, which gathers zero inertia and is skipped on scatter.
#[derive(Clone, Copy, Debug)]
pub struct TwoBodyReferencesWide {
    pub index_a: Vector<i32>,
    pub index_b: Vector<i32>,
}

impl TwoBodyReferencesWide {
    pub fn empty() -> Self {
        Self {
            index_a: Vector::splat(NO_BODY),
            index_b: Vector::splat(NO_BODY),
        }
    }
}

/// Body references for a bundle of four-body constraints.
#[derive(Clone, Copy, Debug)]
pub struct FourBodyReferencesWide {
    pub index_a: Vector<i32>,
    pub index_b: Vector<i32>,
    pub index_c: Vector<i32>,
    pub index_d: Vector<i32>,
}

impl FourBodyReferencesWide {
    pub fn empty() -> Self {
        Self {
            index_a: Vector::splat(NO_BODY),
            index_b: Vector::splat(NO_BODY),
            index_c: Vector::splat(NO_BODY),
            index_d: Vector::splat(NO_BODY),
        }
    }
}

#[inline(always)]
fn copy_lane_f32(source: &Vector<f32>, source_slot: usize, target: &mut Vector<f32>, target_slot: usize) {
    let value = source.as_array()[source_slot];
    target.as_mut_array()[target_slot] = value;
}

#[inline(always)]
fn copy_lane_i32(source: &Vector<i32>, source_slot: usize, target: &mut Vector<i32>, target_slot: usize) {
    let value = source.as_array()[source_slot];
    target.as_mut_array()[target_slot] = value;
}

#[inline(always)]
fn copy_lane_v3(source: &Vector3Wide, source_slot: usize, target: &mut Vector3Wide, target_slot: usize) {
    let value = source.read_slot(source_slot);
    target.write_slot(value, target_slot);
}

/// Bundle storage for two-body contact constraints with N contacts.
pub struct ContactTypeBatch<const N: usize> {
    pub body_references: Vec<TwoBodyReferencesWide>,
    pub prestep: Vec<ContactPrestepWide<N>>,
    pub projection: Vec<ContactProjectionWide<N>>,
    pub impulses: Vec<ContactImpulsesWide<N>>,
    pub index_to_handle: Vec<ConstraintHandle>,
}

impl<const N: usize> ContactTypeBatch<N> {
    fn new() -> Self {
        Self {
            body_references: Vec::new(),
            prestep: Vec::new(),
            projection: Vec::new(),
            impulses: Vec::new(),
            index_to_handle: Vec::new(),
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.index_to_handle.len()
    }

    pub fn bundle_count(&self) -> usize {
        BundleIndexing::get_bundle_count(self.constraint_count())
    }

    /// Allocates a constraint slot, writing the description and the warm
    /// start impulses carried over from the pair's previous life.
    pub fn allocate(
        &mut self,
        handle: ConstraintHandle,
        body_a: i32,
        body_b: i32,
        description: &ContactConstraintDescription<N>,
        initial_impulses: &[f32; N],
    ) -> usize {
        let index = self.constraint_count();
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        if bundle == self.body_references.len() {
            self.body_references.push(TwoBodyReferencesWide::empty());
            self.prestep.push(ContactPrestepWide::empty());
            self.projection.push(ContactProjectionWide::empty());
            self.impulses.push(ContactImpulsesWide::empty());
        }
        self.body_references[bundle].index_a.as_mut_array()[inner] = body_a;
        self.body_references[bundle].index_b.as_mut_array()[inner] = body_b;
        self.prestep[bundle].write_slot(description, inner);
        self.impulses[bundle].write_slot(initial_impulses, inner);
        self.index_to_handle.push(handle);
        index
    }

    pub fn apply_description(
        &mut self,
        index: usize,
        description: &ContactConstraintDescription<N>,
    ) {
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        self.prestep[bundle].write_slot(description, inner);
    }

    pub fn read_penetration_impulses(&self, index: usize) -> [f32; N] {
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        self.impulses[bundle].read_slot(inner)
    }

    /// Overwrites penetration impulses, preserving the tangent impulses.
    pub fn write_penetration_impulses(&mut self, index: usize, values: &[f32; N]) {
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        for contact in 0..N {
            self.impulses[bundle].penetration[contact].as_mut_array()[inner] = values[contact];
        }
    }

    /// Removes the constraint at `index` by pulling the last constraint
    /// into its slot. Returns the handle of the moved constraint, if any.
    pub fn remove(&mut self, index: usize) -> Option<ConstraintHandle> {
        let last = self.constraint_count() - 1;
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        let moved = if index != last {
            let (last_bundle, last_inner) = BundleIndexing::get_bundle_indices(last);
            let source_references = self.body_references[last_bundle];
            copy_lane_i32(
                &source_references.index_a,
                last_inner,
                &mut self.body_references[bundle].index_a,
                inner,
            );
            copy_lane_i32(
                &source_references.index_b,
                last_inner,
                &mut self.body_references[bundle].index_b,
                inner,
            );
            let source_prestep = self.prestep[last_bundle];
            copy_prestep_lane(&source_prestep, last_inner, &mut self.prestep[bundle], inner);
            let source_impulses = self.impulses[last_bundle];
            copy_impulses_lane(&source_impulses, last_inner, &mut self.impulses[bundle], inner);
            let moved_handle = self.index_to_handle[last];
            self.index_to_handle[index] = moved_handle;
            Some(moved_handle)
        } else {
            None
        };
        // Vacate the last lane so gathers and scatters skip it.
        let (last_bundle, last_inner) = BundleIndexing::get_bundle_indices(last);
        self.body_references[last_bundle].index_a.as_mut_array()[last_inner] = NO_BODY;
        self.body_references[last_bundle].index_b.as_mut_array()[last_inner] = NO_BODY;
        self.index_to_handle.pop();
        if BundleIndexing::get_bundle_count(self.constraint_count()) < self.body_references.len() {
            self.body_references.pop();
            self.prestep.pop();
            self.projection.pop();
            self.impulses.pop();
        }
        moved
    }

    pub fn prestep(
        &mut self,
        view: &SolverBodyView,
        dt: f32,
        inverse_dt: f32,
        start_bundle: usize,
        end_bundle: usize,
    ) {
        for bundle in start_bundle..end_bundle {
            let references = self.body_references[bundle];
            let mut position = Vector3Wide::default();
            let mut velocity = BodyVelocityWide::default();
            let mut inertia_a = Default::default();
            let mut inertia_b = Default::default();
            view.gather_state(references.index_a, &mut position, &mut velocity, &mut inertia_a);
            view.gather_state(references.index_b, &mut position, &mut velocity, &mut inertia_b);
            self.projection[bundle] = ContactConstraintFunctions::prestep(
                &self.prestep[bundle],
                inertia_a,
                inertia_b,
                dt,
                inverse_dt,
            );
        }
    }

    pub fn warm_start(&mut self, view: &SolverBodyView, start_bundle: usize, end_bundle: usize) {
        for bundle in start_bundle..end_bundle {
            let references = self.body_references[bundle];
            let mut wsv_a = BodyVelocityWide::default();
            let mut wsv_b = BodyVelocityWide::default();
            view.gather_velocities(references.index_a, &mut wsv_a);
            view.gather_velocities(references.index_b, &mut wsv_b);
            ContactConstraintFunctions::warm_start(
                &self.projection[bundle],
                &self.impulses[bundle],
                &mut wsv_a,
                &mut wsv_b,
            );
            view.scatter_velocities(references.index_a, &wsv_a);
            view.scatter_velocities(references.index_b, &wsv_b);
        }
    }

    pub fn solve(&mut self, view: &SolverBodyView, start_bundle: usize, end_bundle: usize) {
        for bundle in start_bundle..end_bundle {
            let references = self.body_references[bundle];
            let mut wsv_a = BodyVelocityWide::default();
            let mut wsv_b = BodyVelocityWide::default();
            view.gather_velocities(references.index_a, &mut wsv_a);
            view.gather_velocities(references.index_b, &mut wsv_b);
            ContactConstraintFunctions::solve(
                &self.projection[bundle],
                &mut self.impulses[bundle],
                &mut wsv_a,
                &mut wsv_b,
            );
            view.scatter_velocities(references.index_a, &wsv_a);
            view.scatter_velocities(references.index_b, &wsv_b);
        }
    }

    /// Fallback-batch warm start: accumulates velocity changes instead of
    /// scattering, since a body may appear in several lanes.
    pub fn warm_start_jacobi(&mut self, view: &SolverBodyView, deltas: &mut JacobiDeltas) {
        for bundle in 0..self.bundle_count() {
            let references = self.body_references[bundle];
            let mut wsv_a = BodyVelocityWide::default();
            let mut wsv_b = BodyVelocityWide::default();
            view.gather_velocities(references.index_a, &mut wsv_a);
            view.gather_velocities(references.index_b, &mut wsv_b);
            let before_a = wsv_a;
            let before_b = wsv_b;
            ContactConstraintFunctions::warm_start(
                &self.projection[bundle],
                &self.impulses[bundle],
                &mut wsv_a,
                &mut wsv_b,
            );
            deltas.accumulate(references.index_a, &before_a, &wsv_a);
            deltas.accumulate(references.index_b, &before_b, &wsv_b);
        }
    }

    /// Fallback-batch variant: instead of scattering, velocity changes
    /// accumulate into per-body deltas for an averaged application.
    pub fn solve_jacobi(&mut self, view: &SolverBodyView, deltas: &mut JacobiDeltas) {
        for bundle in 0..self.bundle_count() {
            let references = self.body_references[bundle];
            let mut wsv_a = BodyVelocityWide::default();
            let mut wsv_b = BodyVelocityWide::default();
            view.gather_velocities(references.index_a, &mut wsv_a);
            view.gather_velocities(references.index_b, &mut wsv_b);
            let before_a = wsv_a;
            let before_b = wsv_b;
            ContactConstraintFunctions::solve(
                &self.projection[bundle],
                &mut self.impulses[bundle],
                &mut wsv_a,
                &mut wsv_b,
            );
            deltas.accumulate(references.index_a, &before_a, &wsv_a);
            deltas.accumulate(references.index_b, &before_b, &wsv_b);
        }
    }
}

fn copy_prestep_lane<const N: usize>(
    source: &ContactPrestepWide<N>,
    source_slot: usize,
    target: &mut ContactPrestepWide<N>,
    target_slot: usize,
) {
    for contact in 0..N {
        copy_lane_v3(
            &source.offset_a[contact],
            source_slot,
            &mut target.offset_a[contact],
            target_slot,
        );
        copy_lane_f32(
            &source.depth[contact],
            source_slot,
            &mut target.depth[contact],
            target_slot,
        );
    }
    copy_lane_v3(&source.normal, source_slot, &mut target.normal, target_slot);
    copy_lane_v3(&source.offset_b, source_slot, &mut target.offset_b, target_slot);
    copy_lane_f32(
        &source.friction_coefficient,
        source_slot,
        &mut target.friction_coefficient,
        target_slot,
    );
    copy_lane_f32(
        &source.spring_settings.angular_frequency,
        source_slot,
        &mut target.spring_settings.angular_frequency,
        target_slot,
    );
    copy_lane_f32(
        &source.spring_settings.twice_damping_ratio,
        source_slot,
        &mut target.spring_settings.twice_damping_ratio,
        target_slot,
    );
    copy_lane_f32(
        &source.maximum_recovery_velocity,
        source_slot,
        &mut target.maximum_recovery_velocity,
        target_slot,
    );
}

fn copy_impulses_lane<const N: usize>(
    source: &ContactImpulsesWide<N>,
    source_slot: usize,
    target: &mut ContactImpulsesWide<N>,
    target_slot: usize,
) {
    for contact in 0..N {
        copy_lane_f32(
            &source.penetration[contact],
            source_slot,
            &mut target.penetration[contact],
            target_slot,
        );
    }
    copy_lane_f32(&source.tangent.x, source_slot, &mut target.tangent.x, target_slot);
    copy_lane_f32(&source.tangent.y, source_slot, &mut target.tangent.y, target_slot);
}

/// Bundle storage for four-body volume constraints.
pub struct VolumeTypeBatch {
    pub body_references: Vec<FourBodyReferencesWide>,
    pub prestep: Vec<VolumePrestepWide>,
    pub projection: Vec<VolumeProjectionWide>,
    pub impulses: Vec<Vector<f32>>,
    pub index_to_handle: Vec<ConstraintHandle>,
}

impl VolumeTypeBatch {
    fn new() -> Self {
        Self {
            body_references: Vec::new(),
            prestep: Vec::new(),
            projection: Vec::new(),
            impulses: Vec::new(),
            index_to_handle: Vec::new(),
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.index_to_handle.len()
    }

    pub fn bundle_count(&self) -> usize {
        BundleIndexing::get_bundle_count(self.constraint_count())
    }

    pub fn allocate(
        &mut self,
        handle: ConstraintHandle,
        bodies: [i32; 4],
        description: &VolumeConstraintDescription,
    ) -> usize {
        let index = self.constraint_count();
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        if bundle == self.body_references.len() {
            self.body_references.push(FourBodyReferencesWide::empty());
            self.prestep.push(VolumePrestepWide::empty());
            self.projection.push(empty_volume_projection());
            self.impulses.push(Vector::splat(0.0));
        }
        let references = &mut self.body_references[bundle];
        references.index_a.as_mut_array()[inner] = bodies[0];
        references.index_b.as_mut_array()[inner] = bodies[1];
        references.index_c.as_mut_array()[inner] = bodies[2];
        references.index_d.as_mut_array()[inner] = bodies[3];
        self.prestep[bundle].write_slot(description, inner);
        // Accumulated impulse starts at zero on creation; warm starting
        // takes over on subsequent frames.
        self.impulses[bundle].as_mut_array()[inner] = 0.0;
        self.index_to_handle.push(handle);
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<ConstraintHandle> {
        let last = self.constraint_count() - 1;
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        let moved = if index != last {
            let (last_bundle, last_inner) = BundleIndexing::get_bundle_indices(last);
            let source_references = self.body_references[last_bundle];
            copy_lane_i32(
                &source_references.index_a,
                last_inner,
                &mut self.body_references[bundle].index_a,
                inner,
            );
            copy_lane_i32(
                &source_references.index_b,
                last_inner,
                &mut self.body_references[bundle].index_b,
                inner,
            );
            copy_lane_i32(
                &source_references.index_c,
                last_inner,
                &mut self.body_references[bundle].index_c,
                inner,
            );
            copy_lane_i32(
                &source_references.index_d,
                last_inner,
                &mut self.body_references[bundle].index_d,
                inner,
            );
            let source_prestep = self.prestep[last_bundle];
            copy_lane_f32(
                &source_prestep.target_scaled_volume,
                last_inner,
                &mut self.prestep[bundle].target_scaled_volume,
                inner,
            );
            copy_lane_f32(
                &source_prestep.spring_settings.angular_frequency,
                last_inner,
                &mut self.prestep[bundle].spring_settings.angular_frequency,
                inner,
            );
            copy_lane_f32(
                &source_prestep.spring_settings.twice_damping_ratio,
                last_inner,
                &mut self.prestep[bundle].spring_settings.twice_damping_ratio,
                inner,
            );
            let source_impulses = self.impulses[last_bundle];
            copy_lane_f32(&source_impulses, last_inner, &mut self.impulses[bundle], inner);
            let moved_handle = self.index_to_handle[last];
            self.index_to_handle[index] = moved_handle;
            Some(moved_handle)
        } else {
            None
        };
        let (last_bundle, last_inner) = BundleIndexing::get_bundle_indices(last);
        let references = &mut self.body_references[last_bundle];
        references.index_a.as_mut_array()[last_inner] = NO_BODY;
        references.index_b.as_mut_array()[last_inner] = NO_BODY;
        references.index_c.as_mut_array()[last_inner] = NO_BODY;
        references.index_d.as_mut_array()[last_inner] = NO_BODY;
        self.index_to_handle.pop();
        if BundleIndexing::get_bundle_count(self.constraint_count()) < self.body_references.len() {
            self.body_references.pop();
            self.prestep.pop();
            self.projection.pop();
            self.impulses.pop();
        }
        moved
    }

    pub fn prestep(
        &mut self,
        view: &SolverBodyView,
        dt: f32,
        _inverse_dt: f32,
        start_bundle: usize,
        end_bundle: usize,
    ) {
        for bundle in start_bundle..end_bundle {
            let references = self.body_references[bundle];
            let mut velocity = BodyVelocityWide::default();
            let mut position_a = Vector3Wide::default();
            let mut position_b = Vector3Wide::default();
            let mut position_c = Vector3Wide::default();
            let mut position_d = Vector3Wide::default();
            let mut inertia_a = Default::default();
            let mut inertia_b = Default::default();
            let mut inertia_c = Default::default();
            let mut inertia_d = Default::default();
            view.gather_state(references.index_a, &mut position_a, &mut velocity, &mut inertia_a);
            view.gather_state(references.index_b, &mut position_b, &mut velocity, &mut inertia_b);
            view.gather_state(references.index_c, &mut position_c, &mut velocity, &mut inertia_c);
            view.gather_state(references.index_d, &mut position_d, &mut velocity, &mut inertia_d);
            self.projection[bundle] = VolumeConstraintFunctions::prestep(
                &self.prestep[bundle],
                &position_a,
                &position_b,
                &position_c,
                &position_d,
                &inertia_a,
                &inertia_b,
                &inertia_c,
                &inertia_d,
                dt,
            );
        }
    }

    pub fn warm_start(&mut self, view: &SolverBodyView, start_bundle: usize, end_bundle: usize) {
        for bundle in start_bundle..end_bundle {
            let references = self.body_references[bundle];
            let mut wsv = [BodyVelocityWide::default(); 4];
            view.gather_velocities(references.index_a, &mut wsv[0]);
            view.gather_velocities(references.index_b, &mut wsv[1]);
            view.gather_velocities(references.index_c, &mut wsv[2]);
            view.gather_velocities(references.index_d, &mut wsv[3]);
            let [ref mut a, ref mut b, ref mut c, ref mut d] = wsv;
            VolumeConstraintFunctions::warm_start(
                &self.projection[bundle],
                self.impulses[bundle],
                a,
                b,
                c,
                d,
            );
            view.scatter_velocities(references.index_a, &wsv[0]);
            view.scatter_velocities(references.index_b, &wsv[1]);
            view.scatter_velocities(references.index_c, &wsv[2]);
            view.scatter_velocities(references.index_d, &wsv[3]);
        }
    }

    pub fn solve(&mut self, view: &SolverBodyView, start_bundle: usize, end_bundle: usize) {
        for bundle in start_bundle..end_bundle {
            let references = self.body_references[bundle];
            let mut wsv = [BodyVelocityWide::default(); 4];
            view.gather_velocities(references.index_a, &mut wsv[0]);
            view.gather_velocities(references.index_b, &mut wsv[1]);
            view.gather_velocities(references.index_c, &mut wsv[2]);
            view.gather_velocities(references.index_d, &mut wsv[3]);
            let [ref mut a, ref mut b, ref mut c, ref mut d] = wsv;
            VolumeConstraintFunctions::solve(
                &self.projection[bundle],
                &mut self.impulses[bundle],
                a,
                b,
                c,
                d,
            );
            view.scatter_velocities(references.index_a, &wsv[0]);
            view.scatter_velocities(references.index_b, &wsv[1]);
            view.scatter_velocities(references.index_c, &wsv[2]);
            view.scatter_velocities(references.index_d, &wsv[3]);
        }
    }

    pub fn warm_start_jacobi(&mut self, view: &SolverBodyView, deltas: &mut JacobiDeltas) {
        for bundle in 0..self.bundle_count() {
            let references = self.body_references[bundle];
            let mut wsv = [BodyVelocityWide::default(); 4];
            view.gather_velocities(references.index_a, &mut wsv[0]);
            view.gather_velocities(references.index_b, &mut wsv[1]);
            view.gather_velocities(references.index_c, &mut wsv[2]);
            view.gather_velocities(references.index_d, &mut wsv[3]);
            let before = wsv;
            let [ref mut a, ref mut b, ref mut c, ref mut d] = wsv;
            VolumeConstraintFunctions::warm_start(
                &self.projection[bundle],
                self.impulses[bundle],
                a,
                b,
                c,
                d,
            );
            deltas.accumulate(references.index_a, &before[0], &wsv[0]);
            deltas.accumulate(references.index_b, &before[1], &wsv[1]);
            deltas.accumulate(references.index_c, &before[2], &wsv[2]);
            deltas.accumulate(references.index_d, &before[3], &wsv[3]);
        }
    }

    pub fn solve_jacobi(&mut self, view: &SolverBodyView, deltas: &mut JacobiDeltas) {
        for bundle in 0..self.bundle_count() {
            let references = self.body_references[bundle];
            let mut wsv = [BodyVelocityWide::default(); 4];
            view.gather_velocities(references.index_a, &mut wsv[0]);
            view.gather_velocities(references.index_b, &mut wsv[1]);
            view.gather_velocities(references.index_c, &mut wsv[2]);
            view.gather_velocities(references.index_d, &mut wsv[3]);
            let before = wsv;
            let [ref mut a, ref mut b, ref mut c, ref mut d] = wsv;
            VolumeConstraintFunctions::solve(
                &self.projection[bundle],
                &mut self.impulses[bundle],
                a,
                b,
                c,
                d,
            );
            deltas.accumulate(references.index_a, &before[0], &wsv[0]);
            deltas.accumulate(references.index_b, &before[1], &wsv[1]);
            deltas.accumulate(references.index_c, &before[2], &wsv[2]);
            deltas.accumulate(references.index_d, &before[3], &wsv[3]);
        }
    }
}

fn empty_volume_projection() -> VolumeProjectionWide {
    VolumeProjectionWide {
        negated_jacobian_a: Vector3Wide::default(),
        jacobian_b: Vector3Wide::default(),
        jacobian_c: Vector3Wide::default(),
        jacobian_d: Vector3Wide::default(),
        inverse_mass_a: Vector::splat(0.0),
        inverse_mass_b: Vector::splat(0.0),
        inverse_mass_c: Vector::splat(0.0),
        inverse_mass_d: Vector::splat(0.0),
        effective_mass: Vector::splat(0.0),
        bias_velocity: Vector::splat(0.0),
        softness_impulse_scale: Vector::splat(0.0),
    }
}

/// One constraint type's storage within a constraint batch.
pub enum TypeBatch {
    Contact1(ContactTypeBatch<1>),
    Contact2(ContactTypeBatch<2>),
    Contact3(ContactTypeBatch<3>),
    Contact4(ContactTypeBatch<4>),
    Volume(VolumeTypeBatch),
}

macro_rules! with_batch {
    ($self:expr, $batch:ident => $body:expr) => {
        match $self {
            TypeBatch::Contact1($batch) => $body,
            TypeBatch::Contact2($batch) => $body,
            TypeBatch::Contact3($batch) => $body,
            TypeBatch::Contact4($batch) => $body,
            TypeBatch::Volume($batch) => $body,
        }
    };
}

impl TypeBatch {
    pub fn new_for_type(type_id: u32) -> Self {
        match type_id {
            CONTACT1_TYPE_ID => TypeBatch::Contact1(ContactTypeBatch::new()),
            CONTACT2_TYPE_ID => TypeBatch::Contact2(ContactTypeBatch::new()),
            CONTACT3_TYPE_ID => TypeBatch::Contact3(ContactTypeBatch::new()),
            CONTACT4_TYPE_ID => TypeBatch::Contact4(ContactTypeBatch::new()),
            VOLUME_TYPE_ID => TypeBatch::Volume(VolumeTypeBatch::new()),
            _ => unreachable!("unregistered constraint type id"),
        }
    }

    pub fn type_id(&self) -> u32 {
        match self {
            TypeBatch::Contact1(_) => CONTACT1_TYPE_ID,
            TypeBatch::Contact2(_) => CONTACT2_TYPE_ID,
            TypeBatch::Contact3(_) => CONTACT3_TYPE_ID,
            TypeBatch::Contact4(_) => CONTACT4_TYPE_ID,
            TypeBatch::Volume(_) => VOLUME_TYPE_ID,
        }
    }

    pub fn constraint_count(&self) -> usize {
        with_batch!(self, batch => batch.constraint_count())
    }

    pub fn bundle_count(&self) -> usize {
        with_batch!(self, batch => batch.bundle_count())
    }

    /// Collects the encoded body references of a constraint.
    pub fn encoded_body_indices(&self, index: usize, indices: &mut Vec<i32>) {
        let (bundle, inner) = BundleIndexing::get_bundle_indices(index);
        match self {
            TypeBatch::Contact1(batch) => {
                collect_two_body(&batch.body_references[bundle], inner, indices)
            }
            TypeBatch::Contact2(batch) => {
                collect_two_body(&batch.body_references[bundle], inner, indices)
            }
            TypeBatch::Contact3(batch) => {
                collect_two_body(&batch.body_references[bundle], inner, indices)
            }
            TypeBatch::Contact4(batch) => {
                collect_two_body(&batch.body_references[bundle], inner, indices)
            }
            TypeBatch::Volume(batch) => {
                let references = &batch.body_references[bundle];
                for lane in [
                    references.index_a,
                    references.index_b,
                    references.index_c,
                    references.index_d,
                ] {
                    let body = lane.as_array()[inner];
                    if body != NO_BODY {
                        indices.push(body);
                    }
                }
            }
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<ConstraintHandle> {
        with_batch!(self, batch => batch.remove(index))
    }

    pub fn prestep(
        &mut self,
        view: &SolverBodyView,
        dt: f32,
        inverse_dt: f32,
        start_bundle: usize,
        end_bundle: usize,
    ) {
        with_batch!(self, batch => batch.prestep(view, dt, inverse_dt, start_bundle, end_bundle))
    }

    pub fn warm_start(&mut self, view: &SolverBodyView, start_bundle: usize, end_bundle: usize) {
        with_batch!(self, batch => batch.warm_start(view, start_bundle, end_bundle))
    }

    pub fn solve(&mut self, view: &SolverBodyView, start_bundle: usize, end_bundle: usize) {
        with_batch!(self, batch => batch.solve(view, start_bundle, end_bundle))
    }

    pub fn warm_start_jacobi(&mut self, view: &SolverBodyView, deltas: &mut JacobiDeltas) {
        with_batch!(self, batch => batch.warm_start_jacobi(view, deltas))
    }

    pub fn solve_jacobi(&mut self, view: &SolverBodyView, deltas: &mut JacobiDeltas) {
        with_batch!(self, batch => batch.solve_jacobi(view, deltas))
    }
}

/// Maps a contact count to its `TypeBatch` variant, so callers generic
/// over the contact count can reach the concrete storage.
pub trait ContactTypeSlot<const N: usize> {
    const TYPE_ID: u32;
    fn get(batch: &TypeBatch) -> &ContactTypeBatch<N>;
    fn get_mut(batch: &mut TypeBatch) -> &mut ContactTypeBatch<N>;
}

/// Carrier for `ContactTypeSlot` implementations.
pub struct ContactTypes;

macro_rules! contact_type_slot {
    ($count:literal, $type_id:expr, $variant:ident) => {
        impl ContactTypeSlot<$count> for ContactTypes {
            const TYPE_ID: u32 = $type_id;

            fn get(batch: &TypeBatch) -> &ContactTypeBatch<$count> {
                match batch {
                    TypeBatch::$variant(contact_batch) => contact_batch,
                    _ => unreachable!("type id routed to the wrong batch"),
                }
            }

            fn get_mut(batch: &mut TypeBatch) -> &mut ContactTypeBatch<$count> {
                match batch {
                    TypeBatch::$variant(contact_batch) => contact_batch,
                    _ => unreachable!("type id routed to the wrong batch"),
                }
            }
        }
    };
}

contact_type_slot!(1, CONTACT1_TYPE_ID, Contact1);
contact_type_slot!(2, CONTACT2_TYPE_ID, Contact2);
contact_type_slot!(3, CONTACT3_TYPE_ID, Contact3);
contact_type_slot!(4, CONTACT4_TYPE_ID, Contact4);

fn collect_two_body(references: &TwoBodyReferencesWide, inner: usize, indices: &mut Vec<i32>) {
    let body_a = references.index_a.as_array()[inner];
    if body_a != NO_BODY {
        indices.push(body_a);
    }
    let body_b = references.index_b.as_array()[inner];
    if body_b != NO_BODY {
        indices.push(body_b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::constraints::spring_settings::SpringSettings;
    use crate::utilities::vector::LANES;
    use glam::Vec3;

    fn description() -> ContactConstraintDescription<1> {
        ContactConstraintDescription {
            offset_a: [Vec3::ZERO],
            depth: [0.0],
            normal: Vec3::Y,
            offset_b: Vec3::ZERO,
            friction_coefficient: 1.0,
            spring_settings: SpringSettings::new(30.0, 1.0),
            maximum_recovery_velocity: 2.0,
        }
    }

    #[test]
    fn removal_moves_the_last_constraint_into_the_hole() {
        let mut batch = ContactTypeBatch::<1>::new();
        for i in 0..LANES + 2 {
            batch.allocate(
                ConstraintHandle(i as i32),
                i as i32 * 2,
                i as i32 * 2 + 1,
                &description(),
                &[0.5 + i as f32],
            );
        }
        let moved = batch.remove(0);
        assert_eq!(moved, Some(ConstraintHandle((LANES + 1) as i32)));
        assert_eq!(batch.constraint_count(), LANES + 1);
        // The moved constraint's impulses came along.
        assert_eq!(
            batch.read_penetration_impulses(0),
            [0.5 + (LANES + 1) as f32]
        );
        // The vacated trailing lane no longer references bodies.
        let (bundle, inner) = BundleIndexing::get_bundle_indices(LANES + 1);
        assert_eq!(batch.body_references[bundle].index_a.as_array()[inner], NO_BODY);
    }

    #[test]
    fn trailing_lanes_start_unreferenced() {
        let mut batch = ContactTypeBatch::<1>::new();
        batch.allocate(ConstraintHandle(0), 4, 9, &description(), &[0.0]);
        let references = batch.body_references[0];
        assert_eq!(references.index_a.as_array()[0], 4);
        for lane in 1..LANES {
            assert_eq!(references.index_a.as_array()[lane], NO_BODY);
            assert_eq!(references.index_b.as_array()[lane], NO_BODY);
        }
    }
}
