/// Everything the solver accumulates forms a join semi-lattice ordered by inclusion: points-to
/// sets, graph deltas and pending work. The fixpoint is reached because every join only ever
/// moves up a finite lattice.
pub trait JoinSemiLattice: Eq + PartialOrd {
    /// Least upper bound of `self` and `other`, stored into `self`.
    /// The mutated `self` MUST be >= than it was before.
    fn join(&mut self, other: &Self);
}
