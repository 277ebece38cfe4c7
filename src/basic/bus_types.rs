use super::circuit::BusType;

/// Disjoint bus role sets over an island's local bus indices, plus the
/// combined index sets that shape the state vector and the mismatch.
///
/// All sets are kept sorted ascending so that Jacobian rows and columns come
/// out in the same order as the state vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusRoles {
    pub slack: Vec<usize>,
    pub pv: Vec<usize>,
    pub pq: Vec<usize>,
    pub pqv: Vec<usize>,
    pub p: Vec<usize>,
    /// `(p bus, pqv bus)` remote control pairs.
    pub remote_pairs: Vec<(usize, usize)>,
    /// Buses relaxed to PQ during this solve, in switching order.
    pub switched: Vec<usize>,

    /// Angle unknown: pv ∪ pq ∪ pqv ∪ p. Also the P-mismatch rows.
    pub idx_dva: Vec<usize>,
    /// Magnitude unknown: pq ∪ p.
    pub idx_dvm: Vec<usize>,
    /// Q-mismatch rows: pq ∪ pqv.
    pub idx_dq: Vec<usize>,
}

fn merged(sets: &[&[usize]]) -> Vec<usize> {
    let mut out: Vec<usize> = sets.iter().flat_map(|s| s.iter().copied()).collect();
    out.sort_unstable();
    out
}

impl BusRoles {
    pub fn classify(types: &[BusType], remote_pairs: &[(usize, usize)]) -> Self {
        let mut roles = BusRoles {
            remote_pairs: remote_pairs.to_vec(),
            ..Default::default()
        };
        for (i, ty) in types.iter().enumerate() {
            match ty {
                BusType::Slack => roles.slack.push(i),
                BusType::Pv => roles.pv.push(i),
                BusType::Pq => roles.pq.push(i),
                BusType::Pqv => roles.pqv.push(i),
                BusType::P => roles.p.push(i),
            }
        }
        roles.refresh();
        roles
    }

    /// Recomputes the combined index sets after a role change.
    fn refresh(&mut self) {
        self.idx_dva = merged(&[&self.pv, &self.pq, &self.pqv, &self.p]);
        self.idx_dvm = merged(&[&self.pq, &self.p]);
        self.idx_dq = merged(&[&self.pq, &self.pqv]);
    }

    #[inline]
    pub fn idx_dp(&self) -> &[usize] {
        &self.idx_dva
    }

    #[inline]
    pub fn n_bus(&self) -> usize {
        self.slack.len() + self.pv.len() + self.pq.len() + self.pqv.len() + self.p.len()
    }

    /// Number of unknowns (columns of the Jacobian).
    #[inline]
    pub fn n_unknowns(&self) -> usize {
        self.idx_dva.len() + self.idx_dvm.len()
    }

    /// Number of equations (rows of the Jacobian).
    #[inline]
    pub fn n_equations(&self) -> usize {
        self.idx_dva.len() + self.idx_dq.len()
    }

    pub fn role_of(&self, bus: usize) -> Option<BusType> {
        let sets = [
            (&self.slack, BusType::Slack),
            (&self.pv, BusType::Pv),
            (&self.pq, BusType::Pq),
            (&self.pqv, BusType::Pqv),
            (&self.p, BusType::P),
        ];
        sets.into_iter()
            .find(|(set, _)| set.binary_search(&bus).is_ok())
            .map(|(_, ty)| ty)
    }

    pub fn bus_types(&self) -> Vec<BusType> {
        let mut types = vec![BusType::Pq; self.n_bus()];
        for (set, ty) in [
            (&self.slack, BusType::Slack),
            (&self.pv, BusType::Pv),
            (&self.pqv, BusType::Pqv),
            (&self.p, BusType::P),
        ] {
            for &i in set {
                types[i] = ty;
            }
        }
        types
    }

    fn move_to_pq(&mut self, bus: usize) -> bool {
        let removed = [&mut self.pv, &mut self.p, &mut self.pqv]
            .into_iter()
            .any(|set| match set.binary_search(&bus) {
                Ok(pos) => {
                    set.remove(pos);
                    true
                }
                Err(_) => false,
            });
        if removed {
            if let Err(pos) = self.pq.binary_search(&bus) {
                self.pq.insert(pos, bus);
            }
            self.switched.push(bus);
        }
        removed
    }

    /// Relaxes a voltage controlling bus (`pv` or `p`) to `pq`.
    ///
    /// A `p` bus takes its `pqv` partner with it so the equation and unknown
    /// counts stay balanced. There is no way back to `pv` within a solve.
    /// Returns false if the bus was not voltage controlling.
    pub fn relax_to_pq(&mut self, bus: usize) -> bool {
        let was_p = self.p.binary_search(&bus).is_ok();
        if !(was_p || self.pv.binary_search(&bus).is_ok()) {
            return false;
        }
        self.move_to_pq(bus);
        if was_p {
            let partners: Vec<usize> = self
                .remote_pairs
                .iter()
                .filter(|(p, _)| *p == bus)
                .map(|(_, pqv)| *pqv)
                .collect();
            for pqv in partners {
                self.move_to_pq(pqv);
            }
            self.remote_pairs.retain(|(p, _)| *p != bus);
        }
        self.refresh();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BusType::*;

    fn assert_partition(roles: &BusRoles, n: usize) {
        let mut count = vec![0; n];
        for set in [&roles.slack, &roles.pv, &roles.pq, &roles.pqv, &roles.p] {
            for &i in set {
                count[i] += 1;
            }
        }
        assert!(count.iter().all(|&c| c == 1), "roles must partition buses: {count:?}");
    }

    #[test]
    fn test_classify_partition_and_derived_sets() {
        let types = [Slack, Pq, Pv, P, Pqv, Pq];
        let roles = BusRoles::classify(&types, &[(3, 4)]);
        assert_partition(&roles, types.len());
        assert_eq!(roles.idx_dva, vec![1, 2, 3, 4, 5]);
        assert_eq!(roles.idx_dvm, vec![1, 3, 5]);
        assert_eq!(roles.idx_dq, vec![1, 4, 5]);
        assert_eq!(roles.n_unknowns(), roles.n_equations());
        assert_eq!(roles.bus_types(), types.to_vec());
    }

    #[test]
    fn test_relax_is_monotonic() {
        let types = [Slack, Pv, Pv, Pq];
        let mut roles = BusRoles::classify(&types, &[]);
        assert!(roles.relax_to_pq(2));
        assert_eq!(roles.pq, vec![2, 3]);
        assert_eq!(roles.idx_dvm, vec![2, 3]);
        // relaxing again, or relaxing a slack bus, is refused
        assert!(!roles.relax_to_pq(2));
        assert!(!roles.relax_to_pq(0));
        assert_eq!(roles.switched, vec![2]);
        assert_eq!(roles.role_of(2), Some(Pq));
        assert_partition(&roles, types.len());
    }

    #[test]
    fn test_relax_remote_pair() {
        let types = [Slack, P, Pqv, Pq];
        let mut roles = BusRoles::classify(&types, &[(1, 2)]);
        assert!(roles.relax_to_pq(1));
        assert!(roles.p.is_empty() && roles.pqv.is_empty());
        assert_eq!(roles.pq, vec![1, 2, 3]);
        assert_eq!(roles.switched, vec![1, 2]);
        assert_eq!(roles.n_unknowns(), roles.n_equations());
    }
}
