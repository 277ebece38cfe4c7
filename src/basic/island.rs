use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use tracing::trace;

use super::{
    circuit::{BusType, InjectionKind},
    options::PowerFlowOptions,
    scenario::Scenario,
};

/// A connected, independently solvable part of the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    pub index: usize,
    /// Local → global bus index, ascending.
    pub buses: Vec<usize>,
    /// Local → global branch index, ascending.
    pub branches: Vec<usize>,
    pub injections: Vec<usize>,
}

impl Island {
    #[inline]
    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    #[inline]
    pub fn is_single_node(&self) -> bool {
        self.buses.len() == 1
    }
}

/// Output of [`split_islands`].
#[derive(Debug, Clone, Default)]
pub struct IslandSplit {
    pub islands: Vec<Island>,
    /// Single-bus islands removed by `ignore_single_node_islands`.
    pub dropped: Vec<Island>,
}

/// Builds the bus × bus connectivity pattern `C·Cᵀ` from the incidence
/// matrix of in-service branches.
fn bus_connectivity(scenario: &Scenario) -> CscMatrix<f64> {
    let nc = scenario.circuit();
    let n = nc.n_bus();
    let m = nc.n_branch();
    let mut incidence = CooMatrix::new(n, m.max(1));
    for k in (0..m).filter(|&k| scenario.branch_in_service(k)) {
        incidence.push(nc.branch.from[k], k, 1.0);
        incidence.push(nc.branch.to[k], k, -1.0);
    }
    let c = CscMatrix::from(&incidence);
    &c * &c.transpose()
}

/// Partitions the in-service buses into connected islands.
///
/// Islands are ordered by their smallest global bus index, which makes the
/// result independent of branch ordering.
pub fn split_islands(scenario: &Scenario, ignore_single_node_islands: bool) -> IslandSplit {
    let nc = scenario.circuit();
    let n = nc.n_bus();
    let adj = bus_connectivity(scenario);
    let (offsets, rows) = (adj.col_offsets(), adj.row_indices());

    let mut island_of: Vec<Option<usize>> = vec![None; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut stack = Vec::new();
    for start in 0..n {
        if !scenario.bus_active[start] || island_of[start].is_some() {
            continue;
        }
        let id = groups.len();
        let mut members = Vec::new();
        island_of[start] = Some(id);
        stack.push(start);
        while let Some(node) = stack.pop() {
            members.push(node);
            for &other in &rows[offsets[node]..offsets[node + 1]] {
                if scenario.bus_active[other] && island_of[other].is_none() {
                    island_of[other] = Some(id);
                    stack.push(other);
                }
            }
        }
        members.sort_unstable();
        groups.push(members);
    }

    let mut branches = vec![Vec::new(); groups.len()];
    for k in (0..nc.n_branch()).filter(|&k| scenario.branch_in_service(k)) {
        if let Some(id) = island_of[nc.branch.from[k]] {
            branches[id].push(k);
        }
    }
    let mut injections = vec![Vec::new(); groups.len()];
    for k in (0..nc.n_injection()).filter(|&k| scenario.injection_in_service(k)) {
        if let Some(id) = island_of[nc.injection.bus[k]] {
            injections[id].push(k);
        }
    }

    let mut split = IslandSplit::default();
    let all = groups
        .into_iter()
        .zip(branches)
        .zip(injections)
        .map(|((buses, branches), injections)| (buses, branches, injections));
    for (buses, branches, injections) in all {
        let island = Island {
            index: 0,
            buses,
            branches,
            injections,
        };
        if ignore_single_node_islands && island.is_single_node() {
            split.dropped.push(island);
        } else {
            split.islands.push(island);
        }
    }
    for (i, island) in split.islands.iter_mut().enumerate() {
        island.index = i;
    }
    trace!(
        islands = split.islands.len(),
        dropped = split.dropped.len(),
        "island split"
    );
    split
}

/// Branch arrays of one island, bus indices local.
#[derive(Debug, Clone, Default)]
pub struct IslandBranches {
    pub from: Vec<usize>,
    pub to: Vec<usize>,
    pub r: Vec<f64>,
    pub x: Vec<f64>,
    pub g: Vec<f64>,
    pub b: Vec<f64>,
    pub tap_module: Vec<f64>,
    pub tap_angle: Vec<f64>,
    pub rate: Vec<f64>,
}

impl IslandBranches {
    #[inline]
    pub fn len(&self) -> usize {
        self.from.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }
}

/// Numerical data of one island in per-unit, local indexing.
#[derive(Debug, Clone)]
pub struct IslandData {
    pub sbase: f64,
    pub bus_types: Vec<BusType>,
    /// `(p bus, pqv bus)` pairs created by remote voltage control.
    pub remote_pairs: Vec<(usize, usize)>,
    pub s0: DVector<Complex64>,
    pub yshunt: DVector<Complex64>,
    pub v0: DVector<Complex64>,
    pub qmin: DVector<f64>,
    pub qmax: DVector<f64>,
    pub installed_power: DVector<f64>,
    pub branches: IslandBranches,
}

impl IslandData {
    #[inline]
    pub fn n_bus(&self) -> usize {
        self.bus_types.len()
    }

    pub fn has_slack(&self) -> bool {
        self.bus_types.contains(&BusType::Slack)
    }
}

impl Island {
    /// Compiles the island's per-unit arrays.
    ///
    /// Voltage controlling devices promote their bus to PV, or create a
    /// `P`/`PQV` pair when they regulate another bus of the same island.
    pub fn compile(&self, scenario: &Scenario, options: &PowerFlowOptions) -> IslandData {
        let nc = scenario.circuit();
        let sbase = nc.sbase;
        let n = self.n_bus();
        let mut local = vec![None; nc.n_bus()];
        for (i, &g) in self.buses.iter().enumerate() {
            local[g] = Some(i);
        }

        let mut bus_types: Vec<BusType> = self.buses.iter().map(|&g| nc.bus.bus_type[g]).collect();
        let mut vm_set: Vec<Option<f64>> = vec![None; n];
        let mut remote_pairs = Vec::new();
        let mut s0 = DVector::<Complex64>::zeros(n);
        let mut yshunt = DVector::<Complex64>::zeros(n);
        let mut qmin = DVector::<f64>::zeros(n);
        let mut qmax = DVector::<f64>::zeros(n);
        let mut has_control = vec![false; n];
        let installed_power =
            DVector::from_iterator(n, self.buses.iter().map(|&g| nc.bus.installed_power[g]));

        let inj = &nc.injection;
        for &k in &self.injections {
            let Some(i) = local[inj.bus[k]] else {
                continue;
            };
            let s = scenario.injection_s(k) / sbase;
            match inj.kind[k] {
                InjectionKind::Load => s0[i] -= s,
                InjectionKind::Shunt => yshunt[i] += s,
                InjectionKind::Generator | InjectionKind::Battery if inj.controllable[k] => {
                    s0[i] += Complex64::new(s.re, 0.0);
                    qmin[i] += inj.q_min[k] / sbase;
                    qmax[i] += inj.q_max[k] / sbase;
                    has_control[i] = true;
                    let target = inj.controlled_bus[k].and_then(|c| local[c]).unwrap_or(i);
                    if target == i {
                        if bus_types[i] == BusType::Pq {
                            bus_types[i] = BusType::Pv;
                        }
                        vm_set[i].get_or_insert(inj.vm_set[k]);
                    } else if matches!(bus_types[i], BusType::Pq | BusType::Pv)
                        && bus_types[target] == BusType::Pq
                    {
                        bus_types[i] = BusType::P;
                        bus_types[target] = BusType::Pqv;
                        vm_set[target].get_or_insert(inj.vm_set[k]);
                        remote_pairs.push((i, target));
                    }
                }
                InjectionKind::Generator | InjectionKind::Battery => s0[i] += s,
            }
        }
        for i in 0..n {
            if !has_control[i] {
                qmin[i] = f64::NEG_INFINITY;
                qmax[i] = f64::INFINITY;
            }
        }

        let mut v0 = match &options.initial_voltage {
            Some(guess) if guess.len() == nc.n_bus() => {
                DVector::from_iterator(n, self.buses.iter().map(|&g| guess[g]))
            }
            _ => DVector::from_element(n, Complex64::new(1.0, 0.0)),
        };
        for i in 0..n {
            let fixed_vm = matches!(bus_types[i], BusType::Slack | BusType::Pv | BusType::Pqv);
            if fixed_vm {
                let vm = vm_set[i].unwrap_or(1.0);
                v0[i] = Complex64::from_polar(vm, v0[i].arg());
            }
        }

        let br = &nc.branch;
        let mut branches = IslandBranches::default();
        for &k in &self.branches {
            let (Some(f), Some(t)) = (local[br.from[k]], local[br.to[k]]) else {
                continue;
            };
            branches.from.push(f);
            branches.to.push(t);
            branches.r.push(br.r[k]);
            branches.x.push(br.x[k]);
            branches.g.push(br.g[k]);
            branches.b.push(br.b[k]);
            branches.tap_module.push(br.tap_module[k]);
            branches.tap_angle.push(br.tap_angle[k]);
            branches.rate.push(br.rate[k]);
        }

        IslandData {
            sbase,
            bus_types,
            remote_pairs,
            s0,
            yshunt,
            v0,
            qmin,
            qmax,
            installed_power,
            branches,
        }
    }
}
