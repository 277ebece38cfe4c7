use super::{
    dcpf::dc_pf,
    error::PowerFlowError,
    fast_decoupled::fast_decoupled_pf,
    formulation::{NumericSolution, PfProblem},
    levenberg::levenberg_marquardt_pf,
    newtonpf::newton_pf,
    options::{PowerFlowOptions, SolverType},
    solver::DefaultSolver,
};

/// One power flow algorithm. Implementations are stateless; every call
/// owns its linear solvers, so a method can serve several islands at once.
pub trait PowerFlowMethod: Sync {
    fn kind(&self) -> SolverType;

    fn solve(&self, problem: PfProblem<'_>, options: &PowerFlowOptions) -> NumericSolution;
}

pub struct NewtonRaphson;
pub struct LevenbergMarquardt;
pub struct FastDecoupled;
pub struct DcPowerFlow;

impl PowerFlowMethod for NewtonRaphson {
    fn kind(&self) -> SolverType {
        SolverType::NewtonRaphson
    }

    fn solve(&self, mut problem: PfProblem<'_>, options: &PowerFlowOptions) -> NumericSolution {
        let mut solver = DefaultSolver::default();
        let outcome = newton_pf(&mut problem, options, &mut solver);
        problem.into_solution(self.kind(), outcome)
    }
}

impl PowerFlowMethod for LevenbergMarquardt {
    fn kind(&self) -> SolverType {
        SolverType::LevenbergMarquardt
    }

    fn solve(&self, mut problem: PfProblem<'_>, options: &PowerFlowOptions) -> NumericSolution {
        let mut solver = DefaultSolver::default();
        let outcome = levenberg_marquardt_pf(&mut problem, options, &mut solver);
        problem.into_solution(self.kind(), outcome)
    }
}

impl PowerFlowMethod for FastDecoupled {
    fn kind(&self) -> SolverType {
        SolverType::FastDecoupled
    }

    fn solve(&self, mut problem: PfProblem<'_>, options: &PowerFlowOptions) -> NumericSolution {
        let (mut solver_p, mut solver_q) = (DefaultSolver::default(), DefaultSolver::default());
        let outcome = fast_decoupled_pf(&mut problem, options, &mut solver_p, &mut solver_q);
        problem.into_solution(self.kind(), outcome)
    }
}

impl PowerFlowMethod for DcPowerFlow {
    fn kind(&self) -> SolverType {
        SolverType::Dc
    }

    fn solve(&self, mut problem: PfProblem<'_>, options: &PowerFlowOptions) -> NumericSolution {
        let mut solver = DefaultSolver::default();
        let outcome = dc_pf(&mut problem, options.min_impedance, &mut solver);
        problem.into_solution(self.kind(), outcome)
    }
}

static METHODS: [&dyn PowerFlowMethod; 4] = [
    &NewtonRaphson,
    &LevenbergMarquardt,
    &FastDecoupled,
    &DcPowerFlow,
];

/// Looks up the implementation of a solver type.
pub fn method_for(kind: SolverType) -> Result<&'static dyn PowerFlowMethod, PowerFlowError> {
    METHODS
        .iter()
        .copied()
        .find(|m| m.kind() == kind)
        .ok_or(PowerFlowError::UnsupportedSolver(kind))
}
