pub mod admittance;
pub mod bus_types;
pub mod circuit;
pub(crate) mod controls;
pub(crate) mod dcpf;
pub mod driver;
pub(crate) mod dsbus_dv;
pub mod error;
pub(crate) mod fast_decoupled;
pub mod formulation;
pub mod island;
pub(crate) mod jacobian;
pub(crate) mod levenberg;
pub mod methods;
pub(crate) mod newtonpf;
pub mod options;
pub mod post_processing;
pub mod results;
pub mod scenario;

pub mod ecs;
pub mod solver;
pub(crate) mod sparse;

pub use dcpf::dc_pf;
pub use fast_decoupled::fast_decoupled_pf;
pub use levenberg::levenberg_marquardt_pf;
pub use newtonpf::newton_pf;
