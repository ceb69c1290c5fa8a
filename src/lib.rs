pub mod call_record;
pub mod error;
pub mod factor;
pub mod jacobian_map;
pub mod key;
pub mod linear;
pub mod manifold;
pub mod noise;
pub mod numerical;
pub mod trace;
pub mod values;

pub use call_record::{
    CallRecord, ChainRuleBlock, DynRowsMatrix, Erased, ReverseAd, RowKind, Rows,
    MAX_VIRTUAL_STATIC_ROWS,
};
pub use error::{Error, Result};
pub use factor::{FactorBase, NoiseModelFactor1, NoiseModelFactor2, NoiseModelFactor3};
pub use jacobian_map::JacobianMap;
pub use key::Key;
pub use linear::{HessianFactor, JacobianFactor};
pub use manifold::Manifold;
pub use noise::NoiseModel;
pub use numerical::DEFAULT_DELTA;
pub use trace::{BinaryRecord, ExecutionTrace, UnaryRecord};
pub use values::{Values, VectorValues};
