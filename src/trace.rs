//! Execution traces: the recorded shape of one forward evaluation.
//!
//! A trace is what an expression leaves behind after computing its value.
//! Leaves remember their key, constants remember nothing, and every interior
//! node keeps a [`CallRecord`] holding its local Jacobians. Walking the trace
//! backwards with a chain-rule block accumulates `∂F/∂x` for every leaf.

use std::fmt;

use nalgebra::{Const, SMatrix};

use crate::call_record::{CallRecord, ChainRuleBlock, ReverseAd, Rows};
use crate::error::Result;
use crate::jacobian_map::JacobianMap;
use crate::key::Key;

/// Trace of a subexpression whose output has tangent dimension `C`.
pub enum ExecutionTrace<const C: usize> {
    Constant,
    Leaf(Key),
    Function(Box<dyn CallRecord<C>>),
}

impl<const C: usize> fmt::Debug for ExecutionTrace<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print("", f)
    }
}

impl<const C: usize> ExecutionTrace<C> {
    /// Wrap a record as an interior node.
    pub fn function<T>(record: T) -> Self
    where
        T: CallRecord<C> + 'static,
    {
        ExecutionTrace::Function(Box::new(record))
    }

    pub fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            ExecutionTrace::Constant => writeln!(out, "{indent}Constant"),
            ExecutionTrace::Leaf(key) => writeln!(out, "{indent}Leaf, key = {key}"),
            ExecutionTrace::Function(record) => {
                writeln!(out, "{indent}Function")?;
                record.print(&format!("{indent}  "), out)
            }
        }
    }

    /// Seed a reverse pass at this node: `dF/dT` is the `C × C` identity.
    pub fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<()> {
        match self {
            ExecutionTrace::Constant => Ok(()),
            ExecutionTrace::Leaf(key) => jacobians.add(*key, &SMatrix::<f64, C, C>::identity()),
            ExecutionTrace::Function(record) => record.start_reverse_ad(jacobians),
        }
    }

    /// Propagate a chain-rule block of any supported matrix type.
    pub fn reverse_ad<M>(&self, dfdt: &M, jacobians: &mut JacobianMap) -> Result<()>
    where
        M: ChainRuleBlock<C>,
    {
        self.reverse_ad_rows::<M::Rows>(dfdt.as_block(), jacobians)
    }

    /// Propagate a block already expressed in its row family.
    pub fn reverse_ad_rows<R: Rows>(
        &self,
        dfdt: &R::Block<C>,
        jacobians: &mut JacobianMap,
    ) -> Result<()> {
        match self {
            ExecutionTrace::Constant => Ok(()),
            ExecutionTrace::Leaf(key) => R::accumulate::<C>(jacobians, *key, dfdt),
            ExecutionTrace::Function(record) => R::dispatch::<C>(record.as_ref(), dfdt, jacobians),
        }
    }

    /// Jacobians of this node's output with respect to every `(key, dim)`.
    pub fn jacobians(&self, dims: impl IntoIterator<Item = (Key, usize)>) -> Result<JacobianMap> {
        let mut jacobians = JacobianMap::new(C, dims);
        self.start_reverse_ad(&mut jacobians)?;
        Ok(jacobians)
    }
}

/// Record of a one-argument function `T = f(A)`.
pub struct UnaryRecord<const C: usize, const A: usize> {
    trace: ExecutionTrace<A>,
    dtda: SMatrix<f64, C, A>,
}

impl<const C: usize, const A: usize> UnaryRecord<C, A> {
    pub fn new(trace: ExecutionTrace<A>, dtda: SMatrix<f64, C, A>) -> Self {
        UnaryRecord { trace, dtda }
    }
}

impl<const C: usize, const A: usize> ReverseAd<C> for UnaryRecord<C, A> {
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{indent}UnaryRecord")?;
        write!(out, "{indent}dT/dA1 ={}", self.dtda)?;
        self.trace.print(&format!("{indent}  "), out)
    }

    fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<()> {
        self.trace.reverse_ad_rows::<Const<C>>(&self.dtda, jacobians)
    }

    fn reverse_ad<R: Rows>(&self, dfdt: &R::Block<C>, jacobians: &mut JacobianMap) -> Result<()> {
        self.trace
            .reverse_ad_rows::<R>(&R::chain::<C, A>(dfdt, &self.dtda)?, jacobians)
    }
}

/// Record of a two-argument function `T = f(A1, A2)`.
pub struct BinaryRecord<const C: usize, const A1: usize, const A2: usize> {
    trace1: ExecutionTrace<A1>,
    trace2: ExecutionTrace<A2>,
    dtda1: SMatrix<f64, C, A1>,
    dtda2: SMatrix<f64, C, A2>,
}

impl<const C: usize, const A1: usize, const A2: usize> BinaryRecord<C, A1, A2> {
    pub fn new(
        trace1: ExecutionTrace<A1>,
        dtda1: SMatrix<f64, C, A1>,
        trace2: ExecutionTrace<A2>,
        dtda2: SMatrix<f64, C, A2>,
    ) -> Self {
        BinaryRecord {
            trace1,
            trace2,
            dtda1,
            dtda2,
        }
    }
}

impl<const C: usize, const A1: usize, const A2: usize> ReverseAd<C> for BinaryRecord<C, A1, A2> {
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{indent}BinaryRecord")?;
        let child = format!("{indent}  ");
        write!(out, "{indent}dT/dA1 ={}", self.dtda1)?;
        self.trace1.print(&child, out)?;
        write!(out, "{indent}dT/dA2 ={}", self.dtda2)?;
        self.trace2.print(&child, out)
    }

    fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<()> {
        jacobians.transaction(|jm| {
            self.trace1.reverse_ad_rows::<Const<C>>(&self.dtda1, jm)?;
            self.trace2.reverse_ad_rows::<Const<C>>(&self.dtda2, jm)
        })
    }

    fn reverse_ad<R: Rows>(&self, dfdt: &R::Block<C>, jacobians: &mut JacobianMap) -> Result<()> {
        let dfda1 = R::chain::<C, A1>(dfdt, &self.dtda1)?;
        let dfda2 = R::chain::<C, A2>(dfdt, &self.dtda2)?;
        jacobians.transaction(|jm| {
            self.trace1.reverse_ad_rows::<R>(&dfda1, jm)?;
            self.trace2.reverse_ad_rows::<R>(&dfda2, jm)
        })
    }
}
