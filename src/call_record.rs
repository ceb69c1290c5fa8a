//! Reverse-mode dispatch that keeps small row counts static.
//!
//! During a reverse pass every expression node receives a chain-rule block
//! `dF/dT` with one row per component of the enclosing output `F` and `C`
//! columns (the tangent dimension of the node's own output `T`). Nodes are
//! type-erased behind [`CallRecord`], yet the row count is usually a small
//! compile-time constant (1–4 for poses, rotations and points), and keeping
//! it static lets `dF/dT · dT/dA` and the final Jacobian write stay on the
//! stack.
//!
//! The trait therefore has one method per static row count up to
//! [`MAX_VIRTUAL_STATIC_ROWS`], one for runtime rows with static columns, and
//! one for fully runtime-sized matrices. [`Rows`] names each of those
//! families; `<dyn CallRecord<C>>::reverse_ad` picks the narrowest slot for
//! the block it is handed:
//!
//! | block type                 | slot                         |
//! |----------------------------|------------------------------|
//! | `SMatrix<f64, R, C>`, R ≤ 4 | `reverse_ad_R`               |
//! | `SMatrix<f64, R, C>`, R > 4 | `reverse_ad_dyn_rows` (copy) |
//! | `DynRowsMatrix<C>`          | `reverse_ad_dyn_rows`        |
//! | `DMatrix<f64>`              | `reverse_ad_dyn`             |
//!
//! Nodes do not implement the slots by hand. They implement the generic
//! [`ReverseAd`] trait once and a blanket impl fans it out into every slot.

use std::fmt;

use nalgebra::{Const, DMatrix, Dyn, Matrix, SMatrix, VecStorage};
use tracing::trace;

use crate::error::{Error, Result};
use crate::jacobian_map::JacobianMap;
use crate::key::Key;

/// Largest row count with its own [`CallRecord`] slot.
///
/// Every slot is a method on every record's vtable; adding one means adding
/// a `reverse_ad_N` method and a match arm in `Const<R>`'s dispatch.
pub const MAX_VIRTUAL_STATIC_ROWS: usize = 4;

/// Chain-rule block with runtime rows and `C` static columns.
pub type DynRowsMatrix<const C: usize> = Matrix<f64, Dyn, Const<C>, VecStorage<f64, Dyn, Const<C>>>;

/// Row-count family a chain-rule block was dispatched through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// Exactly this many rows, known at compile time.
    Static(usize),
    /// Runtime rows, static columns.
    DynamicRows,
    /// Runtime rows and runtime columns.
    Dynamic,
}

/// Type-erased record of one expression node's local Jacobians.
///
/// A record is built during the forward evaluation of an expression, is
/// immutable afterwards and may serve any number of reverse passes. `C` is
/// the tangent dimension of the node's output.
///
/// Call `reverse_ad` on `dyn CallRecord<C>` rather than the numbered slots;
/// it routes each block to the narrowest one.
pub trait CallRecord<const C: usize> {
    /// Human-readable description, one line per node, prefixed by `indent`.
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Begin a reverse pass with this node as the differentiated output.
    fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<()>;

    fn reverse_ad_1(&self, dfdt: &SMatrix<f64, 1, C>, jacobians: &mut JacobianMap) -> Result<()>;

    fn reverse_ad_2(&self, dfdt: &SMatrix<f64, 2, C>, jacobians: &mut JacobianMap) -> Result<()>;

    fn reverse_ad_3(&self, dfdt: &SMatrix<f64, 3, C>, jacobians: &mut JacobianMap) -> Result<()>;

    fn reverse_ad_4(&self, dfdt: &SMatrix<f64, 4, C>, jacobians: &mut JacobianMap) -> Result<()>;

    /// Rows beyond [`MAX_VIRTUAL_STATIC_ROWS`] or unknown until runtime.
    fn reverse_ad_dyn_rows(&self, dfdt: &DynRowsMatrix<C>, jacobians: &mut JacobianMap)
        -> Result<()>;

    /// Fully runtime-sized block; its column count must equal `C`.
    fn reverse_ad_dyn(&self, dfdt: &DMatrix<f64>, jacobians: &mut JacobianMap) -> Result<()>;
}

const _: () = assert!(MAX_VIRTUAL_STATIC_ROWS == 4, "one reverse_ad_N slot per static row count");

mod sealed {
    pub trait Sealed {}
}

/// A row-count family: `Const<R>`, [`Dyn`] or [`Erased`].
///
/// `Block<C>` is the matrix type of an `R × C` chain-rule block in that
/// family. The associated functions are the handful of operations a record
/// needs without knowing which family it was called with.
pub trait Rows: sealed::Sealed + 'static {
    type Block<const C: usize>: Clone + fmt::Debug;

    const KIND: RowKind;

    /// `dF/dT · dT/dA`, staying in the same family.
    fn chain<const C: usize, const A: usize>(
        dfdt: &Self::Block<C>,
        dtda: &SMatrix<f64, C, A>,
    ) -> Result<Self::Block<A>>;

    /// Add `block` into the Jacobian slot of a leaf `key`.
    fn accumulate<const C: usize>(
        jacobians: &mut JacobianMap,
        key: Key,
        block: &Self::Block<C>,
    ) -> Result<()>;

    /// Hand `dfdt` to the narrowest slot of `record`.
    fn dispatch<const C: usize>(
        record: &(dyn CallRecord<C> + '_),
        dfdt: &Self::Block<C>,
        jacobians: &mut JacobianMap,
    ) -> Result<()>;
}

/// Runtime rows and runtime columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Erased;

impl<const R: usize> sealed::Sealed for Const<R> {}
impl sealed::Sealed for Dyn {}
impl sealed::Sealed for Erased {}

fn widen<const R: usize, const C: usize>(dfdt: &SMatrix<f64, R, C>) -> DynRowsMatrix<C> {
    DynRowsMatrix::<C>::from_column_slice_generic(Dyn(R), Const::<C>, dfdt.as_slice())
}

fn check_cols<const C: usize>(dfdt: &DMatrix<f64>) -> Result<()> {
    if dfdt.ncols() != C {
        return Err(Error::ContractViolation {
            expected: C,
            actual: dfdt.ncols(),
        });
    }
    Ok(())
}

impl<const R: usize> Rows for Const<R> {
    type Block<const C: usize> = SMatrix<f64, R, C>;

    const KIND: RowKind = RowKind::Static(R);

    fn chain<const C: usize, const A: usize>(
        dfdt: &Self::Block<C>,
        dtda: &SMatrix<f64, C, A>,
    ) -> Result<Self::Block<A>> {
        Ok(dfdt * dtda)
    }

    fn accumulate<const C: usize>(
        jacobians: &mut JacobianMap,
        key: Key,
        block: &Self::Block<C>,
    ) -> Result<()> {
        jacobians.add(key, block)
    }

    fn dispatch<const C: usize>(
        record: &(dyn CallRecord<C> + '_),
        dfdt: &Self::Block<C>,
        jacobians: &mut JacobianMap,
    ) -> Result<()> {
        // `R` is a constant: each instantiation keeps exactly one arm. The
        // row views only restate the type; the values are copied unchanged.
        match R {
            1 => record.reverse_ad_1(&dfdt.fixed_rows::<1>(0).into_owned(), jacobians),
            2 => record.reverse_ad_2(&dfdt.fixed_rows::<2>(0).into_owned(), jacobians),
            3 => record.reverse_ad_3(&dfdt.fixed_rows::<3>(0).into_owned(), jacobians),
            4 => record.reverse_ad_4(&dfdt.fixed_rows::<4>(0).into_owned(), jacobians),
            _ => {
                trace!(rows = R, cols = C, "widening chain-rule block to dynamic rows");
                record.reverse_ad_dyn_rows(&widen(dfdt), jacobians)
            }
        }
    }
}

impl Rows for Dyn {
    type Block<const C: usize> = DynRowsMatrix<C>;

    const KIND: RowKind = RowKind::DynamicRows;

    fn chain<const C: usize, const A: usize>(
        dfdt: &Self::Block<C>,
        dtda: &SMatrix<f64, C, A>,
    ) -> Result<Self::Block<A>> {
        Ok(dfdt * dtda)
    }

    fn accumulate<const C: usize>(
        jacobians: &mut JacobianMap,
        key: Key,
        block: &Self::Block<C>,
    ) -> Result<()> {
        jacobians.add(key, block)
    }

    fn dispatch<const C: usize>(
        record: &(dyn CallRecord<C> + '_),
        dfdt: &Self::Block<C>,
        jacobians: &mut JacobianMap,
    ) -> Result<()> {
        record.reverse_ad_dyn_rows(dfdt, jacobians)
    }
}

impl Rows for Erased {
    type Block<const C: usize> = DMatrix<f64>;

    const KIND: RowKind = RowKind::Dynamic;

    /// Fails with `ContractViolation` unless `dfdt` has `C` columns.
    fn chain<const C: usize, const A: usize>(
        dfdt: &Self::Block<C>,
        dtda: &SMatrix<f64, C, A>,
    ) -> Result<Self::Block<A>> {
        check_cols::<C>(dfdt)?;
        let product = dfdt * dtda;
        Ok(DMatrix::from_column_slice(product.nrows(), A, product.as_slice()))
    }

    fn accumulate<const C: usize>(
        jacobians: &mut JacobianMap,
        key: Key,
        block: &Self::Block<C>,
    ) -> Result<()> {
        check_cols::<C>(block)?;
        jacobians.add(key, block)
    }

    fn dispatch<const C: usize>(
        record: &(dyn CallRecord<C> + '_),
        dfdt: &Self::Block<C>,
        jacobians: &mut JacobianMap,
    ) -> Result<()> {
        check_cols::<C>(dfdt)?;
        record.reverse_ad_dyn(dfdt, jacobians)
    }
}

/// Matrix types accepted by `<dyn CallRecord<C>>::reverse_ad`.
///
/// Maps each concrete block type to its [`Rows`] family so the caller never
/// names the family.
pub trait ChainRuleBlock<const C: usize> {
    type Rows: Rows;

    fn as_block(&self) -> &<Self::Rows as Rows>::Block<C>;
}

impl<const R: usize, const C: usize> ChainRuleBlock<C> for SMatrix<f64, R, C> {
    type Rows = Const<R>;

    fn as_block(&self) -> &SMatrix<f64, R, C> {
        self
    }
}

impl<const C: usize> ChainRuleBlock<C> for DynRowsMatrix<C> {
    type Rows = Dyn;

    fn as_block(&self) -> &DynRowsMatrix<C> {
        self
    }
}

impl<const C: usize> ChainRuleBlock<C> for DMatrix<f64> {
    type Rows = Erased;

    fn as_block(&self) -> &DMatrix<f64> {
        self
    }
}

impl<const C: usize> dyn CallRecord<C> + '_ {
    /// Propagate `dF/dT` through this record into `jacobians`.
    ///
    /// Static row counts up to [`MAX_VIRTUAL_STATIC_ROWS`] reach their own
    /// slot; larger static counts are copied into a [`DynRowsMatrix`]; fully
    /// dynamic blocks must have `C` columns.
    pub fn reverse_ad<M>(&self, dfdt: &M, jacobians: &mut JacobianMap) -> Result<()>
    where
        M: ChainRuleBlock<C>,
    {
        <M::Rows as Rows>::dispatch::<C>(self, dfdt.as_block(), jacobians)
    }
}

/// Generic side of a record: implemented once per node type.
///
/// A blanket impl turns every `ReverseAd<C>` into a [`CallRecord<C>`] by
/// instantiating `reverse_ad` for each slot's row family. The adapter holds
/// no state of its own.
pub trait ReverseAd<const C: usize> {
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result;

    fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<()>;

    fn reverse_ad<R: Rows>(&self, dfdt: &R::Block<C>, jacobians: &mut JacobianMap) -> Result<()>;
}

impl<T, const C: usize> CallRecord<C> for T
where
    T: ReverseAd<C>,
{
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        <T as ReverseAd<C>>::print(self, indent, out)
    }

    fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<()> {
        <T as ReverseAd<C>>::start_reverse_ad(self, jacobians)
    }

    fn reverse_ad_1(&self, dfdt: &SMatrix<f64, 1, C>, jacobians: &mut JacobianMap) -> Result<()> {
        <T as ReverseAd<C>>::reverse_ad::<Const<1>>(self, dfdt, jacobians)
    }

    fn reverse_ad_2(&self, dfdt: &SMatrix<f64, 2, C>, jacobians: &mut JacobianMap) -> Result<()> {
        <T as ReverseAd<C>>::reverse_ad::<Const<2>>(self, dfdt, jacobians)
    }

    fn reverse_ad_3(&self, dfdt: &SMatrix<f64, 3, C>, jacobians: &mut JacobianMap) -> Result<()> {
        <T as ReverseAd<C>>::reverse_ad::<Const<3>>(self, dfdt, jacobians)
    }

    fn reverse_ad_4(&self, dfdt: &SMatrix<f64, 4, C>, jacobians: &mut JacobianMap) -> Result<()> {
        <T as ReverseAd<C>>::reverse_ad::<Const<4>>(self, dfdt, jacobians)
    }

    fn reverse_ad_dyn_rows(
        &self,
        dfdt: &DynRowsMatrix<C>,
        jacobians: &mut JacobianMap,
    ) -> Result<()> {
        <T as ReverseAd<C>>::reverse_ad::<Dyn>(self, dfdt, jacobians)
    }

    fn reverse_ad_dyn(&self, dfdt: &DMatrix<f64>, jacobians: &mut JacobianMap) -> Result<()> {
        check_cols::<C>(dfdt)?;
        <T as ReverseAd<C>>::reverse_ad::<Erased>(self, dfdt, jacobians)
    }
}
